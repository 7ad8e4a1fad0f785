//! Verifiable credentials: signed claims an issuer makes about a subject.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::codec;
use crate::did::{Did, DidUrl};
use crate::document::{Document, DocumentResolver};
use crate::error::{DidError, Result};
use crate::time;

/// Type every credential carries.
pub const VERIFIABLE_CREDENTIAL_TYPE: &str = "VerifiableCredential";

/// The subject a credential makes claims about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialSubject {
    pub(crate) id: Did,
    #[serde(flatten)]
    pub(crate) properties: BTreeMap<String, Value>,
}

impl CredentialSubject {
    pub fn id(&self) -> &Did {
        &self.id
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// The issuer's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialProof {
    #[serde(rename = "type")]
    pub(crate) proof_type: String,
    #[serde(with = "time::seconds")]
    pub(crate) created: DateTime<Utc>,
    #[serde(rename = "verificationMethod")]
    pub(crate) verification_method: DidUrl,
    pub(crate) signature: String,
}

impl CredentialProof {
    pub fn proof_type(&self) -> &str {
        &self.proof_type
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn verification_method(&self) -> &DidUrl {
        &self.verification_method
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }
}

/// Facts attached when a credential is resolved from the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialMetadata {
    pub(crate) transaction_id: Option<String>,
    #[serde(with = "time::seconds_opt")]
    pub(crate) published: Option<DateTime<Utc>>,
    pub(crate) revoked: bool,
}

impl CredentialMetadata {
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.published
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked
    }
}

/// A signed credential.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiableCredential {
    pub(crate) id: DidUrl,
    #[serde(rename = "type")]
    pub(crate) types: Vec<String>,
    pub(crate) issuer: Did,
    #[serde(rename = "issuanceDate", with = "time::seconds")]
    pub(crate) issuance_date: DateTime<Utc>,
    #[serde(rename = "expirationDate", with = "time::seconds")]
    pub(crate) expiration_date: DateTime<Utc>,
    #[serde(rename = "credentialSubject")]
    pub(crate) subject: CredentialSubject,
    pub(crate) proof: CredentialProof,
    #[serde(skip)]
    pub(crate) metadata: CredentialMetadata,
}

#[derive(Deserialize)]
struct CredentialData {
    id: DidUrl,
    #[serde(rename = "type")]
    types: Vec<String>,
    #[serde(default)]
    issuer: Option<Did>,
    #[serde(rename = "issuanceDate", with = "time::seconds")]
    issuance_date: DateTime<Utc>,
    #[serde(rename = "expirationDate", with = "time::seconds")]
    expiration_date: DateTime<Utc>,
    #[serde(rename = "credentialSubject")]
    subject: CredentialSubject,
    proof: CredentialProof,
}

fn malformed(msg: String) -> DidError {
    DidError::MalformedCredential(msg)
}

impl TryFrom<CredentialData> for VerifiableCredential {
    type Error = DidError;

    fn try_from(mut data: CredentialData) -> Result<Self> {
        let owner = data.subject.id.clone();
        let issuer = data.issuer.unwrap_or_else(|| owner.clone());
        data.id.qualify(&owner);
        data.proof.verification_method.qualify(&issuer);

        if !data.id.belongs_to(&owner) {
            return Err(malformed(format!("{} is outside subject {owner}", data.id)));
        }
        if data.types.is_empty() {
            return Err(malformed(format!("{}: missing type", data.id)));
        }
        if !data.proof.verification_method.belongs_to(&issuer) {
            return Err(malformed(format!(
                "{}: proof key {} is not the issuer's",
                data.id, data.proof.verification_method
            )));
        }
        if data.proof.signature.is_empty() {
            return Err(malformed(format!("{}: empty signature", data.id)));
        }
        if data.expiration_date < data.issuance_date {
            return Err(malformed(format!("{}: expires before issuance", data.id)));
        }
        Ok(Self {
            id: data.id,
            types: data.types,
            issuer,
            issuance_date: data.issuance_date,
            expiration_date: data.expiration_date,
            subject: data.subject,
            proof: data.proof,
            metadata: CredentialMetadata::default(),
        })
    }
}

impl<'de> Deserialize<'de> for VerifiableCredential {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let data = CredentialData::deserialize(d)?;
        VerifiableCredential::try_from(data).map_err(serde::de::Error::custom)
    }
}

impl PartialEq for VerifiableCredential {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.types == other.types
            && self.issuer == other.issuer
            && self.issuance_date == other.issuance_date
            && self.expiration_date == other.expiration_date
            && self.subject == other.subject
            && self.proof == other.proof
    }
}

impl VerifiableCredential {
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| malformed(e.to_string()))
    }

    pub fn to_json(&self, normalized: bool) -> Result<String> {
        codec::encode(self, normalized)
    }

    pub fn id(&self) -> &DidUrl {
        &self.id
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn issuer(&self) -> &Did {
        &self.issuer
    }

    pub fn issuance_date(&self) -> DateTime<Utc> {
        self.issuance_date
    }

    pub fn expiration_date(&self) -> DateTime<Utc> {
        self.expiration_date
    }

    pub fn subject(&self) -> &CredentialSubject {
        &self.subject
    }

    pub fn proof(&self) -> &CredentialProof {
        &self.proof
    }

    pub fn metadata(&self) -> &CredentialMetadata {
        &self.metadata
    }

    pub(crate) fn set_metadata(&mut self, metadata: CredentialMetadata) {
        self.metadata = metadata;
    }

    pub fn is_self_proclaimed(&self) -> bool {
        self.issuer == self.subject.id
    }

    pub fn is_expired(&self) -> bool {
        time::now() > self.expiration_date
    }

    pub fn is_revoked(&self) -> bool {
        self.metadata.revoked
    }

    pub(crate) fn signing_bytes(&self) -> Result<Vec<u8>> {
        codec::canonical_bytes_without(self, "proof")
    }

    fn signed_by(&self, issuer: &Document) -> Result<bool> {
        let method = &self.proof.verification_method;
        if issuer.subject() != &self.issuer || !issuer.is_authentication_key(method) {
            return Ok(false);
        }
        Ok(issuer.verify(method, &self.proof.signature, &[&self.signing_bytes()?]))
    }

    /// The issuer's document is genuine and its key signed this credential.
    pub fn is_genuine(&self, resolver: &dyn DocumentResolver) -> Result<bool> {
        let Some(issuer) = resolver.resolve_document(&self.issuer)? else {
            return Ok(false);
        };
        Ok(issuer.is_genuine(resolver)? && self.signed_by(&issuer)?)
    }

    /// Genuine, unexpired, unrevoked, issued by a valid document.
    pub fn is_valid(&self, resolver: &dyn DocumentResolver) -> Result<bool> {
        if self.is_revoked() || self.is_expired() {
            return Ok(false);
        }
        let Some(issuer) = resolver.resolve_document(&self.issuer)? else {
            return Ok(false);
        };
        Ok(issuer.is_valid(resolver)? && self.signed_by(&issuer)?)
    }
}
