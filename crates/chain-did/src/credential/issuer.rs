//! Credential issuance.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::model::{
    CredentialMetadata, CredentialProof, CredentialSubject, VerifiableCredential,
    VERIFIABLE_CREDENTIAL_TYPE,
};
use crate::crypto::{signing, KeyProvider};
use crate::did::{Did, DidUrl};
use crate::document::{Document, DEFAULT_PROOF_TYPE};
use crate::error::{DidError, Result};
use crate::time;

/// A document able to sign credentials with one of its authentication keys.
pub struct Issuer {
    document: Document,
    sign_key: DidUrl,
}

impl Issuer {
    /// Use `sign_key`, or the document's default key when `None`.
    pub fn new(document: Document, sign_key: Option<DidUrl>) -> Result<Self> {
        let sign_key = match sign_key {
            Some(key) if document.is_authentication_key(&key) => key,
            Some(key) => {
                return Err(DidError::InvalidKey(format!(
                    "{key} is not an authentication key of {}",
                    document.subject()
                )))
            }
            None => document
                .default_key()
                .map(|k| k.id().clone())
                .ok_or_else(|| {
                    DidError::InvalidKey(format!(
                        "{} has no default key, a sign key is required",
                        document.subject()
                    ))
                })?,
        };
        Ok(Self { document, sign_key })
    }

    pub fn did(&self) -> &Did {
        self.document.subject()
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn sign_key(&self) -> &DidUrl {
        &self.sign_key
    }

    /// Start a credential about `owner`.
    pub fn issue_for(&self, owner: &Did) -> CredentialBuilder<'_> {
        CredentialBuilder {
            issuer: self,
            owner: owner.clone(),
            id: None,
            types: BTreeSet::new(),
            properties: BTreeMap::new(),
            expiration: None,
        }
    }
}

/// Builder for a [`VerifiableCredential`]; inputs are checked by `seal`.
pub struct CredentialBuilder<'a> {
    issuer: &'a Issuer,
    owner: Did,
    id: Option<String>,
    types: BTreeSet<String>,
    properties: BTreeMap<String, Value>,
    expiration: Option<DateTime<Utc>>,
}

impl<'a> CredentialBuilder<'a> {
    /// Credential id, either `#fragment` or a full DID URL of the owner.
    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn credential_type(mut self, credential_type: &str) -> Self {
        self.types.insert(credential_type.to_string());
        self
    }

    pub fn property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    pub fn properties(mut self, properties: BTreeMap<String, Value>) -> Self {
        self.properties.extend(properties);
        self
    }

    /// Defaults to the issuer document's expiration.
    pub fn expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(time::truncate(expiration));
        self
    }

    /// Sign the credential with the issuer's key.
    pub fn seal(self, keys: &dyn KeyProvider) -> Result<VerifiableCredential> {
        let issuer_doc = &self.issuer.document;
        if issuer_doc.is_expired() || issuer_doc.is_deactivated() {
            return Err(DidError::DocumentNotValid(format!(
                "issuer {} is expired or deactivated",
                issuer_doc.subject()
            )));
        }

        let raw_id = self
            .id
            .ok_or_else(|| DidError::MalformedCredential("missing credential id".into()))?;
        let id = DidUrl::parse_with_base(&self.owner, &raw_id)?;
        if !id.belongs_to(&self.owner) {
            return Err(DidError::IllegalUsage(format!(
                "{id} does not belong to {}",
                self.owner
            )));
        }
        if self.properties.contains_key("id") {
            return Err(DidError::IllegalUsage("property id is reserved".into()));
        }

        let now = time::now();
        let expiration = self.expiration.unwrap_or(issuer_doc.expires());
        if expiration > issuer_doc.expires() {
            return Err(DidError::IllegalUsage(format!(
                "expiration {} is later than the issuer's {}",
                time::format(&expiration),
                time::format(&issuer_doc.expires())
            )));
        }
        if expiration <= now {
            return Err(DidError::IllegalUsage("expiration is in the past".into()));
        }

        let mut types = self.types;
        types.insert(VERIFIABLE_CREDENTIAL_TYPE.to_string());

        let mut credential = VerifiableCredential {
            id,
            types: types.into_iter().collect(),
            issuer: issuer_doc.subject().clone(),
            issuance_date: now,
            expiration_date: expiration,
            subject: CredentialSubject {
                id: self.owner,
                properties: self.properties,
            },
            proof: CredentialProof {
                proof_type: DEFAULT_PROOF_TYPE.to_string(),
                created: now,
                verification_method: self.issuer.sign_key.clone(),
                signature: String::new(),
            },
            metadata: CredentialMetadata::default(),
        };
        let signing_key = keys.signing_key(&self.issuer.sign_key)?;
        credential.proof.signature = signing::sign(&signing_key, &[&credential.signing_bytes()?]);
        log::debug!("issued {} by {}", credential.id, credential.issuer);
        Ok(credential)
    }
}
