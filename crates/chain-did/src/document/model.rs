//! The identity document.
//!
//! A [`Document`] is immutable once built. New versions are produced by
//! editing a copy with a [`DocumentBuilder`](super::DocumentBuilder) and
//! sealing it again.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::entry::{DocumentMetadata, DocumentProof, MultiSignature, PublicKey, Service};
use super::DocumentResolver;
use crate::codec::{self, one_or_many};
use crate::credential::VerifiableCredential;
use crate::crypto::{keys, signing};
use crate::did::{Did, DidUrl};
use crate::error::{DidError, Result};
use crate::time;

/// A signed identity document.
///
/// Primitive documents are controlled by their own default key.
/// Customized documents are controlled by one or more primitive
/// controller documents with an optional `m`-of-`n` threshold.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub(crate) id: Did,
    #[serde(
        rename = "controller",
        with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub(crate) controllers: Vec<Did>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) multisig: Option<MultiSignature>,
    #[serde(rename = "publicKey")]
    pub(crate) public_keys: Vec<PublicKey>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) authentication: Vec<DidUrl>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) authorization: Vec<DidUrl>,
    #[serde(rename = "verifiableCredential", skip_serializing_if = "Vec::is_empty")]
    pub(crate) credentials: Vec<VerifiableCredential>,
    #[serde(rename = "service", skip_serializing_if = "Vec::is_empty")]
    pub(crate) services: Vec<Service>,
    #[serde(with = "time::seconds")]
    pub(crate) expires: DateTime<Utc>,
    #[serde(
        rename = "proof",
        with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub(crate) proofs: Vec<DocumentProof>,
    #[serde(skip)]
    pub(crate) metadata: DocumentMetadata,
}

#[derive(Deserialize)]
struct DocumentData {
    id: Did,
    #[serde(rename = "controller", with = "one_or_many", default)]
    controllers: Vec<Did>,
    #[serde(default)]
    multisig: Option<MultiSignature>,
    #[serde(rename = "publicKey", default)]
    public_keys: Vec<PublicKey>,
    #[serde(default)]
    authentication: Vec<DidUrl>,
    #[serde(default)]
    authorization: Vec<DidUrl>,
    #[serde(rename = "verifiableCredential", default)]
    credentials: Vec<VerifiableCredential>,
    #[serde(rename = "service", default)]
    services: Vec<Service>,
    #[serde(with = "time::seconds")]
    expires: DateTime<Utc>,
    #[serde(rename = "proof", with = "one_or_many", default)]
    proofs: Vec<DocumentProof>,
}

impl TryFrom<DocumentData> for Document {
    type Error = DidError;

    fn try_from(mut data: DocumentData) -> Result<Self> {
        let subject = data.id.clone();
        for key in &mut data.public_keys {
            key.id.qualify(&subject);
        }
        for url in data
            .authentication
            .iter_mut()
            .chain(data.authorization.iter_mut())
        {
            url.qualify(&subject);
        }
        for service in &mut data.services {
            service.id.qualify(&subject);
        }
        for proof in &mut data.proofs {
            proof.creator.qualify(&subject);
        }

        let document = Document {
            id: data.id,
            controllers: data.controllers,
            multisig: data.multisig,
            public_keys: data.public_keys,
            authentication: data.authentication,
            authorization: data.authorization,
            credentials: data.credentials,
            services: data.services,
            expires: data.expires,
            proofs: data.proofs,
            metadata: DocumentMetadata::default(),
        };
        document.check_structure()?;

        if document.proofs.is_empty() {
            return Err(malformed(format!("{subject}: missing proof")));
        }
        if document.proofs.len() > document.quorum() {
            return Err(malformed(format!(
                "{subject}: {} proofs exceed the quorum of {}",
                document.proofs.len(),
                document.quorum()
            )));
        }
        let mut signers = HashSet::new();
        for proof in &document.proofs {
            let signer = proof
                .creator
                .did()
                .ok_or_else(|| malformed(format!("{subject}: unqualified proof creator")))?;
            if !signers.insert(signer) {
                return Err(malformed(format!("{subject}: duplicate proof from {signer}")));
            }
        }
        Ok(document)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let data = DocumentData::deserialize(d)?;
        Document::try_from(data).map_err(serde::de::Error::custom)
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.controllers == other.controllers
            && self.multisig == other.multisig
            && self.public_keys == other.public_keys
            && self.authentication == other.authentication
            && self.authorization == other.authorization
            && self.credentials == other.credentials
            && self.services == other.services
            && self.expires == other.expires
            && self.proofs == other.proofs
    }
}

fn malformed(msg: String) -> DidError {
    DidError::MalformedDocument(msg)
}

impl Document {
    /// Parse a document from JSON, enforcing its structural invariants.
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| malformed(e.to_string()))
    }

    /// Serialize; `normalized` yields the canonical signing form.
    pub fn to_json(&self, normalized: bool) -> Result<String> {
        codec::encode(self, normalized)
    }

    /// Structural invariants shared by decoding and building.
    pub(crate) fn check_structure(&self) -> Result<()> {
        let subject = &self.id;

        let mut controllers = BTreeSet::new();
        for controller in &self.controllers {
            if controller == subject {
                return Err(malformed(format!("{subject} cannot control itself")));
            }
            if !controllers.insert(controller) {
                return Err(malformed(format!("duplicate controller {controller}")));
            }
        }
        let n = self.controllers.len();
        match self.multisig {
            Some(ms) if n > 1 && ms.n() != n => {
                return Err(malformed(format!(
                    "multisig {ms} does not match {n} controllers"
                )))
            }
            Some(ms) if n <= 1 => {
                return Err(malformed(format!(
                    "multisig {ms} requires more than one controller"
                )))
            }
            None if n > 1 => {
                return Err(malformed(format!("missing multisig for {n} controllers")))
            }
            _ => {}
        }

        let mut ids = HashSet::new();
        let mut materials = HashSet::new();
        for key in &self.public_keys {
            if !key.id.belongs_to(subject) {
                return Err(malformed(format!("key {} is outside {subject}", key.id)));
            }
            if !ids.insert(&key.id) {
                return Err(malformed(format!("duplicate key {}", key.id)));
            }
            if !materials.insert(key.public_key_base58.as_str()) {
                return Err(malformed(format!("duplicate key material in {}", key.id)));
            }
            keys::verifying_key_from_base58(&key.public_key_base58)
                .map_err(|e| malformed(format!("key {}: {e}", key.id)))?;
        }

        let mut refs = HashSet::new();
        for url in &self.authentication {
            let key = self
                .public_key(url)
                .ok_or_else(|| malformed(format!("authentication key {url} is not declared")))?;
            if key.controller != *subject {
                return Err(malformed(format!(
                    "authentication key {url} must be controlled by {subject}"
                )));
            }
            if !refs.insert(url) {
                return Err(malformed(format!("duplicate reference {url}")));
            }
        }
        for url in &self.authorization {
            let key = self
                .public_key(url)
                .ok_or_else(|| malformed(format!("authorization key {url} is not declared")))?;
            if key.controller == *subject {
                return Err(malformed(format!(
                    "authorization key {url} must be controlled by another DID"
                )));
            }
            if !refs.insert(url) {
                return Err(malformed(format!("duplicate reference {url}")));
            }
        }

        match (self.controllers.is_empty(), self.default_key().is_some()) {
            (true, false) => {
                return Err(malformed(format!(
                    "primitive document {subject} has no default key"
                )))
            }
            (false, true) => {
                return Err(malformed(format!(
                    "customized document {subject} cannot hold a default key"
                )))
            }
            _ => {}
        }

        let mut credential_ids = HashSet::new();
        for vc in &self.credentials {
            if vc.subject().id() != subject {
                return Err(malformed(format!("credential {} is not about {subject}", vc.id())));
            }
            if !credential_ids.insert(vc.id()) {
                return Err(malformed(format!("duplicate credential {}", vc.id())));
            }
        }

        let mut service_ids = HashSet::new();
        for service in &self.services {
            if !service.id.belongs_to(subject) {
                return Err(malformed(format!("service {} is outside {subject}", service.id)));
            }
            if !service_ids.insert(&service.id) {
                return Err(malformed(format!("duplicate service {}", service.id)));
            }
        }
        Ok(())
    }

    pub fn subject(&self) -> &Did {
        &self.id
    }

    pub fn controllers(&self) -> &[Did] {
        &self.controllers
    }

    pub fn has_controller(&self, did: &Did) -> bool {
        self.controllers.contains(did)
    }

    pub fn multisig(&self) -> Option<MultiSignature> {
        self.multisig
    }

    /// Number of proofs a fully signed document carries.
    pub fn quorum(&self) -> usize {
        self.multisig.map_or(1, |ms| ms.m())
    }

    pub fn public_keys(&self) -> &[PublicKey] {
        &self.public_keys
    }

    pub fn public_key(&self, id: &DidUrl) -> Option<&PublicKey> {
        self.public_keys.iter().find(|k| k.id == *id)
    }

    pub fn authentication_keys(&self) -> impl Iterator<Item = &PublicKey> {
        self.authentication.iter().filter_map(|id| self.public_key(id))
    }

    pub fn authorization_keys(&self) -> impl Iterator<Item = &PublicKey> {
        self.authorization.iter().filter_map(|id| self.public_key(id))
    }

    pub fn is_authentication_key(&self, id: &DidUrl) -> bool {
        self.authentication.contains(id)
    }

    pub fn is_authorization_key(&self, id: &DidUrl) -> bool {
        self.authorization.contains(id)
    }

    /// The authentication key whose address equals the subject's
    /// method-specific id.
    pub fn default_key(&self) -> Option<&PublicKey> {
        self.authentication_keys().find(|key| {
            key.controller == self.id
                && keys::derive_address(&key.public_key_base58)
                    .map(|address| address == self.id.method_specific_id())
                    .unwrap_or(false)
        })
    }

    pub fn is_customized(&self) -> bool {
        self.default_key().is_none()
    }

    pub fn credentials(&self) -> &[VerifiableCredential] {
        &self.credentials
    }

    pub fn credential(&self, id: &DidUrl) -> Option<&VerifiableCredential> {
        self.credentials.iter().find(|vc| vc.id() == id)
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn service(&self, id: &DidUrl) -> Option<&Service> {
        self.services.iter().find(|s| s.id == *id)
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    pub fn is_expired(&self) -> bool {
        time::now() > self.expires
    }

    pub fn proofs(&self) -> &[DocumentProof] {
        &self.proofs
    }

    /// The proof contributed by `signer`, if any.
    pub fn proof_by(&self, signer: &Did) -> Option<&DocumentProof> {
        self.proofs.iter().find(|p| p.creator.belongs_to(signer))
    }

    /// Whether the document carries exactly its quorum of proofs.
    pub fn is_qualified(&self) -> bool {
        self.proofs.len() == self.quorum()
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    pub(crate) fn set_metadata(&mut self, metadata: DocumentMetadata) {
        self.metadata = metadata;
    }

    pub fn is_deactivated(&self) -> bool {
        self.metadata.deactivated
    }

    /// Normalized bytes covered by document proofs.
    pub(crate) fn signing_bytes(&self) -> Result<Vec<u8>> {
        codec::canonical_bytes_without(self, "proof")
    }

    /// Verify `signature` over `inputs` with one of this document's keys.
    pub fn verify(&self, key: &DidUrl, signature: &str, inputs: &[&[u8]]) -> bool {
        self.public_key(key)
            .map(|k| signing::verify(&k.public_key_base58, signature, inputs))
            .unwrap_or(false)
    }

    /// Check every present proof, without requiring the full quorum.
    pub fn verify_proofs(&self, resolver: &dyn DocumentResolver) -> Result<bool> {
        if self.proofs.is_empty() {
            return Ok(false);
        }
        let digest = self.signing_bytes()?;

        if let Some(default_key) = self.default_key() {
            let [proof] = self.proofs.as_slice() else {
                return Ok(false);
            };
            return Ok(proof.creator == default_key.id
                && signing::verify(&default_key.public_key_base58, &proof.signature, &[&digest]));
        }

        let mut seen = HashSet::new();
        for proof in &self.proofs {
            let Some(signer) = proof.creator.did() else {
                return Ok(false);
            };
            if !self.has_controller(signer) || !seen.insert(signer) {
                return Ok(false);
            }
            let Some(controller) = resolver.resolve_document(signer)? else {
                log::debug!("{}: controller {signer} did not resolve", self.id);
                return Ok(false);
            };
            let Some(key) = controller.default_key() else {
                return Ok(false);
            };
            if key.id != proof.creator
                || !signing::verify(&key.public_key_base58, &proof.signature, &[&digest])
            {
                return Ok(false);
            }
            if !controller.is_genuine(resolver)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Proofs are complete and every signature verifies.
    pub fn is_genuine(&self, resolver: &dyn DocumentResolver) -> Result<bool> {
        if !self.is_qualified() {
            return Ok(false);
        }
        self.verify_proofs(resolver)
    }

    /// Genuine, unexpired, not deactivated, with valid controllers.
    pub fn is_valid(&self, resolver: &dyn DocumentResolver) -> Result<bool> {
        if self.is_deactivated() || self.is_expired() {
            return Ok(false);
        }
        if !self.is_genuine(resolver)? {
            return Ok(false);
        }
        for did in &self.controllers {
            match resolver.resolve_document(did)? {
                Some(controller)
                    if !controller.is_deactivated()
                        && !controller.is_expired()
                        && controller.is_genuine(resolver)? => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }
}
