//! Builder for new and edited documents.
//!
//! Every mutation validates its input immediately and discards any
//! proofs gathered so far. The builder is consumed by [`DocumentBuilder::seal`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::entry::{
    DocumentMetadata, DocumentProof, MultiSignature, PublicKey, Service, DEFAULT_PROOF_TYPE,
    RESERVED_SERVICE_FIELDS,
};
use super::model::Document;
use crate::credential::VerifiableCredential;
use crate::crypto::keys;
use crate::crypto::{signing, KeyProvider};
use crate::did::{Did, DidUrl};
use crate::error::{DidError, Result};
use crate::time;

/// Fragment of the key a primitive document is created with.
pub const DEFAULT_KEY_FRAGMENT: &str = "primary";

/// Builder for [`Document`].
///
/// # Example
///
/// ```
/// use chain_did::crypto::{Ed25519KeyPair, KeyRing};
/// use chain_did::document::DocumentBuilder;
///
/// let key = Ed25519KeyPair::generate();
/// let mut builder = DocumentBuilder::primitive(&key.public_key_base58()).unwrap();
/// let mut keys = KeyRing::new();
/// keys.insert(builder.default_key_id().unwrap(), key);
///
/// builder
///     .add_service("#vault", "Storage", "https://vault.example", None)
///     .unwrap();
/// let doc = builder.seal(&keys).unwrap();
/// assert!(doc.is_qualified());
/// ```
#[derive(Debug)]
pub struct DocumentBuilder {
    subject: Did,
    controllers: BTreeSet<Did>,
    multisig: Option<MultiSignature>,
    public_keys: BTreeMap<DidUrl, PublicKey>,
    authentication: BTreeSet<DidUrl>,
    authorization: BTreeSet<DidUrl>,
    credentials: BTreeMap<DidUrl, VerifiableCredential>,
    services: BTreeMap<DidUrl, Service>,
    expires: Option<DateTime<Utc>>,
    proofs: Vec<DocumentProof>,
    effective_controller: Option<Document>,
}

impl DocumentBuilder {
    fn empty(subject: Did) -> Self {
        Self {
            subject,
            controllers: BTreeSet::new(),
            multisig: None,
            public_keys: BTreeMap::new(),
            authentication: BTreeSet::new(),
            authorization: BTreeSet::new(),
            credentials: BTreeMap::new(),
            services: BTreeMap::new(),
            expires: None,
            proofs: Vec::new(),
            effective_controller: None,
        }
    }

    /// Start a primitive document owned by `public_key`.
    pub fn primitive(public_key: &str) -> Result<Self> {
        let subject = Did::from_public_key(public_key)?;
        let mut builder = Self::empty(subject.clone());
        let id = DidUrl::new(&subject, DEFAULT_KEY_FRAGMENT)?;
        builder.insert_key(PublicKey::new(id.clone(), subject, public_key.to_string()))?;
        builder.authentication.insert(id);
        Ok(builder)
    }

    /// Start a customized document named `subject`, controlled and signed
    /// by `controller`.
    pub fn customized(subject: Did, controller: &Document) -> Result<Self> {
        check_controller_document(&subject, controller)?;
        let mut builder = Self::empty(subject);
        builder.controllers.insert(controller.subject().clone());
        builder.effective_controller = Some(controller.clone());
        Ok(builder)
    }

    /// Edit an existing document. Primitive documents sign for themselves.
    pub fn edit(document: &Document) -> Self {
        Self {
            subject: document.id.clone(),
            controllers: document.controllers.iter().cloned().collect(),
            multisig: document.multisig,
            public_keys: document
                .public_keys
                .iter()
                .map(|k| (k.id.clone(), k.clone()))
                .collect(),
            authentication: document.authentication.iter().cloned().collect(),
            authorization: document.authorization.iter().cloned().collect(),
            credentials: document
                .credentials
                .iter()
                .map(|vc| (vc.id().clone(), vc.clone()))
                .collect(),
            services: document
                .services
                .iter()
                .map(|s| (s.id.clone(), s.clone()))
                .collect(),
            expires: Some(document.expires),
            proofs: document.proofs.clone(),
            effective_controller: None,
        }
    }

    /// Edit a customized document on behalf of one of its controllers.
    pub fn edit_as(document: &Document, controller: &Document) -> Result<Self> {
        if !document.is_customized() {
            return Err(DidError::NotCustomized(document.subject().to_string()));
        }
        if !document.has_controller(controller.subject()) {
            return Err(DidError::NotController(controller.subject().to_string()));
        }
        let mut builder = Self::edit(document);
        builder.effective_controller = Some(controller.clone());
        Ok(builder)
    }

    pub fn subject(&self) -> &Did {
        &self.subject
    }

    /// Id of the key a primitive document signs with.
    pub fn default_key_id(&self) -> Option<DidUrl> {
        self.default_key().map(|k| k.id.clone())
    }

    fn default_key(&self) -> Option<&PublicKey> {
        self.authentication
            .iter()
            .filter_map(|id| self.public_keys.get(id))
            .find(|key| {
                key.controller == self.subject
                    && keys::derive_address(&key.public_key_base58)
                        .map(|address| address == self.subject.method_specific_id())
                        .unwrap_or(false)
            })
    }

    pub fn is_customized(&self) -> bool {
        self.default_key().is_none()
    }

    fn require_customized(&self) -> Result<()> {
        if self.is_customized() {
            Ok(())
        } else {
            Err(DidError::NotCustomized(self.subject.to_string()))
        }
    }

    fn url(&self, id: &str) -> Result<DidUrl> {
        let url = DidUrl::parse_with_base(&self.subject, id)?;
        if !url.belongs_to(&self.subject) {
            return Err(DidError::IllegalUsage(format!(
                "{url} does not belong to {}",
                self.subject
            )));
        }
        Ok(url)
    }

    fn touched(&mut self) -> &mut Self {
        self.proofs.clear();
        self
    }

    fn insert_key(&mut self, key: PublicKey) -> Result<()> {
        keys::verifying_key_from_base58(&key.public_key_base58)?;
        if self.public_keys.contains_key(&key.id) {
            return Err(DidError::AlreadyExists(key.id.to_string()));
        }
        if self
            .public_keys
            .values()
            .any(|k| k.public_key_base58 == key.public_key_base58)
        {
            return Err(DidError::AlreadyExists(format!(
                "key material of {}",
                key.id
            )));
        }
        self.public_keys.insert(key.id.clone(), key);
        Ok(())
    }

    /// Add a primitive, unexpired controller.
    pub fn add_controller(&mut self, controller: &Document) -> Result<&mut Self> {
        self.require_customized()?;
        check_controller_document(&self.subject, controller)?;
        if !self.controllers.insert(controller.subject().clone()) {
            return Err(DidError::AlreadyExists(controller.subject().to_string()));
        }
        Ok(self.touched())
    }

    pub fn remove_controller(&mut self, did: &Did) -> Result<&mut Self> {
        self.require_customized()?;
        if self
            .effective_controller
            .as_ref()
            .is_some_and(|c| c.subject() == did)
        {
            return Err(DidError::CannotRemoveEffectiveController(did.to_string()));
        }
        if !self.controllers.remove(did) {
            return Err(DidError::NotController(did.to_string()));
        }
        Ok(self.touched())
    }

    /// Require `m` of the current controllers to sign.
    ///
    /// With at most one controller the threshold is cleared.
    pub fn set_multisig(&mut self, m: usize) -> Result<&mut Self> {
        self.require_customized()?;
        let n = self.controllers.len();
        if m < 1 || m > n.max(1) {
            return Err(DidError::InvalidMultisig(format!("{m} of {n} controllers")));
        }
        self.multisig = if n <= 1 {
            None
        } else {
            Some(MultiSignature::new(m, n)?)
        };
        Ok(self.touched())
    }

    /// Declare a key without giving it a role.
    pub fn add_public_key(
        &mut self,
        id: &str,
        controller: &Did,
        public_key: &str,
    ) -> Result<&mut Self> {
        let id = self.url(id)?;
        self.insert_key(PublicKey::new(id, controller.clone(), public_key.to_string()))?;
        Ok(self.touched())
    }

    /// Remove a key. Keys holding a role are only removed with `force`.
    pub fn remove_public_key(&mut self, id: &str, force: bool) -> Result<&mut Self> {
        let id = self.url(id)?;
        if !self.public_keys.contains_key(&id) {
            return Err(DidError::NotFound(id.to_string()));
        }
        if self.default_key().is_some_and(|k| k.id == id) {
            return Err(DidError::IllegalUsage(format!(
                "cannot remove the default key {id}"
            )));
        }
        let in_use = self.authentication.contains(&id) || self.authorization.contains(&id);
        if in_use && !force {
            return Err(DidError::IllegalUsage(format!("key {id} is in use")));
        }
        self.authentication.remove(&id);
        self.authorization.remove(&id);
        self.public_keys.remove(&id);
        Ok(self.touched())
    }

    /// Add an authentication key, or grant the role to a declared key.
    pub fn add_authentication_key(&mut self, id: &str, public_key: &str) -> Result<&mut Self> {
        let id = self.url(id)?;
        match self.public_keys.get(&id) {
            Some(key) => {
                if key.public_key_base58 != public_key || key.controller != self.subject {
                    return Err(DidError::AlreadyExists(format!(
                        "{id} is declared with different material"
                    )));
                }
                if self.authorization.contains(&id) {
                    return Err(DidError::IllegalUsage(format!(
                        "{id} is an authorization key"
                    )));
                }
            }
            None => self.insert_key(PublicKey::new(
                id.clone(),
                self.subject.clone(),
                public_key.to_string(),
            ))?,
        }
        if !self.authentication.insert(id.clone()) {
            return Err(DidError::AlreadyExists(id.to_string()));
        }
        Ok(self.touched())
    }

    pub fn remove_authentication_key(&mut self, id: &str) -> Result<&mut Self> {
        let id = self.url(id)?;
        if !self.authentication.contains(&id) {
            return Err(DidError::NotFound(id.to_string()));
        }
        if self.default_key().is_some_and(|k| k.id == id) {
            return Err(DidError::IllegalUsage(format!(
                "cannot remove the default key {id}"
            )));
        }
        self.authentication.remove(&id);
        Ok(self.touched())
    }

    /// Let a key controlled by another DID act on this document.
    pub fn add_authorization_key(
        &mut self,
        id: &str,
        controller: &Did,
        public_key: &str,
    ) -> Result<&mut Self> {
        if self.is_customized() {
            return Err(DidError::IllegalUsage(format!(
                "customized document {} cannot authorize keys",
                self.subject
            )));
        }
        if *controller == self.subject {
            return Err(DidError::IllegalUsage(format!(
                "authorization key must be controlled by another DID than {}",
                self.subject
            )));
        }
        let id = self.url(id)?;
        match self.public_keys.get(&id) {
            Some(key) if key.public_key_base58 == public_key && key.controller == *controller => {}
            Some(_) => {
                return Err(DidError::AlreadyExists(format!(
                    "{id} is declared with different material"
                )))
            }
            None => self.insert_key(PublicKey::new(
                id.clone(),
                controller.clone(),
                public_key.to_string(),
            ))?,
        }
        if !self.authorization.insert(id.clone()) {
            return Err(DidError::AlreadyExists(id.to_string()));
        }
        Ok(self.touched())
    }

    /// Authorize an authentication key of another document, its default
    /// key when `key` is `None`.
    pub fn authorize_did(
        &mut self,
        id: &str,
        authorizer: &Document,
        key: Option<&DidUrl>,
    ) -> Result<&mut Self> {
        let key = match key {
            Some(key) => authorizer
                .public_key(key)
                .filter(|_| authorizer.is_authentication_key(key)),
            None => authorizer.default_key(),
        }
        .ok_or_else(|| {
            DidError::InvalidKey(format!(
                "no authentication key to authorize in {}",
                authorizer.subject()
            ))
        })?
        .clone();
        self.add_authorization_key(id, authorizer.subject(), &key.public_key_base58)
    }

    pub fn remove_authorization_key(&mut self, id: &str) -> Result<&mut Self> {
        let id = self.url(id)?;
        if !self.authorization.remove(&id) {
            return Err(DidError::NotFound(id.to_string()));
        }
        Ok(self.touched())
    }

    /// Embed a credential about this subject.
    pub fn add_credential(&mut self, credential: VerifiableCredential) -> Result<&mut Self> {
        if credential.subject().id() != &self.subject {
            return Err(DidError::IllegalUsage(format!(
                "credential {} is not about {}",
                credential.id(),
                self.subject
            )));
        }
        if self.credentials.contains_key(credential.id()) {
            return Err(DidError::AlreadyExists(credential.id().to_string()));
        }
        self.credentials.insert(credential.id().clone(), credential);
        Ok(self.touched())
    }

    pub fn remove_credential(&mut self, id: &str) -> Result<&mut Self> {
        let id = self.url(id)?;
        if self.credentials.remove(&id).is_none() {
            return Err(DidError::NotFound(id.to_string()));
        }
        Ok(self.touched())
    }

    /// Add a service endpoint with optional extra properties.
    pub fn add_service(
        &mut self,
        id: &str,
        service_type: &str,
        endpoint: &str,
        properties: Option<BTreeMap<String, Value>>,
    ) -> Result<&mut Self> {
        let id = self.url(id)?;
        if self.services.contains_key(&id) {
            return Err(DidError::AlreadyExists(id.to_string()));
        }
        let properties = properties.unwrap_or_default();
        if let Some(name) = properties
            .keys()
            .find(|name| RESERVED_SERVICE_FIELDS.contains(&name.as_str()))
        {
            return Err(DidError::IllegalUsage(format!(
                "service property {name} is reserved"
            )));
        }
        self.services.insert(
            id.clone(),
            Service {
                id,
                service_type: service_type.to_string(),
                endpoint: endpoint.to_string(),
                properties,
            },
        );
        Ok(self.touched())
    }

    pub fn remove_service(&mut self, id: &str) -> Result<&mut Self> {
        let id = self.url(id)?;
        if self.services.remove(&id).is_none() {
            return Err(DidError::NotFound(id.to_string()));
        }
        Ok(self.touched())
    }

    pub fn set_expires(&mut self, expires: DateTime<Utc>) -> &mut Self {
        self.expires = Some(time::truncate(expires));
        self.touched()
    }

    pub fn set_default_expires(&mut self) -> &mut Self {
        self.set_expires(time::default_expires())
    }

    fn sanitize(&self) -> Result<Document> {
        let customized = self.is_customized();
        if customized && self.controllers.is_empty() {
            return Err(DidError::MalformedDocument(format!(
                "customized document {} has no controller",
                self.subject
            )));
        }
        let n = self.controllers.len();
        let multisig = match self.multisig {
            Some(ms) if n > 1 && ms.n() != n => {
                return Err(DidError::InvalidMultisig(format!(
                    "{ms} does not match {n} controllers"
                )))
            }
            None if n > 1 => {
                return Err(DidError::InvalidMultisig(format!(
                    "threshold required for {n} controllers"
                )))
            }
            ms if n > 1 => ms,
            _ => None,
        };
        let expires = match self.expires {
            Some(expires) => expires,
            None => time::default_expires(),
        };
        let mut proofs = self.proofs.clone();
        sort_proofs(&mut proofs);

        let document = Document {
            id: self.subject.clone(),
            controllers: self.controllers.iter().cloned().collect(),
            multisig,
            public_keys: self.public_keys.values().cloned().collect(),
            authentication: self.authentication.iter().cloned().collect(),
            authorization: self.authorization.iter().cloned().collect(),
            credentials: self.credentials.values().cloned().collect(),
            services: self.services.values().cloned().collect(),
            expires,
            proofs,
            metadata: DocumentMetadata::default(),
        };
        document.check_structure()?;
        Ok(document)
    }

    /// Sign the document with the effective signer's default key.
    pub fn seal(self, keys: &dyn KeyProvider) -> Result<Document> {
        let mut document = self.sanitize()?;
        if document.proofs.len() >= document.quorum() {
            return Err(DidError::AlreadySealed);
        }

        let (signer, sign_key) = if document.is_customized() {
            let controller = self
                .effective_controller
                .as_ref()
                .ok_or(DidError::NoEffectiveController)?;
            let key = controller.default_key().ok_or_else(|| {
                DidError::InvalidKey(format!("{} has no default key", controller.subject()))
            })?;
            (controller.subject().clone(), key.clone())
        } else {
            let key = document
                .default_key()
                .ok_or_else(|| DidError::InvalidKey(format!("{} has no default key", self.subject)))?;
            (self.subject.clone(), key.clone())
        };

        if document.proof_by(&signer).is_some() {
            return Err(DidError::AlreadySigned(signer.to_string()));
        }

        let signing_key = keys.signing_key(&sign_key.id)?;
        if bs58::encode(signing_key.verifying_key().as_bytes()).into_string()
            != sign_key.public_key_base58
        {
            return Err(DidError::InvalidKey(format!(
                "secret does not match {}",
                sign_key.id
            )));
        }

        let digest = document.signing_bytes()?;
        document.proofs.push(DocumentProof {
            proof_type: DEFAULT_PROOF_TYPE.to_string(),
            created: time::now(),
            creator: sign_key.id.clone(),
            signature: signing::sign(&signing_key, &[&digest]),
        });
        sort_proofs(&mut document.proofs);
        log::debug!("{} sealed by {}", document.subject(), sign_key.id);
        Ok(document)
    }
}

fn sort_proofs(proofs: &mut [DocumentProof]) {
    proofs.sort_by(|a, b| {
        a.created
            .cmp(&b.created)
            .then_with(|| a.creator.cmp(&b.creator))
    });
}

fn check_controller_document(subject: &Did, controller: &Document) -> Result<()> {
    if controller.subject() == subject {
        return Err(DidError::IllegalUsage(format!("{subject} cannot control itself")));
    }
    if controller.is_customized() {
        return Err(DidError::IllegalUsage(format!(
            "controller {} must be a primitive document",
            controller.subject()
        )));
    }
    if controller.is_expired() {
        return Err(DidError::DocumentNotValid(format!(
            "controller {} is expired",
            controller.subject()
        )));
    }
    Ok(())
}
