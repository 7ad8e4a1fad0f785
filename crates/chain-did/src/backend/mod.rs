//! Resolution backend: the only component that talks to the ledger.
//!
//! The backend provides:
//! - The resolve request/response protocol and its LRU + TTL cache
//! - Biography interpretation for documents and credentials
//! - Publishing of signed document and credential requests
//! - An in-memory ledger for tests and local tooling

pub mod biography;
pub mod cache;
pub mod memory;
pub mod protocol;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

pub use biography::{
    CredentialBiography, CredentialList, CredentialStatus, CredentialTransaction, DidBiography,
    DidTransaction, DocumentStatus, Transaction,
};
pub use cache::ResolveCache;
pub use memory::InMemoryLedger;
pub use protocol::{
    CacheKey, CredentialResolveParams, DidResolveParams, ListCredentialsParams, ResolveMethod,
    ResolveRequest, ResolveResponse,
};
pub use transport::LedgerTransport;

use crate::credential::{CredentialMetadata, VerifiableCredential};
use crate::crypto::KeyProvider;
use crate::did::{Did, DidUrl};
use crate::document::{Document, DocumentMetadata, DocumentResolver};
use crate::error::{DidError, Result};
use crate::request::{CredentialOperation, CredentialRequest, DocumentOperation, DocumentRequest};
use crate::ticket::TransferTicket;

/// Backend configuration.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Maximum number of cached resolve results.
    pub cache_capacity: usize,
    /// Age after which a cached result is resolved again.
    pub cache_ttl: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 64,
            cache_ttl: Duration::from_secs(10 * 60),
        }
    }
}

/// Supplies documents that are not (yet) on the ledger.
pub type LocalResolveHandle = dyn Fn(&Did) -> Option<Document> + Send + Sync;

#[derive(Debug, Clone)]
enum Resolved {
    Did(DidBiography),
    Credential(CredentialBiography),
    List(CredentialList),
}

/// Resolves and publishes documents and credentials through a ledger
/// transport.
pub struct Backend {
    transport: Arc<dyn LedgerTransport>,
    cache: ResolveCache<CacheKey, Resolved>,
    local_resolver: Option<Box<LocalResolveHandle>>,
}

impl Backend {
    pub fn new(transport: Arc<dyn LedgerTransport>) -> Self {
        Self::with_config(transport, BackendConfig::default())
    }

    pub fn with_config(transport: Arc<dyn LedgerTransport>, config: BackendConfig) -> Self {
        Self {
            transport,
            cache: ResolveCache::new(config.cache_capacity, config.cache_ttl),
            local_resolver: None,
        }
    }

    /// Consult `handle` before every ledger round trip for a document.
    pub fn set_local_resolver<F>(&mut self, handle: F)
    where
        F: Fn(&Did) -> Option<Document> + Send + Sync + 'static,
    {
        self.local_resolver = Some(Box::new(handle));
    }

    pub fn clear_local_resolver(&mut self) {
        self.local_resolver = None;
    }

    pub fn transport(&self) -> &Arc<dyn LedgerTransport> {
        &self.transport
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn send<P: Serialize>(&self, request: &ResolveRequest<P>) -> Result<Resolved> {
        let json = serde_json::to_string(request)?;
        log::debug!("{:?} round trip, request {}", request.method(), request.id());
        let raw = self.transport.resolve(&json)?;
        let response: ResolveResponse = serde_json::from_str(&raw)
            .map_err(|e| DidError::Resolution(format!("unparsable response: {e}")))?;
        Ok(match request.method() {
            ResolveMethod::ResolveDid => Resolved::Did(response.into_result(request.id())?),
            ResolveMethod::ResolveCredential => {
                Resolved::Credential(response.into_result(request.id())?)
            }
            ResolveMethod::ListCredentials => Resolved::List(response.into_result(request.id())?),
        })
    }

    fn resolve<P: Serialize>(&self, method: ResolveMethod, params: P, force: bool) -> Result<Resolved> {
        let request = ResolveRequest::new(method, params);
        let key = request.cache_key()?;
        if force {
            self.cache.invalidate(&key);
        }
        self.cache.get_or_try_insert_with(key, || self.send(&request))
    }

    /// The DID's biography; `all` asks for every transaction.
    pub fn resolve_did_biography(&self, did: &Did, all: bool, force: bool) -> Result<DidBiography> {
        let params = DidResolveParams {
            did: did.clone(),
            all,
        };
        match self.resolve(ResolveMethod::ResolveDid, params, force)? {
            Resolved::Did(bio) if bio.did() == did => Ok(bio),
            Resolved::Did(bio) => Err(DidError::Resolution(format!(
                "asked for {did}, got the biography of {}",
                bio.did()
            ))),
            other => Err(DidError::Resolution(format!("unexpected result {other:?}"))),
        }
    }

    /// Resolve the current document of `did`; `Ok(None)` when unknown.
    pub fn resolve_did(&self, did: &Did, force: bool) -> Result<Option<Document>> {
        if let Some(handle) = &self.local_resolver {
            if let Some(document) = handle(did) {
                log::debug!("{did} resolved locally");
                return Ok(Some(document));
            }
        }
        let bio = self.resolve_did_biography(did, false, force)?;
        self.interpret_did(&bio)
    }

    fn interpret_did(&self, bio: &DidBiography) -> Result<Option<Document>> {
        let did = bio.did();
        let txs = bio.transactions();
        let (authoritative, deactivated) = match bio.status() {
            DocumentStatus::NotFound => return Ok(None),
            DocumentStatus::Valid => match txs.first() {
                Some(tx) => (tx, false),
                None => return Err(DidError::Resolution(format!("{did}: empty biography"))),
            },
            DocumentStatus::Deactivated => {
                let [deactivation, previous] = txs else {
                    return Err(DidError::Resolution(format!(
                        "deactivated {did} must carry 2 transactions, found {}",
                        txs.len()
                    )));
                };
                if deactivation.request.operation() != DocumentOperation::Deactivate {
                    return Err(DidError::Resolution(format!(
                        "{did}: latest transaction {} is not a deactivation",
                        deactivation.txid
                    )));
                }
                let previous_doc = previous.request.document().ok_or_else(|| {
                    DidError::Resolution(format!(
                        "{did}: transaction {} carries no document",
                        previous.txid
                    ))
                })?;
                let substituted = Substituted {
                    did,
                    document: previous_doc,
                    inner: self,
                };
                if !deactivation.request.is_valid(&substituted)? {
                    log::warn!("{did}: rejected deactivation {}", deactivation.txid);
                    return Err(DidError::Resolution(format!(
                        "{did}: invalid deactivation {}",
                        deactivation.txid
                    )));
                }
                (previous, true)
            }
        };

        match authoritative.request.operation() {
            DocumentOperation::Create | DocumentOperation::Update | DocumentOperation::Transfer => {}
            DocumentOperation::Deactivate => {
                return Err(DidError::Resolution(format!(
                    "{did}: transaction {} is an unexpected deactivation",
                    authoritative.txid
                )))
            }
        }
        if !authoritative.request.is_valid(self)? {
            log::warn!(
                "{did}: rejected {} transaction {}",
                authoritative.request.operation(),
                authoritative.txid
            );
            return Err(DidError::Resolution(format!(
                "{did}: invalid {} transaction {}",
                authoritative.request.operation(),
                authoritative.txid
            )));
        }

        let mut document = authoritative.request.document().cloned().ok_or_else(|| {
            DidError::Resolution(format!("{did}: transaction carries no document"))
        })?;
        if document.is_customized()
            && authoritative.request.operation() != DocumentOperation::Create
        {
            self.check_lineage(did, authoritative)?;
        }
        let signature = document.proofs().first().map(|p| p.signature().to_string());
        document.set_metadata(DocumentMetadata {
            transaction_id: Some(authoritative.txid.clone()),
            signature,
            published: Some(authoritative.timestamp),
            deactivated,
        });
        Ok(Some(document))
    }

    /// Every version of a customized DID up to `head` kept its controllers,
    /// unless it was a transfer carrying a ticket signed by the quorum of
    /// the version it replaced.
    fn check_lineage(&self, did: &Did, head: &DidTransaction) -> Result<()> {
        let mut bio = self.resolve_did_biography(did, true, false)?;
        if !bio.transactions().iter().any(|tx| tx.txid == head.txid) {
            bio = self.resolve_did_biography(did, true, true)?;
        }
        let txs = bio.transactions();
        let Some(position) = txs.iter().position(|tx| tx.txid == head.txid) else {
            return Err(DidError::Resolution(format!(
                "{did}: transaction {} missing from the history",
                head.txid
            )));
        };

        // Oldest first, ending with `head`.
        let lineage: Vec<&DidTransaction> = txs[position..].iter().rev().collect();
        if lineage[0].request.operation() != DocumentOperation::Create {
            return Err(DidError::Resolution(format!(
                "{did}: history starts with {} {}",
                lineage[0].request.operation(),
                lineage[0].txid
            )));
        }
        for pair in lineage.windows(2) {
            let (previous, next) = (pair[0], pair[1]);
            let reject = |reason: &str| {
                log::warn!("{did}: rejected {} {}: {reason}", next.request.operation(), next.txid);
                Err(DidError::Resolution(format!(
                    "{did}: invalid {} transaction {}: {reason}",
                    next.request.operation(),
                    next.txid
                )))
            };
            let (Some(previous_doc), Some(next_doc)) =
                (previous.request.document(), next.request.document())
            else {
                return reject("a version carries no document");
            };
            match next.request.operation() {
                DocumentOperation::Update => {
                    if next.request.header().previous_txid() != Some(previous.txid.as_str()) {
                        return reject("previous txid does not match");
                    }
                    if next_doc.controllers() != previous_doc.controllers()
                        || next_doc.quorum() != previous_doc.quorum()
                    {
                        return reject("controllers changed without a transfer");
                    }
                }
                DocumentOperation::Transfer => {
                    let Some(ticket) = next.request.ticket() else {
                        return reject("no ticket");
                    };
                    if ticket.transaction_id() != previous.txid {
                        return reject("ticket is bound to another version");
                    }
                    let substituted = Substituted {
                        did,
                        document: previous_doc,
                        inner: self,
                    };
                    if !ticket.is_genuine_for(previous_doc, &substituted)? {
                        return reject("ticket is not signed by the controllers");
                    }
                }
                DocumentOperation::Create | DocumentOperation::Deactivate => {
                    return reject("unexpected operation");
                }
            }
        }
        Ok(())
    }

    /// The credential's biography, honouring revocations by `issuer`.
    pub fn resolve_credential_biography(
        &self,
        id: &DidUrl,
        issuer: Option<&Did>,
        force: bool,
    ) -> Result<CredentialBiography> {
        let params = CredentialResolveParams {
            id: id.clone(),
            issuer: issuer.cloned(),
        };
        match self.resolve(ResolveMethod::ResolveCredential, params, force)? {
            Resolved::Credential(bio) if bio.id() == id => Ok(bio),
            Resolved::Credential(bio) => Err(DidError::Resolution(format!(
                "asked for {id}, got the biography of {}",
                bio.id()
            ))),
            other => Err(DidError::Resolution(format!("unexpected result {other:?}"))),
        }
    }

    /// Resolve a declared credential; `Ok(None)` when never declared.
    pub fn resolve_credential(
        &self,
        id: &DidUrl,
        issuer: Option<&Did>,
        force: bool,
    ) -> Result<Option<VerifiableCredential>> {
        let bio = self.resolve_credential_biography(id, issuer, force)?;
        let txs = bio.transactions();
        let (authoritative, revoked) = match bio.status() {
            CredentialStatus::NotFound => return Ok(None),
            CredentialStatus::Valid => match txs.first() {
                Some(tx) => (tx, false),
                None => return Err(DidError::Resolution(format!("{id}: empty biography"))),
            },
            CredentialStatus::Revoked => {
                let (revocation, declaration) = match txs {
                    [revocation] => (revocation, None),
                    [revocation, declaration] => (revocation, Some(declaration)),
                    _ => {
                        return Err(DidError::Resolution(format!(
                            "revoked {id} must carry 1 or 2 transactions, found {}",
                            txs.len()
                        )))
                    }
                };
                if revocation.request.operation() != CredentialOperation::Revoke {
                    return Err(DidError::Resolution(format!(
                        "{id}: latest transaction {} is not a revocation",
                        revocation.txid
                    )));
                }
                let declared = declaration.and_then(|tx| tx.request.credential());
                if !revocation.request.is_valid_with(self, declared)? {
                    log::warn!("{id}: rejected revocation {}", revocation.txid);
                    return Err(DidError::Resolution(format!(
                        "{id}: invalid revocation {}",
                        revocation.txid
                    )));
                }
                match declaration {
                    Some(declaration) => (declaration, true),
                    None => return Ok(None),
                }
            }
        };

        if authoritative.request.operation() != CredentialOperation::Declare {
            return Err(DidError::Resolution(format!(
                "{id}: transaction {} is not a declaration",
                authoritative.txid
            )));
        }
        if !authoritative.request.is_valid(self)? {
            log::warn!("{id}: rejected declaration {}", authoritative.txid);
            return Err(DidError::Resolution(format!(
                "{id}: invalid declaration {}",
                authoritative.txid
            )));
        }
        let mut credential = authoritative.request.credential().cloned().ok_or_else(|| {
            DidError::Resolution(format!("{id}: declaration carries no credential"))
        })?;
        credential.set_metadata(CredentialMetadata {
            transaction_id: Some(authoritative.txid.clone()),
            published: Some(authoritative.timestamp),
            revoked,
        });
        Ok(Some(credential))
    }

    /// Ids of credentials declared by `did`. Lists are never cached.
    pub fn list_credentials(
        &self,
        did: &Did,
        skip: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<DidUrl>> {
        let request = ResolveRequest::new(
            ResolveMethod::ListCredentials,
            ListCredentialsParams {
                did: did.clone(),
                skip,
                limit,
            },
        );
        match self.send(&request)? {
            Resolved::List(list) if &list.did == did => Ok(list.credentials),
            Resolved::List(list) => Err(DidError::Resolution(format!(
                "asked for {did}, got the credentials of {}",
                list.did
            ))),
            other => Err(DidError::Resolution(format!("unexpected result {other:?}"))),
        }
    }

    fn invalidate_did(&self, did: &Did) -> Result<()> {
        for all in [false, true] {
            let params = DidResolveParams {
                did: did.clone(),
                all,
            };
            self.cache
                .invalidate(&CacheKey::new(ResolveMethod::ResolveDid, &params)?);
        }
        Ok(())
    }

    fn invalidate_credential(&self, id: &DidUrl, signers: &[&Did]) -> Result<()> {
        let issuers = std::iter::once(None).chain(signers.iter().map(|did| Some((*did).clone())));
        for issuer in issuers {
            let params = CredentialResolveParams {
                id: id.clone(),
                issuer,
            };
            self.cache
                .invalidate(&CacheKey::new(ResolveMethod::ResolveCredential, &params)?);
        }
        Ok(())
    }

    fn submit_document(&self, request: &DocumentRequest) -> Result<()> {
        self.transport.submit(&request.to_json(true)?, "")?;
        log::info!("published {} of {}", request.operation(), request.subject());
        self.invalidate_did(request.subject())
    }

    fn submit_credential(&self, request: &CredentialRequest, signers: &[&Did]) -> Result<()> {
        self.transport.submit(&request.to_json(true)?, "")?;
        log::info!("published {} of {}", request.operation(), request.id());
        self.invalidate_credential(request.id(), signers)
    }

    pub fn create_did(
        &self,
        document: &Document,
        sign_key: &DidUrl,
        keys: &dyn KeyProvider,
    ) -> Result<()> {
        let request = DocumentRequest::create(document, sign_key, keys, self)?;
        self.submit_document(&request)
    }

    pub fn update_did(
        &self,
        document: &Document,
        previous_txid: &str,
        sign_key: &DidUrl,
        keys: &dyn KeyProvider,
    ) -> Result<()> {
        let request = DocumentRequest::update(document, previous_txid, sign_key, keys, self)?;
        self.submit_document(&request)
    }

    /// Create or update, depending on what the ledger currently holds.
    ///
    /// `sign_key` defaults to the document's default key.
    pub fn publish_document(
        &self,
        document: &Document,
        sign_key: Option<&DidUrl>,
        keys: &dyn KeyProvider,
    ) -> Result<()> {
        let sign_key = match sign_key {
            Some(key) => key.clone(),
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
        let bio = self.resolve_did_biography(document.subject(), false, true)?;
        let current = self.interpret_did(&bio)?;
        match current {
            None => self.create_did(document, &sign_key, keys),
            Some(current) => {
                if current.is_deactivated() {
                    return Err(DidError::DocumentDeactivated(current.subject().to_string()));
                }
                if current.controllers() != document.controllers()
                    || current.quorum() != document.quorum()
                {
                    return Err(DidError::IllegalUsage(format!(
                        "changing the controllers of {} requires a transfer",
                        document.subject()
                    )));
                }
                let txid = current.metadata().transaction_id().ok_or_else(|| {
                    DidError::Resolution(format!("{} has no transaction id", current.subject()))
                })?;
                self.update_did(document, txid, &sign_key, keys)
            }
        }
    }

    /// Publish a customized document to the owner named by `ticket`.
    pub fn transfer_did(
        &self,
        document: &Document,
        ticket: &TransferTicket,
        sign_key: &DidUrl,
        keys: &dyn KeyProvider,
    ) -> Result<()> {
        if ticket.subject() != document.subject() {
            return Err(DidError::IllegalUsage(format!(
                "ticket is for {}, not {}",
                ticket.subject(),
                document.subject()
            )));
        }
        if !document.has_controller(ticket.to()) {
            return Err(DidError::IllegalUsage(format!(
                "{} is not a controller of the transferred document",
                ticket.to()
            )));
        }
        if !sign_key.belongs_to(ticket.to()) {
            return Err(DidError::InvalidKey(format!(
                "{sign_key} does not belong to {}",
                ticket.to()
            )));
        }
        self.invalidate_did(ticket.subject())?;
        if !ticket.is_valid(self)? {
            return Err(DidError::TicketNotValid(ticket.subject().to_string()));
        }
        let request = DocumentRequest::transfer(document, ticket, sign_key, keys, self)?;
        self.submit_document(&request)
    }

    /// Deactivate with the document's own key or a controller's key.
    pub fn deactivate_did(
        &self,
        document: &Document,
        sign_key: &DidUrl,
        keys: &dyn KeyProvider,
    ) -> Result<()> {
        let request = DocumentRequest::deactivate(document, sign_key, keys, self)?;
        self.submit_document(&request)
    }

    /// Deactivate `target` with an authorization key held by `signer`.
    pub fn deactivate_did_by(
        &self,
        target: &Did,
        signer: &Document,
        sign_key: &DidUrl,
        keys: &dyn KeyProvider,
    ) -> Result<()> {
        let document = self
            .resolve_did(target, true)?
            .ok_or_else(|| DidError::NotFound(target.to_string()))?;
        if document.is_deactivated() {
            return Err(DidError::DocumentDeactivated(target.to_string()));
        }
        let request = DocumentRequest::deactivate_by(&document, signer, sign_key, keys)?;
        self.submit_document(&request)
    }

    /// Declare a valid credential as its owner.
    pub fn declare_credential(
        &self,
        credential: &VerifiableCredential,
        signer: &Document,
        sign_key: &DidUrl,
        keys: &dyn KeyProvider,
    ) -> Result<()> {
        if !credential.is_valid(self)? {
            return Err(DidError::CredentialNotValid(credential.id().to_string()));
        }
        let bio = self.resolve_credential_biography(credential.id(), Some(credential.issuer()), true)?;
        match bio.status() {
            CredentialStatus::NotFound => {}
            CredentialStatus::Valid => {
                return Err(DidError::AlreadyExists(credential.id().to_string()))
            }
            CredentialStatus::Revoked => {
                return Err(DidError::IllegalUsage(format!(
                    "{} is revoked",
                    credential.id()
                )))
            }
        }
        let request = CredentialRequest::declare(credential, signer, sign_key, keys)?;
        self.submit_credential(&request, &[signer.subject(), credential.issuer()])
    }

    /// Revoke a credential id as its owner or issuer.
    pub fn revoke_credential(
        &self,
        id: &DidUrl,
        signer: &Document,
        sign_key: &DidUrl,
        keys: &dyn KeyProvider,
    ) -> Result<()> {
        let bio = self.resolve_credential_biography(id, Some(signer.subject()), true)?;
        if bio.status() == CredentialStatus::Revoked {
            return Err(DidError::IllegalUsage(format!("{id} is already revoked")));
        }
        let request = match self.resolve_credential(id, Some(signer.subject()), false)? {
            Some(credential) => {
                CredentialRequest::revoke_credential(&credential, signer, sign_key, keys)?
            }
            None => CredentialRequest::revoke(id, signer, sign_key, keys)?,
        };
        self.submit_credential(&request, &[signer.subject()])
    }
}

impl DocumentResolver for Backend {
    fn resolve_document(&self, did: &Did) -> Result<Option<Document>> {
        self.resolve_did(did, false)
    }
}

/// Answers for one DID with a fixed document and delegates the rest.
struct Substituted<'a> {
    did: &'a Did,
    document: &'a Document,
    inner: &'a dyn DocumentResolver,
}

impl DocumentResolver for Substituted<'_> {
    fn resolve_document(&self, did: &Did) -> Result<Option<Document>> {
        if did == self.did {
            Ok(Some(self.document.clone()))
        } else {
            self.inner.resolve_document(did)
        }
    }
}
