//! Identity documents: keys, controllers, services and proofs.
//!
//! The document module provides:
//! - The immutable [`Document`] and its entries
//! - [`DocumentBuilder`] for creating, editing and sealing documents
//! - The [`DocumentResolver`] seam used by every trust check

pub mod builder;
pub mod entry;
pub mod model;

use std::collections::HashMap;

pub use builder::{DocumentBuilder, DEFAULT_KEY_FRAGMENT};
pub use entry::{
    DocumentMetadata, DocumentProof, MultiSignature, PublicKey, Service, DEFAULT_PROOF_TYPE,
    DEFAULT_PUBLIC_KEY_TYPE,
};
pub use model::Document;

use crate::did::Did;
use crate::error::Result;

/// Looks up the current document of a DID.
///
/// Trust checks resolve controllers, issuers and signers through this
/// trait, so they work the same against a ledger backend or a local set.
pub trait DocumentResolver {
    /// `Ok(None)` means the DID is unknown.
    fn resolve_document(&self, did: &Did) -> Result<Option<Document>>;
}

impl DocumentResolver for HashMap<Did, Document> {
    fn resolve_document(&self, did: &Did) -> Result<Option<Document>> {
        Ok(self.get(did).cloned())
    }
}
