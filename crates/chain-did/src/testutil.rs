//! Fixtures shared by unit tests.

use std::collections::HashMap;

use crate::crypto::{Ed25519KeyPair, KeyRing};
use crate::did::Did;
use crate::document::{Document, DocumentBuilder, DocumentResolver};
use crate::error::Result;

/// A sealed primitive document whose default key is stored in `keys`.
pub fn primitive_document(keys: &mut KeyRing) -> Document {
    let key = Ed25519KeyPair::generate();
    let builder = DocumentBuilder::primitive(&key.public_key_base58()).unwrap();
    keys.insert(builder.default_key_id().unwrap(), key);
    builder.seal(&*keys).unwrap()
}

/// Resolver over a fixed set of documents.
#[derive(Default)]
pub struct MapResolver {
    documents: HashMap<Did, Document>,
}

impl MapResolver {
    pub fn from_documents<'a>(documents: impl IntoIterator<Item = &'a Document>) -> Self {
        Self {
            documents: documents
                .into_iter()
                .map(|doc| (doc.subject().clone(), doc.clone()))
                .collect(),
        }
    }
}

impl DocumentResolver for MapResolver {
    fn resolve_document(&self, did: &Did) -> Result<Option<Document>> {
        self.documents.resolve_document(did)
    }
}
