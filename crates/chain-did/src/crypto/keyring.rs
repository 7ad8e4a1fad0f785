//! Secret lookup for signing keys.
//!
//! Sealing operations never hold secrets themselves; they ask a
//! [`KeyProvider`] for the signing key behind a key id.

use std::collections::HashMap;

use ed25519_dalek::SigningKey;

use super::keys::Ed25519KeyPair;
use crate::did::DidUrl;
use crate::error::{DidError, Result};

/// Supplies the signing key for a key id.
pub trait KeyProvider {
    fn signing_key(&self, id: &DidUrl) -> Result<SigningKey>;
}

/// In-memory key provider.
#[derive(Default, Clone)]
pub struct KeyRing {
    keys: HashMap<DidUrl, Ed25519KeyPair>,
}

impl KeyRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a key pair under `id`, replacing any previous entry.
    pub fn insert(&mut self, id: DidUrl, key_pair: Ed25519KeyPair) {
        self.keys.insert(id, key_pair);
    }

    pub fn contains(&self, id: &DidUrl) -> bool {
        self.keys.contains_key(id)
    }

    pub fn get(&self, id: &DidUrl) -> Option<&Ed25519KeyPair> {
        self.keys.get(id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyProvider for KeyRing {
    fn signing_key(&self, id: &DidUrl) -> Result<SigningKey> {
        self.keys
            .get(id)
            .map(|kp| kp.signing_key().clone())
            .ok_or_else(|| DidError::InvalidKey(format!("no secret for key {id}")))
    }
}
