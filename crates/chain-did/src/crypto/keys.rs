//! Ed25519 key pairs and public key encoding.
//!
//! Public keys travel as base58 strings inside documents; the address
//! derived from a public key is the method-specific id of a primitive DID.

use ed25519_dalek::{SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{DidError, Result};

/// Version byte prefixed to every derived address.
pub const ADDRESS_VERSION: u8 = 0x67;

/// An Ed25519 key pair for signing operations.
///
/// `SigningKey` zeroizes its secret on drop.
pub struct Ed25519KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl Ed25519KeyPair {
    /// Generate a new random Ed25519 key pair.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut rand::thread_rng()))
    }

    /// Wrap an existing signing key.
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Reconstruct a key pair from raw signing key bytes.
    pub fn from_signing_key_bytes(bytes: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(bytes))
    }

    /// Reconstruct a key pair from a base58-encoded secret.
    pub fn from_secret_base58(secret: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            bs58::decode(secret)
                .into_vec()
                .map_err(|_| DidError::InvalidKey("secret is not base58".into()))?,
        );
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| DidError::InvalidKey("secret must be 32 bytes".into()))?;
        Ok(Self::from_signing_key_bytes(&array))
    }

    /// Return a reference to the signing key.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Return the verifying (public) key.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Return the public key as base58.
    pub fn public_key_base58(&self) -> String {
        bs58::encode(self.verifying_key.as_bytes()).into_string()
    }

    /// Return the secret as base58, wiped when dropped.
    pub fn secret_base58(&self) -> Zeroizing<String> {
        let bytes = Zeroizing::new(self.signing_key.to_bytes());
        Zeroizing::new(bs58::encode(bytes.as_slice()).into_string())
    }

    /// Return the address derived from the public key.
    pub fn address(&self) -> String {
        address_of(&self.verifying_key)
    }
}

impl Clone for Ed25519KeyPair {
    fn clone(&self) -> Self {
        Self::from_signing_key(self.signing_key.clone())
    }
}

/// Decode a base58 public key into a verifying key.
pub fn verifying_key_from_base58(public_key: &str) -> Result<VerifyingKey> {
    let bytes = bs58::decode(public_key)
        .into_vec()
        .map_err(|_| DidError::InvalidKey(format!("public key is not base58: {public_key}")))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| DidError::InvalidKey("public key must be 32 bytes".into()))?;
    VerifyingKey::from_bytes(&array)
        .map_err(|e| DidError::InvalidKey(format!("invalid verifying key: {e}")))
}

/// Derive the address of a base58 public key.
pub fn derive_address(public_key: &str) -> Result<String> {
    Ok(address_of(&verifying_key_from_base58(public_key)?))
}

/// Check whether `address` is well-formed and carries a valid checksum.
pub fn is_address_valid(address: &str) -> bool {
    let Ok(bytes) = bs58::decode(address).into_vec() else {
        return false;
    };
    if bytes.len() != 25 || bytes[0] != ADDRESS_VERSION {
        return false;
    }
    let (body, checksum) = bytes.split_at(21);
    checksum == &double_sha256(body)[..4]
}

fn address_of(key: &VerifyingKey) -> String {
    let hash = Sha256::digest(key.as_bytes());
    let mut raw = Vec::with_capacity(25);
    raw.push(ADDRESS_VERSION);
    raw.extend_from_slice(&hash[..20]);
    let checksum = double_sha256(&raw);
    raw.extend_from_slice(&checksum[..4]);
    bs58::encode(raw).into_string()
}

fn double_sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(Sha256::digest(data)).into()
}
