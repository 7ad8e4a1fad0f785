//! Decentralized identifiers.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::keys;
use crate::error::{DidError, Result};

/// Method name used for every identifier this crate creates.
pub const DEFAULT_METHOD: &str = "elastos";

const SCHEME: &str = "did";

/// A method-scoped identifier: `did:<method>:<method-specific-id>`.
///
/// Equality, ordering and hashing follow the string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Did {
    method: String,
    method_specific_id: String,
}

impl Did {
    /// Build an identifier under the default method.
    pub fn new(method_specific_id: &str) -> Result<Self> {
        Self::with_method(DEFAULT_METHOD, method_specific_id)
    }

    /// Build an identifier under an explicit method.
    pub fn with_method(method: &str, method_specific_id: &str) -> Result<Self> {
        if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DidError::MalformedDid(format!("invalid method: {method}")));
        }
        if method_specific_id.is_empty() || !method_specific_id.chars().all(is_id_char) {
            return Err(DidError::MalformedDid(format!(
                "invalid method specific id: {method_specific_id}"
            )));
        }
        Ok(Self {
            method: method.to_string(),
            method_specific_id: method_specific_id.to_string(),
        })
    }

    /// The primitive identifier owned by a base58 public key.
    pub fn from_public_key(public_key: &str) -> Result<Self> {
        Self::new(&keys::derive_address(public_key)?)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn method_specific_id(&self) -> &str {
        &self.method_specific_id
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':')
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}:{}:{}", self.method, self.method_specific_id)
    }
}

impl FromStr for Did {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("did:")
            .ok_or_else(|| DidError::MalformedDid(format!("missing did scheme: {s}")))?;
        let (method, id) = rest
            .split_once(':')
            .ok_or_else(|| DidError::MalformedDid(format!("missing method: {s}")))?;
        Self::with_method(method, id)
    }
}

impl Ord for Did {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl PartialOrd for Did {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for Did {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Ed25519KeyPair;

    #[test]
    fn test_parse_and_display() {
        let did: Did = "did:elastos:icJ4z2DULrHEzYSvjKNJpKyhqFDxvYV7pN".parse().unwrap();
        assert_eq!(did.method(), "elastos");
        assert_eq!(did.method_specific_id(), "icJ4z2DULrHEzYSvjKNJpKyhqFDxvYV7pN");
        assert_eq!(
            did.to_string(),
            "did:elastos:icJ4z2DULrHEzYSvjKNJpKyhqFDxvYV7pN"
        );
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("elastos:abc".parse::<Did>().is_err());
        assert!("did:elastos".parse::<Did>().is_err());
        assert!("did::abc".parse::<Did>().is_err());
        assert!("did:elastos:a b".parse::<Did>().is_err());
    }

    #[test]
    fn test_from_public_key() {
        let kp = Ed25519KeyPair::generate();
        let did = Did::from_public_key(&kp.public_key_base58()).unwrap();
        assert_eq!(did.method_specific_id(), kp.address());
    }

    #[test]
    fn test_ordering_follows_string_form() {
        let a: Did = "did:a1:z".parse().unwrap();
        let b: Did = "did:a:z".parse().unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_serde_as_string() {
        let did: Did = "did:elastos:helloworld".parse().unwrap();
        let json = serde_json::to_string(&did).unwrap();
        assert_eq!(json, "\"did:elastos:helloworld\"");
        let back: Did = serde_json::from_str(&json).unwrap();
        assert_eq!(back, did);
    }
}
