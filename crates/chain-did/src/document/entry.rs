//! Entries of an identity document: keys, services, proofs, multisig
//! and resolution metadata.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::did::{Did, DidUrl};
use crate::error::{DidError, Result};
use crate::time;

/// Key type written for every Ed25519 public key.
pub const DEFAULT_PUBLIC_KEY_TYPE: &str = "Ed25519VerificationKey2018";

/// Proof type written for every Ed25519 signature.
pub const DEFAULT_PROOF_TYPE: &str = "Ed25519Signature2018";

/// A public key declared by a document.
///
/// Whether the key authenticates or authorizes is recorded by the
/// document's `authentication` / `authorization` lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub(crate) id: DidUrl,
    #[serde(rename = "type")]
    pub(crate) key_type: String,
    pub(crate) controller: Did,
    #[serde(rename = "publicKeyBase58")]
    pub(crate) public_key_base58: String,
}

impl PublicKey {
    pub(crate) fn new(id: DidUrl, controller: Did, public_key_base58: String) -> Self {
        Self {
            id,
            key_type: DEFAULT_PUBLIC_KEY_TYPE.to_string(),
            controller,
            public_key_base58,
        }
    }

    pub fn id(&self) -> &DidUrl {
        &self.id
    }

    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    pub fn controller(&self) -> &Did {
        &self.controller
    }

    pub fn public_key_base58(&self) -> &str {
        &self.public_key_base58
    }
}

/// A service endpoint with free-form extra properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub(crate) id: DidUrl,
    #[serde(rename = "type")]
    pub(crate) service_type: String,
    #[serde(rename = "serviceEndpoint")]
    pub(crate) endpoint: String,
    #[serde(flatten)]
    pub(crate) properties: BTreeMap<String, Value>,
}

impl Service {
    pub fn id(&self) -> &DidUrl {
        &self.id
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }
}

/// Reserved service member names that cannot be used as properties.
pub(crate) const RESERVED_SERVICE_FIELDS: [&str; 3] = ["id", "type", "serviceEndpoint"];

/// One controller's (or the subject's) signature over a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentProof {
    #[serde(rename = "type")]
    pub(crate) proof_type: String,
    #[serde(with = "time::seconds")]
    pub(crate) created: DateTime<Utc>,
    pub(crate) creator: DidUrl,
    #[serde(rename = "signatureValue")]
    pub(crate) signature: String,
}

impl DocumentProof {
    pub fn proof_type(&self) -> &str {
        &self.proof_type
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// The key that produced the signature.
    pub fn creator(&self) -> &DidUrl {
        &self.creator
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }
}

/// An `m`-of-`n` signature threshold, written as `"m:n"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MultiSignature {
    m: usize,
    n: usize,
}

impl MultiSignature {
    pub fn new(m: usize, n: usize) -> Result<Self> {
        if n == 0 || m == 0 || m > n {
            return Err(DidError::InvalidMultisig(format!("{m}:{n}")));
        }
        Ok(Self { m, n })
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn n(&self) -> usize {
        self.n
    }
}

impl fmt::Display for MultiSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.m, self.n)
    }
}

impl FromStr for MultiSignature {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self> {
        let (m, n) = s
            .split_once(':')
            .ok_or_else(|| DidError::InvalidMultisig(s.to_string()))?;
        let m = m
            .parse()
            .map_err(|_| DidError::InvalidMultisig(s.to_string()))?;
        let n = n
            .parse()
            .map_err(|_| DidError::InvalidMultisig(s.to_string()))?;
        Self::new(m, n)
    }
}

impl TryFrom<String> for MultiSignature {
    type Error = DidError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<MultiSignature> for String {
    fn from(ms: MultiSignature) -> Self {
        ms.to_string()
    }
}

/// Facts attached by the resolution backend, never by a builder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub(crate) transaction_id: Option<String>,
    pub(crate) signature: Option<String>,
    #[serde(with = "time::seconds_opt")]
    pub(crate) published: Option<DateTime<Utc>>,
    pub(crate) deactivated: bool,
}

impl DocumentMetadata {
    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn published(&self) -> Option<DateTime<Utc>> {
        self.published
    }

    pub fn is_deactivated(&self) -> bool {
        self.deactivated
    }
}
