//! Resolve request/response wire format.
//!
//! A request is `{"id", "method", "params": [<params>]}`. The request id
//! is random per call and is never part of the cache key.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::random::random_id;
use crate::did::{Did, DidUrl};
use crate::error::{DidError, Result};

/// Resolve methods understood by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolveMethod {
    #[serde(rename = "did_resolveDID")]
    ResolveDid,
    #[serde(rename = "did_resolveCredential")]
    ResolveCredential,
    #[serde(rename = "did_listCredentials")]
    ListCredentials,
}

/// Parameters of [`ResolveMethod::ResolveDid`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidResolveParams {
    pub did: Did,
    /// Return the full history rather than the latest transaction.
    #[serde(default)]
    pub all: bool,
}

/// Parameters of [`ResolveMethod::ResolveCredential`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialResolveParams {
    pub id: DidUrl,
    /// Also honour revocations signed by this issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<Did>,
}

/// Parameters of [`ResolveMethod::ListCredentials`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListCredentialsParams {
    pub did: Did,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Cache identity of a request: the method and its normalized params.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: ResolveMethod,
    params: String,
}

impl CacheKey {
    pub fn new<P: Serialize>(method: ResolveMethod, params: &P) -> Result<Self> {
        Ok(Self {
            method,
            params: crate::codec::encode(params, true)?,
        })
    }

    pub fn method(&self) -> ResolveMethod {
        self.method
    }
}

/// A resolve request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest<P> {
    id: String,
    method: ResolveMethod,
    params: Vec<P>,
}

impl<P: Serialize> ResolveRequest<P> {
    /// Build a request with a fresh random id.
    pub fn new(method: ResolveMethod, params: P) -> Self {
        Self {
            id: random_id(),
            method,
            params: vec![params],
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn method(&self) -> ResolveMethod {
        self.method
    }

    /// The single logical parameter object.
    pub fn params(&self) -> Option<&P> {
        self.params.first()
    }

    pub fn cache_key(&self) -> Result<CacheKey> {
        let params = self
            .params()
            .ok_or_else(|| DidError::MalformedRequest("resolve request without params".into()))?;
        CacheKey::new(self.method, params)
    }
}

/// Error object of a failed resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveErrorBody {
    pub code: i64,
    pub message: String,
}

/// A resolve response carrying either a result or an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResolveErrorBody>,
}

impl ResolveResponse {
    pub fn success(id: &str, result: Value) -> Self {
        Self {
            id: id.to_string(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: &str, code: i64, message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            result: None,
            error: Some(ResolveErrorBody {
                code,
                message: message.into(),
            }),
        }
    }

    /// Extract the typed result of the request `expected_id`.
    pub fn into_result<R: DeserializeOwned>(self, expected_id: &str) -> Result<R> {
        if self.id != expected_id {
            return Err(DidError::Resolution(format!(
                "response id {} does not match request {expected_id}",
                self.id
            )));
        }
        if let Some(error) = self.error {
            return Err(DidError::Ledger {
                code: error.code,
                message: error.message,
            });
        }
        let result = self
            .result
            .ok_or_else(|| DidError::Resolution("response without result".into()))?;
        serde_json::from_value(result)
            .map_err(|e| DidError::Resolution(format!("malformed result: {e}")))
    }
}
