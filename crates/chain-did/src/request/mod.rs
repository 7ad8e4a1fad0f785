//! Signed ledger requests.
//!
//! A request is a header, a base64 payload and a proof. The proof
//! signature covers, in order and without separators: the
//! specification, the operation, the previous txid, the ticket and the
//! payload. Absent optional fields contribute nothing.

pub mod credential;
pub mod document;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use credential::CredentialRequest;
pub use document::DocumentRequest;

use crate::crypto::{signing, KeyProvider};
use crate::did::{Did, DidUrl};
use crate::error::{DidError, Result};
use crate::time;

/// Specification string of document requests.
pub const DOCUMENT_SPECIFICATION: &str = "elastos/did/1.0";

/// Specification string of credential requests.
pub const CREDENTIAL_SPECIFICATION: &str = "elastos/credential/1.0";

/// Operations on a DID document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentOperation {
    Create,
    Update,
    Transfer,
    Deactivate,
}

impl DocumentOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Transfer => "transfer",
            Self::Deactivate => "deactivate",
        }
    }
}

impl fmt::Display for DocumentOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations on a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialOperation {
    Declare,
    Revoke,
}

impl CredentialOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Declare => "declare",
            Self::Revoke => "revoke",
        }
    }
}

impl fmt::Display for CredentialOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request header, generic over the operation set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader<O> {
    pub(crate) specification: String,
    pub(crate) operation: O,
    #[serde(
        rename = "previousTxid",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) previous_txid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) ticket: Option<String>,
}

impl<O: Copy> RequestHeader<O> {
    pub fn specification(&self) -> &str {
        &self.specification
    }

    pub fn operation(&self) -> O {
        self.operation
    }

    pub fn previous_txid(&self) -> Option<&str> {
        self.previous_txid.as_deref()
    }

    /// Base64 encoded transfer ticket.
    pub fn ticket(&self) -> Option<&str> {
        self.ticket.as_deref()
    }
}

/// Request signature and the key that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestProof {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub(crate) proof_type: Option<String>,
    #[serde(
        default,
        with = "time::seconds_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) created: Option<DateTime<Utc>>,
    #[serde(rename = "verificationMethod")]
    pub(crate) verification_method: DidUrl,
    pub(crate) signature: String,
}

impl RequestProof {
    pub fn verification_method(&self) -> &DidUrl {
        &self.verification_method
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }
}

/// Ordered signing inputs of a request.
pub(crate) fn signing_inputs<'a>(
    specification: &'a str,
    operation: &'a str,
    previous_txid: Option<&'a str>,
    ticket: Option<&'a str>,
    payload: &'a str,
) -> [&'a [u8]; 5] {
    [
        specification.as_bytes(),
        operation.as_bytes(),
        previous_txid.unwrap_or_default().as_bytes(),
        ticket.unwrap_or_default().as_bytes(),
        payload.as_bytes(),
    ]
}

/// Sign request inputs with the secret behind `sign_key`.
pub(crate) fn sign_request(
    keys: &dyn KeyProvider,
    sign_key: &DidUrl,
    inputs: &[&[u8]],
) -> Result<String> {
    Ok(signing::sign(&keys.signing_key(sign_key)?, inputs))
}

/// Check the presence of header fields against what the operation allows.
pub(crate) fn check_header_field(
    name: &str,
    value: Option<&str>,
    required: bool,
    operation: &str,
) -> Result<()> {
    match (value, required) {
        (None, true) | (Some(""), true) => Err(DidError::MalformedRequest(format!(
            "{operation} requires {name}"
        ))),
        (Some(_), false) => Err(DidError::MalformedRequest(format!(
            "{operation} does not take {name}"
        ))),
        _ => Ok(()),
    }
}

/// The DID a verification method belongs to.
pub(crate) fn signer_of(method: &DidUrl) -> Result<&Did> {
    method
        .did()
        .ok_or_else(|| DidError::MalformedRequest(format!("unqualified key {method}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_inputs_skip_absent_fields() {
        let inputs = signing_inputs("spec", "create", None, None, "payload");
        assert_eq!(signing::concat(&inputs), b"speccreatepayload".to_vec());
        let inputs = signing_inputs("spec", "update", Some("tx"), None, "p");
        assert_eq!(signing::concat(&inputs), b"specupdatetxp".to_vec());
    }

    #[test]
    fn test_operation_wire_names() {
        assert_eq!(
            serde_json::to_string(&DocumentOperation::Deactivate).unwrap(),
            "\"deactivate\""
        );
        assert_eq!(
            serde_json::from_str::<CredentialOperation>("\"revoke\"").unwrap(),
            CredentialOperation::Revoke
        );
        assert!(serde_json::from_str::<DocumentOperation>("\"delete\"").is_err());
    }

    #[test]
    fn test_header_field_presence() {
        assert!(check_header_field("previousTxid", None, true, "update").is_err());
        assert!(check_header_field("previousTxid", Some("tx"), false, "create").is_err());
        assert!(check_header_field("ticket", None, false, "create").is_ok());
    }
}
