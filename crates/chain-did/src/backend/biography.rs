//! Biographies: the ledger's transaction history of a DID or credential.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::did::{Did, DidUrl};
use crate::error::{DidError, Result};
use crate::request::{CredentialRequest, DocumentRequest};
use crate::time;

/// Status of a DID biography, written as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DocumentStatus {
    Valid,
    Deactivated,
    NotFound,
}

impl From<DocumentStatus> for u8 {
    fn from(status: DocumentStatus) -> Self {
        match status {
            DocumentStatus::Valid => 0,
            DocumentStatus::Deactivated => 2,
            DocumentStatus::NotFound => 3,
        }
    }
}

impl TryFrom<u8> for DocumentStatus {
    type Error = DidError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Valid),
            2 => Ok(Self::Deactivated),
            3 => Ok(Self::NotFound),
            _ => Err(DidError::Resolution(format!("unknown DID status {code}"))),
        }
    }
}

/// Status of a credential biography, written as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CredentialStatus {
    Valid,
    Revoked,
    NotFound,
}

impl From<CredentialStatus> for u8 {
    fn from(status: CredentialStatus) -> Self {
        match status {
            CredentialStatus::Valid => 0,
            CredentialStatus::Revoked => 2,
            CredentialStatus::NotFound => 3,
        }
    }
}

impl TryFrom<u8> for CredentialStatus {
    type Error = DidError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Valid),
            2 => Ok(Self::Revoked),
            3 => Ok(Self::NotFound),
            _ => Err(DidError::Resolution(format!(
                "unknown credential status {code}"
            ))),
        }
    }
}

/// A ledger transaction wrapping one signed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction<R> {
    pub txid: String,
    #[serde(with = "time::seconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "operation")]
    pub request: R,
}

pub type DidTransaction = Transaction<DocumentRequest>;
pub type CredentialTransaction = Transaction<CredentialRequest>;

/// Transaction history of a DID, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct DidBiography {
    did: Did,
    status: DocumentStatus,
    #[serde(rename = "transaction", skip_serializing_if = "Vec::is_empty")]
    transactions: Vec<DidTransaction>,
}

#[derive(Deserialize)]
struct DidBiographyData {
    did: Did,
    status: DocumentStatus,
    #[serde(rename = "transaction", default)]
    transactions: Vec<DidTransaction>,
}

impl DidBiography {
    pub fn new(did: Did, status: DocumentStatus, transactions: Vec<DidTransaction>) -> Result<Self> {
        check_shape(
            status == DocumentStatus::NotFound,
            transactions.len(),
            &did.to_string(),
        )?;
        for tx in &transactions {
            if tx.txid.is_empty() {
                return Err(DidError::Resolution(format!("{did}: transaction without txid")));
            }
            if tx.request.subject() != &did {
                return Err(DidError::Resolution(format!(
                    "{did}: transaction {} is about {}",
                    tx.txid,
                    tx.request.subject()
                )));
            }
        }
        Ok(Self {
            did,
            status,
            transactions,
        })
    }

    pub fn did(&self) -> &Did {
        &self.did
    }

    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    pub fn transactions(&self) -> &[DidTransaction] {
        &self.transactions
    }
}

impl<'de> Deserialize<'de> for DidBiography {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let data = DidBiographyData::deserialize(d)?;
        DidBiography::new(data.did, data.status, data.transactions)
            .map_err(serde::de::Error::custom)
    }
}

/// Transaction history of a credential, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialBiography {
    id: DidUrl,
    status: CredentialStatus,
    #[serde(rename = "transaction", skip_serializing_if = "Vec::is_empty")]
    transactions: Vec<CredentialTransaction>,
}

#[derive(Deserialize)]
struct CredentialBiographyData {
    id: DidUrl,
    status: CredentialStatus,
    #[serde(rename = "transaction", default)]
    transactions: Vec<CredentialTransaction>,
}

impl CredentialBiography {
    pub fn new(
        id: DidUrl,
        status: CredentialStatus,
        transactions: Vec<CredentialTransaction>,
    ) -> Result<Self> {
        check_shape(
            status == CredentialStatus::NotFound,
            transactions.len(),
            &id.to_string(),
        )?;
        for tx in &transactions {
            if tx.txid.is_empty() {
                return Err(DidError::Resolution(format!("{id}: transaction without txid")));
            }
            if tx.request.id() != &id {
                return Err(DidError::Resolution(format!(
                    "{id}: transaction {} is about {}",
                    tx.txid,
                    tx.request.id()
                )));
            }
        }
        Ok(Self {
            id,
            status,
            transactions,
        })
    }

    pub fn id(&self) -> &DidUrl {
        &self.id
    }

    pub fn status(&self) -> CredentialStatus {
        self.status
    }

    pub fn transactions(&self) -> &[CredentialTransaction] {
        &self.transactions
    }
}

impl<'de> Deserialize<'de> for CredentialBiography {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let data = CredentialBiographyData::deserialize(d)?;
        CredentialBiography::new(data.id, data.status, data.transactions)
            .map_err(serde::de::Error::custom)
    }
}

fn check_shape(not_found: bool, count: usize, subject: &str) -> Result<()> {
    match (not_found, count) {
        (true, 0) | (false, 1..) => Ok(()),
        (true, _) => Err(DidError::Resolution(format!(
            "{subject}: not-found biography carries transactions"
        ))),
        (false, _) => Err(DidError::Resolution(format!(
            "{subject}: biography without transactions"
        ))),
    }
}

/// Credential ids declared by a DID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialList {
    pub did: Did,
    #[serde(default)]
    pub credentials: Vec<DidUrl>,
}
