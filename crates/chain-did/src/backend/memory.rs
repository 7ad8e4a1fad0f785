//! A simulated append-only ledger.
//!
//! [`InMemoryLedger`] answers resolve requests with biographies and
//! accepts submissions after structural checks. It does not verify
//! signatures; resolution does.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::biography::{
    CredentialBiography, CredentialList, CredentialStatus, CredentialTransaction, DidBiography,
    DidTransaction, DocumentStatus, Transaction,
};
use super::protocol::{
    CredentialResolveParams, DidResolveParams, ListCredentialsParams, ResolveMethod,
    ResolveRequest, ResolveResponse,
};
use super::transport::LedgerTransport;
use crate::did::{Did, DidUrl};
use crate::error::{DidError, Result};
use crate::request::{
    CredentialOperation, CredentialRequest, DocumentOperation, DocumentRequest,
    CREDENTIAL_SPECIFICATION, DOCUMENT_SPECIFICATION,
};
use crate::time;

/// Request could not be parsed.
pub const INVALID_REQUEST: i64 = -32600;
/// Params did not match the method.
pub const INVALID_PARAMS: i64 = -32602;
/// Submission conflicts with the ledger state.
pub const REJECTED: i64 = -32000;

const DEFAULT_LIST_LIMIT: usize = 128;
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerState {
    #[serde(default)]
    sequence: u64,
    /// Oldest first.
    #[serde(default)]
    documents: BTreeMap<Did, Vec<DidTransaction>>,
    /// Oldest first.
    #[serde(default)]
    credentials: BTreeMap<DidUrl, Vec<CredentialTransaction>>,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    ledger: LedgerState,
}

/// In-process ledger implementing [`LedgerTransport`].
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    resolve_calls: AtomicUsize,
}

fn rejected(message: String) -> DidError {
    DidError::Ledger {
        code: REJECTED,
        message,
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from [`InMemoryLedger::snapshot`] output.
    pub fn restore(snapshot: &str) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(snapshot)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(DidError::SerializationError(format!(
                "unsupported ledger snapshot version {}",
                snapshot.version
            )));
        }
        Ok(Self {
            state: Mutex::new(snapshot.ledger),
            resolve_calls: AtomicUsize::new(0),
        })
    }

    /// Serialize the whole ledger.
    pub fn snapshot(&self) -> Result<String> {
        let state = self.lock();
        let snapshot = serde_json::json!({
            "version": SNAPSHOT_VERSION,
            "ledger": &*state,
        });
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Number of resolve requests served.
    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn transaction_count(&self) -> usize {
        let state = self.lock();
        state.documents.values().map(Vec::len).sum::<usize>()
            + state.credentials.values().map(Vec::len).sum::<usize>()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn answer(&self, method: ResolveMethod, params: Value) -> Result<Value> {
        let state = self.lock();
        let bad_params = |e: serde_json::Error| DidError::Ledger {
            code: INVALID_PARAMS,
            message: e.to_string(),
        };
        Ok(match method {
            ResolveMethod::ResolveDid => {
                let params: DidResolveParams = serde_json::from_value(params).map_err(bad_params)?;
                serde_json::to_value(did_biography(&state, &params.did, params.all)?)?
            }
            ResolveMethod::ResolveCredential => {
                let params: CredentialResolveParams =
                    serde_json::from_value(params).map_err(bad_params)?;
                serde_json::to_value(credential_biography(
                    &state,
                    &params.id,
                    params.issuer.as_ref(),
                )?)?
            }
            ResolveMethod::ListCredentials => {
                let params: ListCredentialsParams =
                    serde_json::from_value(params).map_err(bad_params)?;
                serde_json::to_value(list_credentials(&state, &params))?
            }
        })
    }

    fn apply_document(&self, request: DocumentRequest, payload: &str) -> Result<String> {
        let mut state = self.lock();
        let did = request.subject().clone();
        let latest = state.documents.get(&did).and_then(|h| h.last());
        let deactivated =
            latest.is_some_and(|tx| tx.request.operation() == DocumentOperation::Deactivate);
        match (request.operation(), latest) {
            (DocumentOperation::Create, Some(_)) => {
                return Err(rejected(format!("{did} already exists")))
            }
            (DocumentOperation::Create, None) => {}
            (_, None) => return Err(rejected(format!("{did} does not exist"))),
            (_, Some(_)) if deactivated => {
                return Err(rejected(format!("{did} is deactivated")))
            }
            (DocumentOperation::Update, Some(latest)) => {
                if request.header().previous_txid() != Some(latest.txid.as_str()) {
                    return Err(rejected(format!(
                        "{did}: previous txid does not match {}",
                        latest.txid
                    )));
                }
            }
            (_, Some(_)) => {}
        }
        let txid = next_txid(&mut state, payload);
        state.documents.entry(did).or_default().push(Transaction {
            txid: txid.clone(),
            timestamp: time::now(),
            request,
        });
        Ok(txid)
    }

    fn apply_credential(&self, request: CredentialRequest, payload: &str) -> Result<String> {
        let mut state = self.lock();
        let id = request.id().clone();
        let history = state.credentials.get(&id).map(Vec::as_slice).unwrap_or_default();
        match request.operation() {
            CredentialOperation::Declare => {
                if history
                    .iter()
                    .any(|tx| tx.request.operation() == CredentialOperation::Declare)
                {
                    return Err(rejected(format!("{id} is already declared")));
                }
                let owner = id.did();
                if history.iter().any(|tx| {
                    tx.request.operation() == CredentialOperation::Revoke
                        && tx.request.signer() == owner
                }) {
                    return Err(rejected(format!("{id} is revoked")));
                }
            }
            CredentialOperation::Revoke => {
                if history.iter().any(|tx| {
                    tx.request.operation() == CredentialOperation::Revoke
                        && tx.request.signer() == request.signer()
                }) {
                    return Err(rejected(format!("{id} is already revoked by this signer")));
                }
            }
        }
        let txid = next_txid(&mut state, payload);
        state.credentials.entry(id).or_default().push(Transaction {
            txid: txid.clone(),
            timestamp: time::now(),
            request,
        });
        Ok(txid)
    }
}

fn next_txid(state: &mut LedgerState, payload: &str) -> String {
    state.sequence += 1;
    let mut hasher = Sha256::new();
    hasher.update(state.sequence.to_be_bytes());
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

fn did_biography(state: &LedgerState, did: &Did, all: bool) -> Result<DidBiography> {
    let history = state.documents.get(did).map(Vec::as_slice).unwrap_or_default();
    let Some(latest) = history.last() else {
        return DidBiography::new(did.clone(), DocumentStatus::NotFound, Vec::new());
    };
    let deactivated = latest.request.operation() == DocumentOperation::Deactivate;
    let status = if deactivated {
        DocumentStatus::Deactivated
    } else {
        DocumentStatus::Valid
    };
    if all {
        return DidBiography::new(did.clone(), status, history.iter().rev().cloned().collect());
    }
    if deactivated {
        let mut transactions = vec![latest.clone()];
        if let Some(previous) = history
            .iter()
            .rev()
            .find(|tx| tx.request.operation() != DocumentOperation::Deactivate)
        {
            transactions.push(previous.clone());
        }
        return DidBiography::new(did.clone(), DocumentStatus::Deactivated, transactions);
    }
    DidBiography::new(did.clone(), status, vec![latest.clone()])
}

fn credential_biography(
    state: &LedgerState,
    id: &DidUrl,
    issuer: Option<&Did>,
) -> Result<CredentialBiography> {
    let history = state.credentials.get(id).map(Vec::as_slice).unwrap_or_default();
    let declaration = history
        .iter()
        .find(|tx| tx.request.operation() == CredentialOperation::Declare);
    let owner = id.did();
    let declared_issuer = declaration
        .and_then(|tx| tx.request.credential())
        .map(|vc| vc.issuer());
    let revocation = history.iter().find(|tx| {
        let signer = tx.request.signer();
        tx.request.operation() == CredentialOperation::Revoke
            && signer.is_some()
            && (signer == owner || signer == declared_issuer || signer == issuer)
    });

    let (status, transactions) = match (revocation, declaration) {
        (Some(revocation), Some(declaration)) => (
            CredentialStatus::Revoked,
            vec![revocation.clone(), declaration.clone()],
        ),
        (Some(revocation), None) => (CredentialStatus::Revoked, vec![revocation.clone()]),
        (None, Some(declaration)) => (CredentialStatus::Valid, vec![declaration.clone()]),
        (None, None) => (CredentialStatus::NotFound, Vec::new()),
    };
    CredentialBiography::new(id.clone(), status, transactions)
}

fn list_credentials(state: &LedgerState, params: &ListCredentialsParams) -> CredentialList {
    let credentials = state
        .credentials
        .iter()
        .filter(|(id, history)| {
            id.belongs_to(&params.did)
                && history
                    .iter()
                    .any(|tx| tx.request.operation() == CredentialOperation::Declare)
        })
        .map(|(id, _)| id.clone())
        .skip(params.skip.unwrap_or(0))
        .take(params.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .collect();
    CredentialList {
        did: params.did.clone(),
        credentials,
    }
}

impl LedgerTransport for InMemoryLedger {
    fn resolve(&self, request: &str) -> Result<String> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        let request: ResolveRequest<Value> =
            serde_json::from_str(request).map_err(|e| DidError::Ledger {
                code: INVALID_REQUEST,
                message: e.to_string(),
            })?;
        let response = match request.params() {
            Some(params) => match self.answer(request.method(), params.clone()) {
                Ok(result) => ResolveResponse::success(request.id(), result),
                Err(e) => ResolveResponse::failure(request.id(), INVALID_PARAMS, e.to_string()),
            },
            None => ResolveResponse::failure(request.id(), INVALID_PARAMS, "missing params"),
        };
        Ok(serde_json::to_string(&response)?)
    }

    fn submit(&self, payload: &str, _memo: &str) -> Result<()> {
        let value: Value = serde_json::from_str(payload).map_err(|e| DidError::Ledger {
            code: INVALID_REQUEST,
            message: e.to_string(),
        })?;
        let invalid = |e: serde_json::Error| DidError::Ledger {
            code: INVALID_REQUEST,
            message: e.to_string(),
        };
        let specification = value
            .pointer("/header/specification")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let txid = match specification.as_str() {
            DOCUMENT_SPECIFICATION => {
                let request: DocumentRequest = serde_json::from_value(value).map_err(invalid)?;
                self.apply_document(request, payload)?
            }
            CREDENTIAL_SPECIFICATION => {
                let request: CredentialRequest = serde_json::from_value(value).map_err(invalid)?;
                self.apply_credential(request, payload)?
            }
            other => {
                return Err(DidError::Ledger {
                    code: INVALID_REQUEST,
                    message: format!("unsupported specification {other:?}"),
                })
            }
        };
        log::debug!("ledger accepted transaction {txid}");
        Ok(())
    }
}
