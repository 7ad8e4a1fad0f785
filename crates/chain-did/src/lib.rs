//! chain-did: decentralized identifiers anchored on a ledger.
//!
//! Provides self-signed DID documents, multi-controller customized DIDs,
//! verifiable credentials, signed ledger requests, transfer tickets and
//! a caching resolution backend over a pluggable ledger transport.

pub mod backend;
pub mod codec;
pub mod credential;
pub mod crypto;
pub mod did;
pub mod document;
pub mod error;
pub mod request;
pub mod ticket;
pub mod time;

#[cfg(test)]
mod testutil;

// Re-export primary types
pub use error::{DidError, ErrorKind, Result};
pub use did::{Did, DidUrl};
pub use document::{Document, DocumentBuilder, DocumentResolver};
pub use credential::{Issuer, VerifiableCredential};
pub use request::{CredentialRequest, DocumentRequest};
pub use ticket::TransferTicket;

// Re-export backend types
pub use backend::{Backend, BackendConfig, InMemoryLedger, LedgerTransport};
pub use crypto::{Ed25519KeyPair, KeyProvider, KeyRing};
