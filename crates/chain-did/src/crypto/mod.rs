//! Cryptographic primitives for chain-did.
//!
//! This module provides:
//! - Ed25519 key generation and base58 public key encoding
//! - Address derivation for primitive identifiers
//! - Signing and verification over ordered input sequences
//! - Secret lookup through the `KeyProvider` seam
//! - Cryptographically secure random identifiers

pub mod keyring;
pub mod keys;
pub mod random;
pub mod signing;

pub use keyring::{KeyProvider, KeyRing};
pub use keys::{derive_address, Ed25519KeyPair};
