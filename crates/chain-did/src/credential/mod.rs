//! Verifiable credentials and their issuance.

pub mod issuer;
pub mod model;

pub use issuer::{CredentialBuilder, Issuer};
pub use model::{
    CredentialMetadata, CredentialProof, CredentialSubject, VerifiableCredential,
    VERIFIABLE_CREDENTIAL_TYPE,
};
