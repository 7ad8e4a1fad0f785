//! Error types for chain-did.
//!
//! All errors are strongly typed and propagated without panicking.
//! Private key material is never included in error messages.

/// Broad classification of a [`DidError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or unsupported structure; never retryable.
    MalformedStructure,
    /// A key does not hold the role the operation needs.
    InvalidKey,
    /// Transport, protocol or ledger failure while resolving.
    ResolutionFailure,
    /// The operation conflicts with the current state of the entity.
    StateConflict,
    /// An entity failed a genuineness or validity check.
    TrustFailure,
}

/// Error types covering all protocol operations.
#[derive(Debug, thiserror::Error)]
pub enum DidError {
    #[error("Malformed DID: {0}")]
    MalformedDid(String),

    #[error("Malformed DID URL: {0}")]
    MalformedDidUrl(String),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Malformed credential: {0}")]
    MalformedCredential(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Malformed transfer ticket: {0}")]
    MalformedTicket(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Resolution failed: {0}")]
    Resolution(String),

    #[error("Ledger error {code}: {message}")]
    Ledger { code: i64, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Already sealed")]
    AlreadySealed,

    #[error("Already signed by {0}")]
    AlreadySigned(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not a controller: {0}")]
    NotController(String),

    #[error("Customized document has no effective controller")]
    NoEffectiveController,

    #[error("Cannot remove the effective controller: {0}")]
    CannotRemoveEffectiveController(String),

    #[error("Not a customized document: {0}")]
    NotCustomized(String),

    #[error("Invalid multisig: {0}")]
    InvalidMultisig(String),

    #[error("Illegal usage: {0}")]
    IllegalUsage(String),

    #[error("Document already deactivated: {0}")]
    DocumentDeactivated(String),

    #[error("Document not valid: {0}")]
    DocumentNotValid(String),

    #[error("Credential not valid: {0}")]
    CredentialNotValid(String),

    #[error("Transfer ticket not valid: {0}")]
    TicketNotValid(String),
}

impl DidError {
    /// Map the error onto its taxonomy kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedDid(_)
            | Self::MalformedDidUrl(_)
            | Self::MalformedDocument(_)
            | Self::MalformedCredential(_)
            | Self::MalformedRequest(_)
            | Self::MalformedTicket(_)
            | Self::SerializationError(_) => ErrorKind::MalformedStructure,
            Self::InvalidKey(_) => ErrorKind::InvalidKey,
            Self::Resolution(_) | Self::Ledger { .. } | Self::Transport(_) => {
                ErrorKind::ResolutionFailure
            }
            Self::AlreadySealed
            | Self::AlreadySigned(_)
            | Self::AlreadyExists(_)
            | Self::NotFound(_)
            | Self::NotController(_)
            | Self::NoEffectiveController
            | Self::CannotRemoveEffectiveController(_)
            | Self::NotCustomized(_)
            | Self::InvalidMultisig(_)
            | Self::IllegalUsage(_)
            | Self::DocumentDeactivated(_) => ErrorKind::StateConflict,
            Self::DocumentNotValid(_) | Self::CredentialNotValid(_) | Self::TicketNotValid(_) => {
                ErrorKind::TrustFailure
            }
        }
    }

    /// Only resolution failures may succeed when the same call is retried.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ResolutionFailure
    }
}

impl From<serde_json::Error> for DidError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, DidError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            DidError::MalformedRequest("x".into()).kind(),
            ErrorKind::MalformedStructure
        );
        assert_eq!(DidError::AlreadySealed.kind(), ErrorKind::StateConflict);
        assert_eq!(
            DidError::Ledger {
                code: -32000,
                message: "boom".into()
            }
            .kind(),
            ErrorKind::ResolutionFailure
        );
    }

    #[test]
    fn test_only_resolution_is_retryable() {
        assert!(DidError::Transport("timeout".into()).is_retryable());
        assert!(!DidError::InvalidKey("k".into()).is_retryable());
        assert!(!DidError::TicketNotValid("t".into()).is_retryable());
    }
}
