//! The ledger transport seam.

use crate::error::Result;

/// Moves serialized requests to and from a ledger.
///
/// Implementations own networking, retries and timeouts; failures should
/// surface as [`DidError::Transport`](crate::DidError::Transport) or
/// [`DidError::Ledger`](crate::DidError::Ledger).
pub trait LedgerTransport: Send + Sync {
    /// Send a serialized resolve request and return the raw response.
    fn resolve(&self, request: &str) -> Result<String>;

    /// Submit a serialized, signed ledger request.
    fn submit(&self, payload: &str, memo: &str) -> Result<()>;
}
