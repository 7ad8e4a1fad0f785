//! Identifiers: DIDs and the DID URLs that reference document entries.

pub mod id;
pub mod url;

pub use id::{Did, DEFAULT_METHOD};
pub use url::DidUrl;
