//! DID URLs referencing keys, services and credentials inside a document.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::id::Did;
use crate::error::{DidError, Result};

/// A fragment reference `did:<method>:<id>#<fragment>`.
///
/// A URL parsed from the relative form `#fragment` has no DID until it
/// is qualified against the document it appears in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DidUrl {
    did: Option<Did>,
    fragment: String,
}

impl DidUrl {
    /// Build a fully qualified URL.
    pub fn new(did: &Did, fragment: &str) -> Result<Self> {
        check_fragment(fragment)?;
        Ok(Self {
            did: Some(did.clone()),
            fragment: fragment.to_string(),
        })
    }

    /// Parse `text` and qualify it against `base` when it is relative.
    pub fn parse_with_base(base: &Did, text: &str) -> Result<Self> {
        let mut url: Self = text.parse()?;
        url.qualify(base);
        Ok(url)
    }

    pub fn did(&self) -> Option<&Did> {
        self.did.as_ref()
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn is_qualified(&self) -> bool {
        self.did.is_some()
    }

    /// Attach `base` when the URL carries no DID.
    pub fn qualify(&mut self, base: &Did) {
        if self.did.is_none() {
            self.did = Some(base.clone());
        }
    }

    /// Return a qualified copy.
    pub fn qualified(&self, base: &Did) -> Self {
        let mut url = self.clone();
        url.qualify(base);
        url
    }

    /// Whether the URL belongs to `did`.
    pub fn belongs_to(&self, did: &Did) -> bool {
        self.did.as_ref() == Some(did)
    }
}

fn check_fragment(fragment: &str) -> Result<()> {
    if fragment.is_empty()
        || !fragment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(DidError::MalformedDidUrl(format!(
            "invalid fragment: {fragment}"
        )));
    }
    Ok(())
}

impl fmt::Display for DidUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.did {
            Some(did) => write!(f, "{did}#{}", self.fragment),
            None => write!(f, "#{}", self.fragment),
        }
    }
}

impl FromStr for DidUrl {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self> {
        let (did_part, fragment) = s
            .split_once('#')
            .ok_or_else(|| DidError::MalformedDidUrl(format!("missing fragment: {s}")))?;
        check_fragment(fragment)?;
        let did = if did_part.is_empty() {
            None
        } else {
            Some(
                did_part
                    .parse::<Did>()
                    .map_err(|e| DidError::MalformedDidUrl(format!("{s}: {e}")))?,
            )
        };
        Ok(Self {
            did,
            fragment: fragment.to_string(),
        })
    }
}

impl Ord for DidUrl {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl PartialOrd for DidUrl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for DidUrl {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DidUrl {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
