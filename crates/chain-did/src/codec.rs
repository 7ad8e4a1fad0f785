//! Canonical JSON codec.
//!
//! The normalized encoding is compact JSON whose object keys are sorted
//! lexicographically at every level. It is the only encoding ever used as
//! signing material, so two logically equal entities always produce the
//! same bytes. The non-normalized encoding is pretty-printed in field
//! declaration order and is meant for humans.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{DidError, Result};

/// Encode `value` as JSON.
pub fn encode<T: Serialize>(value: &T, normalized: bool) -> Result<String> {
    if normalized {
        // serde_json::Map is ordered by key unless `preserve_order` is enabled.
        Ok(serde_json::to_string(&serde_json::to_value(value)?)?)
    } else {
        Ok(serde_json::to_string_pretty(value)?)
    }
}

/// Decode an entity from JSON text.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_str(text)?)
}

/// Normalized bytes of `value` with the top-level field `excluded` removed.
pub fn canonical_bytes_without<T: Serialize>(value: &T, excluded: &str) -> Result<Vec<u8>> {
    let mut json = serde_json::to_value(value)?;
    if let Value::Object(map) = &mut json {
        map.remove(excluded);
    }
    Ok(serde_json::to_vec(&json)?)
}

/// Normalized JSON of `value`, base64 encoded for a request payload.
pub fn to_base64<T: Serialize>(value: &T) -> Result<String> {
    Ok(URL_SAFE_NO_PAD.encode(encode(value, true)?))
}

/// Decode a payload produced by [`to_base64`].
pub fn from_base64<T: DeserializeOwned>(payload: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| DidError::SerializationError(format!("invalid base64 payload: {e}")))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Serde adapter for sequences written as a bare value when they hold
/// exactly one element.
pub mod one_or_many {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }

    pub fn serialize<T: Serialize, S: Serializer>(items: &[T], s: S) -> Result<S::Ok, S::Error> {
        match items {
            [single] => single.serialize(s),
            _ => items.serialize(s),
        }
    }

    pub fn deserialize<'de, T, D>(d: D) -> Result<Vec<T>, D::Error>
    where
        T: DeserializeOwned,
        D: Deserializer<'de>,
    {
        Ok(match OneOrMany::<T>::deserialize(d)? {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        })
    }
}
