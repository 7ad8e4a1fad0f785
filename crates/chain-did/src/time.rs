//! Time utilities for chain-did.
//!
//! All protocol timestamps are UTC instants with whole-second precision,
//! serialized as `YYYY-MM-DDTHH:MM:SSZ`.

use chrono::{DateTime, Months, SubsecRound, Utc};

/// Default lifetime of a document, in months.
pub const DEFAULT_EXPIRES_MONTHS: u32 = 12 * 5;

const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Return the current time truncated to whole seconds.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Drop sub-second precision.
pub fn truncate(t: DateTime<Utc>) -> DateTime<Utc> {
    t.trunc_subsecs(0)
}

/// Return the default expiration for a document sealed now.
pub fn default_expires() -> DateTime<Utc> {
    let now = now();
    now.checked_add_months(Months::new(DEFAULT_EXPIRES_MONTHS))
        .unwrap_or(now)
}

/// Format an instant in the wire representation.
pub fn format(t: &DateTime<Utc>) -> String {
    t.format(FORMAT).to_string()
}

/// Parse an instant from the wire representation.
pub fn parse(s: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(s, FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc).trunc_subsecs(0))
        })
}

/// Serde adapter for `DateTime<Utc>` in the wire representation.
pub mod seconds {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format(t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

/// Serde adapter for `Option<DateTime<Utc>>`.
pub mod seconds_opt {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => s.serialize_str(&super::format(t)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) => super::parse(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {raw}"))),
            None => Ok(None),
        }
    }
}
