use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Key, Value};
use crate::error::{Result, TesseraError};

/// Opaque, monotonically increasing token assigned on every successful commit.
///
/// Rendered as 20 lowercase hex digits. Every mutation applied by one commit
/// carries the same versionstamp.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Versionstamp(u64);

impl Versionstamp {
    pub const ZERO: Versionstamp = Versionstamp(0);

    pub fn new(raw: u64) -> Self {
        Versionstamp(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The versionstamp following this one.
    pub fn next(&self) -> Result<Versionstamp> {
        self.0
            .checked_add(1)
            .map(Versionstamp)
            .ok_or_else(|| TesseraError::Validation("versionstamp space exhausted".into()))
    }
}

impl fmt::Display for Versionstamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}0000", self.0)
    }
}

impl FromStr for Versionstamp {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 20 || !s.ends_with("0000") {
            return Err(TesseraError::Validation(format!(
                "invalid versionstamp: {:?}",
                s
            )));
        }
        u64::from_str_radix(&s[..16], 16)
            .map(Versionstamp)
            .map_err(|e| TesseraError::Validation(format!("invalid versionstamp {:?}: {}", s, e)))
    }
}

/// A stored key/value pair with the versionstamp of its last write.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: Key,
    pub value: Value,
    pub versionstamp: Versionstamp,
}

/// Result of a point read: either a full entry or an explicit miss.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryMaybe {
    pub key: Key,
    pub value: Option<Value>,
    pub versionstamp: Option<Versionstamp>,
}

impl EntryMaybe {
    pub fn missing(key: Key) -> Self {
        Self {
            key,
            value: None,
            versionstamp: None,
        }
    }

    pub fn is_some(&self) -> bool {
        self.versionstamp.is_some()
    }

    pub fn is_none(&self) -> bool {
        self.versionstamp.is_none()
    }

    pub fn into_entry(self) -> Option<Entry> {
        match (self.value, self.versionstamp) {
            (Some(value), Some(versionstamp)) => Some(Entry {
                key: self.key,
                value,
                versionstamp,
            }),
            _ => None,
        }
    }
}

impl From<Entry> for EntryMaybe {
    fn from(entry: Entry) -> Self {
        Self {
            key: entry.key,
            value: Some(entry.value),
            versionstamp: Some(entry.versionstamp),
        }
    }
}

/// What a backend keeps for each key besides the key itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub versionstamp: Versionstamp,
    /// Milliseconds since the Unix epoch after which the entry reads as absent.
    pub expires_at: Option<i64>,
    pub value: Value,
}

impl StoredRecord {
    /// Whether the record is visible at `now_ms`.
    pub fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at.map_or(true, |at| at > now_ms)
    }

    pub fn into_entry(self, key: Key) -> Entry {
        Entry {
            key,
            value: self.value,
            versionstamp: self.versionstamp,
        }
    }
}
