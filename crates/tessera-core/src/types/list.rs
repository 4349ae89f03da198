use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Bound;
use std::str::FromStr;

use super::{Entry, Key};
use crate::codec::key::{encode_parts, PREFIX_END};
use crate::error::{Result, TesseraError};

/// Read freshness requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consistency {
    /// Observe every commit acknowledged before the read started.
    #[default]
    Strong,
    /// May be answered from a replica or pooled reader that lags the writer.
    Eventual,
}

/// Which keys a list call covers.
#[derive(Debug, Clone, PartialEq)]
pub enum ListSelector {
    /// Every key strictly longer than the prefix that starts with it.
    Prefix(Key),
    /// `start` inclusive, `end` exclusive.
    Range { start: Key, end: Key },
    /// Keys under `prefix` from `start` (inclusive) on.
    PrefixStart { prefix: Key, start: Key },
    /// Keys under `prefix` before `end` (exclusive).
    PrefixEnd { prefix: Key, end: Key },
}

impl ListSelector {
    pub fn prefix(prefix: Key) -> Self {
        ListSelector::Prefix(prefix)
    }

    pub fn range(start: Key, end: Key) -> Self {
        ListSelector::Range { start, end }
    }

    /// Resolve the selector into encoded byte bounds.
    pub fn to_range(&self) -> Result<ScanRange> {
        match self {
            ListSelector::Prefix(prefix) => {
                let encoded = encode_parts(prefix.parts());
                Ok(ScanRange {
                    start: Bound::Excluded(encoded.clone()),
                    end: Bound::Excluded(prefix_end(encoded)),
                })
            }
            ListSelector::Range { start, end } => {
                let start = start.encode()?;
                let end = end.encode()?;
                if start > end {
                    return Err(TesseraError::Validation(
                        "range start sorts after range end".into(),
                    ));
                }
                Ok(ScanRange {
                    start: Bound::Included(start),
                    end: Bound::Excluded(end),
                })
            }
            ListSelector::PrefixStart { prefix, start } => {
                let encoded_prefix = encode_parts(prefix.parts());
                let start = start.encode()?;
                ensure_under_prefix(&encoded_prefix, &start, "start")?;
                Ok(ScanRange {
                    start: Bound::Included(start),
                    end: Bound::Excluded(prefix_end(encoded_prefix)),
                })
            }
            ListSelector::PrefixEnd { prefix, end } => {
                let encoded_prefix = encode_parts(prefix.parts());
                let end = end.encode()?;
                ensure_under_prefix(&encoded_prefix, &end, "end")?;
                Ok(ScanRange {
                    start: Bound::Excluded(encoded_prefix),
                    end: Bound::Excluded(end),
                })
            }
        }
    }
}

fn prefix_end(mut encoded: Vec<u8>) -> Vec<u8> {
    encoded.push(PREFIX_END);
    encoded
}

fn ensure_under_prefix(prefix: &[u8], key: &[u8], what: &str) -> Result<()> {
    if key.len() > prefix.len() && key.starts_with(prefix) {
        Ok(())
    } else {
        Err(TesseraError::Validation(format!(
            "{} key is not under the selector prefix",
            what
        )))
    }
}

/// Encoded key bounds of a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRange {
    pub start: Bound<Vec<u8>>,
    pub end: Bound<Vec<u8>>,
}

impl ScanRange {
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let after_start = match &self.start {
            Bound::Included(s) => key >= s.as_slice(),
            Bound::Excluded(s) => key > s.as_slice(),
            Bound::Unbounded => true,
        };
        let before_end = match &self.end {
            Bound::Included(e) => key <= e.as_slice(),
            Bound::Excluded(e) => key < e.as_slice(),
            Bound::Unbounded => true,
        };
        after_start && before_end
    }

    /// True when no key can satisfy both bounds.
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Bound::Included(s), Bound::Included(e)) => s > e,
            (Bound::Included(s), Bound::Excluded(e))
            | (Bound::Excluded(s), Bound::Included(e))
            | (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
            _ => false,
        }
    }

    /// The part of this range left to scan after `position` was returned.
    pub fn resume_after(&self, position: &[u8], reverse: bool) -> ScanRange {
        if reverse {
            ScanRange {
                start: self.start.clone(),
                end: Bound::Excluded(position.to_vec()),
            }
        } else {
            ScanRange {
                start: Bound::Excluded(position.to_vec()),
                end: self.end.clone(),
            }
        }
    }
}

/// One bounded read of a key range.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub range: ScanRange,
    pub limit: usize,
    pub reverse: bool,
    pub consistency: Consistency,
}

/// A scan hit together with the encoded key it is stored under.
///
/// `position` is what ordering, resumption and cursors are based on;
/// `entry.key` may be a best-effort reconstruction of a legacy text key
/// whose own encoding sorts elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedEntry {
    pub position: Vec<u8>,
    pub entry: Entry,
}

/// Opaque resume token: the encoded key of the last entry a listing returned.
///
/// Serialized as unpadded URL-safe base64.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(Vec<u8>);

impl Cursor {
    pub fn from_encoded_key(bytes: Vec<u8>) -> Self {
        Cursor(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Reject cursors that were not produced by a listing of `range`.
    pub fn validate_for(&self, range: &ScanRange) -> Result<()> {
        if range.contains(&self.0) {
            Ok(())
        } else {
            Err(TesseraError::Validation(
                "cursor does not belong to this selector".into(),
            ))
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&URL_SAFE_NO_PAD.encode(&self.0))
    }
}

impl FromStr for Cursor {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|e| TesseraError::Validation(format!("malformed cursor: {}", e)))?;
        if bytes.is_empty() {
            return Err(TesseraError::Validation("empty cursor".into()));
        }
        Ok(Cursor(bytes))
    }
}
