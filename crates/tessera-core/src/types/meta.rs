use serde::{Deserialize, Serialize};
use std::fmt;

use super::Versionstamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    Lmdb,
    Sqlite,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Lmdb => "lmdb",
            BackendKind::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational snapshot of a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendMeta {
    pub kind: BackendKind,
    /// Versionstamp of the most recent commit (`ZERO` before the first one)
    pub versionstamp: Versionstamp,
    /// Live (unexpired) entries, including messages in the reserved queue
    /// namespace
    pub entry_count: u64,
    pub schema_version: u32,
    pub created_at: Option<String>,
}
