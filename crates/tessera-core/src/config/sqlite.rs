use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, TesseraError};

/// Read-only connections serving [`Consistency::Eventual`] reads
///
/// [`Consistency::Eventual`]: crate::types::Consistency::Eventual
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadPoolConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Connections kept open (default: 4)
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// How long an eventual read waits for a free connection (default: 5000)
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,
}

fn default_pool_size() -> usize {
    4
}

fn default_acquire_timeout() -> u64 {
    5000
}

impl Default for ReadPoolConfig {
    fn default() -> Self {
        Self::enabled(default_pool_size())
    }
}

impl ReadPoolConfig {
    pub fn enabled(pool_size: usize) -> Self {
        Self {
            enabled: true,
            pool_size,
            acquire_timeout_ms: default_acquire_timeout(),
        }
    }

    /// Route every read through the writer connection
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::enabled(default_pool_size())
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.acquire_timeout_ms = timeout_ms;
        self
    }
}

/// `PRAGMA synchronous` level of the writer connection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SynchronousMode {
    Full,
    /// Durable across process crashes; WAL makes this safe against corruption
    #[default]
    Normal,
    Off,
}

impl SynchronousMode {
    pub fn as_pragma(&self) -> &'static str {
        match self {
            SynchronousMode::Full => "FULL",
            SynchronousMode::Normal => "NORMAL",
            SynchronousMode::Off => "OFF",
        }
    }
}

/// SQLite backend: one `kv_entries` table in a single database file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Database file; parent directories are created on open
    pub path: PathBuf,

    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    #[serde(default)]
    pub synchronous: SynchronousMode,

    /// `PRAGMA cache_size`; negative values are KiB (default: -16000)
    #[serde(default = "default_cache_size")]
    pub cache_size: i32,

    /// Wait on a locked database before reporting connectivity failure
    /// (default: 5000)
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    #[serde(default)]
    pub read_pool: ReadPoolConfig,
}

fn default_wal_mode() -> bool {
    true
}

fn default_cache_size() -> i32 {
    -16_000
}

fn default_busy_timeout() -> u64 {
    5000
}

impl SqliteConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            wal_mode: default_wal_mode(),
            synchronous: SynchronousMode::default(),
            cache_size: default_cache_size(),
            busy_timeout_ms: default_busy_timeout(),
            read_pool: ReadPoolConfig::default(),
        }
    }

    pub fn with_synchronous(mut self, synchronous: SynchronousMode) -> Self {
        self.synchronous = synchronous;
        self
    }

    pub fn with_read_pool(mut self, read_pool: ReadPoolConfig) -> Self {
        self.read_pool = read_pool;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(TesseraError::Config("sqlite path must not be empty".into()));
        }
        if self.read_pool.enabled && self.read_pool.pool_size == 0 {
            return Err(TesseraError::Config(
                "sqlite read pool needs at least one connection".into(),
            ));
        }
        // The pool opens read-only connections that only see commits in WAL mode.
        if self.read_pool.enabled && !self.wal_mode {
            return Err(TesseraError::Config(
                "sqlite read pool requires wal_mode".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_pool_and_wal() {
        let cfg = SqliteConfig::new("kv.db");
        assert!(cfg.wal_mode);
        assert!(cfg.read_pool.enabled);
        assert_eq!(cfg.synchronous.as_pragma(), "NORMAL");
        cfg.validate().unwrap();
    }

    #[test]
    fn test_pool_without_wal_rejected() {
        let mut cfg = SqliteConfig::new("kv.db");
        cfg.wal_mode = false;
        assert!(matches!(cfg.validate(), Err(TesseraError::Config(_))));

        cfg.read_pool = ReadPoolConfig::disabled();
        cfg.validate().unwrap();
    }

    #[test]
    fn test_synchronous_is_snake_case_in_json() {
        let cfg: SqliteConfig =
            serde_json::from_str(r#"{"path": "kv.db", "synchronous": "full"}"#).unwrap();
        assert_eq!(cfg.synchronous, SynchronousMode::Full);
        assert_eq!(cfg.read_pool.pool_size, 4);
    }
}
