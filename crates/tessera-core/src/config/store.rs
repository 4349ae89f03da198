use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::{LmdbConfig, QueueConfig, SqliteConfig};
use crate::error::{Result, TesseraError};

/// Which engine backs a store. Chosen once at startup.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Process-local store; contents vanish on close.
    #[default]
    Memory,
    Lmdb(LmdbConfig),
    Sqlite(SqliteConfig),
}

/// Size limits enforced before any backend interaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum encoded key size in bytes (default: 2048)
    #[serde(default = "default_max_key_size")]
    pub max_key_size: usize,

    /// Maximum encoded value size in bytes (default: 65536)
    #[serde(default = "default_max_value_size")]
    pub max_value_size: usize,
}

fn default_max_key_size() -> usize {
    2048
}

fn default_max_value_size() -> usize {
    64 * 1024
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_key_size: default_max_key_size(),
            max_value_size: default_max_value_size(),
        }
    }
}

/// Top-level store configuration
///
/// Can be built in code or loaded from a JSON file:
///
/// ```json
/// {
///   "backend": { "type": "sqlite", "path": "./data/kv.db" },
///   "queue": { "poll_interval_ms": 100 }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    /// How often expired entries are physically removed (default: 60000).
    /// Zero disables the sweeper; expired entries still read as absent.
    #[serde(default = "default_sweep_interval")]
    pub expiry_sweep_interval_ms: u64,
}

fn default_sweep_interval() -> u64 {
    60_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::memory()
    }
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self::with_backend(BackendConfig::Memory)
    }

    pub fn lmdb(path: impl AsRef<Path>) -> Self {
        Self::with_backend(BackendConfig::Lmdb(LmdbConfig::new(path.as_ref())))
    }

    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self::with_backend(BackendConfig::Sqlite(SqliteConfig::new(path.as_ref())))
    }

    pub fn with_backend(backend: BackendConfig) -> Self {
        Self {
            backend,
            queue: QueueConfig::default(),
            limits: LimitsConfig::default(),
            expiry_sweep_interval_ms: default_sweep_interval(),
        }
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_expiry_sweep_interval(mut self, interval: Duration) -> Self {
        self.expiry_sweep_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Load configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&raw).map_err(|e| {
            TesseraError::Config(format!("{}: {}", path.as_ref().display(), e))
        })
    }

    pub fn validate(&self) -> Result<()> {
        match &self.backend {
            BackendConfig::Memory => {}
            BackendConfig::Lmdb(lmdb) => lmdb.validate()?,
            BackendConfig::Sqlite(sqlite) => sqlite.validate()?,
        }
        self.queue.validate()?;
        if self.limits.max_key_size == 0 || self.limits.max_value_size == 0 {
            return Err(TesseraError::Config("size limits must be positive".into()));
        }
        Ok(())
    }
}
