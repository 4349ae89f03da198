use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, TesseraError};

/// LMDB backend: an environment directory holding the entry, expiry index
/// and metadata databases
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmdbConfig {
    /// Environment directory; created on open
    pub path: PathBuf,

    /// Upper bound on the memory map, and so on the store size
    /// (default: 1 GiB)
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    /// Concurrent read transactions (default: 126)
    #[serde(default = "default_max_readers")]
    pub max_readers: u32,

    #[serde(default)]
    pub sync_mode: SyncMode,
}

/// How hard LMDB flushes on commit
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` on every commit; survives power loss.
    Full,

    /// Skip the meta-page sync. A power failure may drop the last commit but
    /// never corrupts the environment.
    #[default]
    NoMetaSync,

    /// Leave flushing to the OS. Tests and scratch stores only.
    NoSync,
}

fn default_map_size() -> usize {
    1024 * 1024 * 1024
}

fn default_max_readers() -> u32 {
    126
}

impl LmdbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            map_size: default_map_size(),
            max_readers: default_max_readers(),
            sync_mode: SyncMode::default(),
        }
    }

    pub fn with_map_size(mut self, map_size: usize) -> Self {
        self.map_size = map_size;
        self
    }

    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(TesseraError::Config("lmdb path must not be empty".into()));
        }
        if self.map_size == 0 || self.max_readers == 0 {
            return Err(TesseraError::Config(
                "lmdb map_size and max_readers must be positive".into(),
            ));
        }
        Ok(())
    }
}
