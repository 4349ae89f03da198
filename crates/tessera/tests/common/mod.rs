#![allow(dead_code, unused_macros)]

use std::time::Duration;
use tempfile::TempDir;
use tessera::prelude::*;

/// An open store plus the directory backing it (if any)
pub struct TestStore {
    pub db: TesseraDb,
    pub dir: Option<TempDir>,
}

#[derive(Debug, Clone, Copy)]
pub enum Flavor {
    Memory,
    Lmdb,
    Sqlite,
}

pub fn config_for(flavor: Flavor, dir: Option<&TempDir>) -> StoreConfig {
    let config = match (flavor, dir) {
        (Flavor::Lmdb, Some(dir)) => {
            StoreConfig::with_backend(BackendConfig::Lmdb(
                LmdbConfig::new(dir.path().join("lmdb"))
                    .with_map_size(64 * 1024 * 1024)
                    .with_sync_mode(tessera::SyncMode::NoSync),
            ))
        }
        (Flavor::Sqlite, Some(dir)) => StoreConfig::sqlite(dir.path().join("kv.db")),
        _ => StoreConfig::memory(),
    };
    config.with_queue(
        QueueConfig::new()
            .with_poll_interval(Duration::from_millis(20))
            .with_lease(Duration::from_secs(5))
            .with_handler_timeout(Duration::from_secs(2)),
    )
}

pub async fn open(flavor: Flavor) -> TestStore {
    let dir = match flavor {
        Flavor::Memory => None,
        Flavor::Lmdb | Flavor::Sqlite => Some(tempfile::tempdir().unwrap()),
    };
    let db = TesseraDb::open(config_for(flavor, dir.as_ref())).await.unwrap();
    TestStore { db, dir }
}

/// Re-evaluate `$cond` (which may `.await`) until it holds or `$timeout`
/// elapses; yields whether it ended up holding.
macro_rules! wait_until {
    ($timeout:expr, $cond:expr) => {{
        let deadline = tokio::time::Instant::now() + $timeout;
        loop {
            if $cond {
                break true;
            }
            if tokio::time::Instant::now() >= deadline {
                break false;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }};
}
