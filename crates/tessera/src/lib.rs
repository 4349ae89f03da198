//! Tessera: a portable transactional key-value store
//!
//! Tessera gives every backend the same contract:
//! - **Typed composite keys** ordered identically on every backend
//! - **Atomic commits** with versionstamp checks and set/delete/sum/min/max mutations
//! - **Lazy range listings** with cursors, reverse order and consistency levels
//! - **A durable work queue** with delays, backoff and dead-letter keys
//!
//! Backends: embedded LMDB, relational SQLite and in-memory, selected at
//! startup through [`StoreConfig`].
//!
//! # Quick Start
//!
//! ```no_run
//! use tessera::prelude::*;
//!
//! # async fn run() -> Result<()> {
//! let db = TesseraDb::open(StoreConfig::lmdb("./data")).await?;
//!
//! db.set(key!["users", "by_id", "u1"], Value::object([("name", "A")])).await?;
//! let entry = db.get(key!["users", "by_id", "u1"]).await?;
//! assert!(entry.versionstamp.is_some());
//!
//! db.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod db;
mod expiry;
pub mod list;
pub mod prelude;
pub mod queue;

// Re-export core types
pub use tessera_core::{
    codec,
    config::{
        BackendConfig, LimitsConfig, LmdbConfig, QueueConfig, ReadPoolConfig, SqliteConfig,
        StoreConfig, SyncMode, SynchronousMode,
    },
    error::{Result, TesseraError},
    key,
    traits::Backend,
    types::{
        BackendKind, BackendMeta, CommitResult, Consistency, Cursor, Entry, EntryMaybe, Key,
        KeyPart, ListSelector, Symbol, Value, Versionstamp,
    },
};

// Re-export implementations
pub use tessera_core::MemoryBackend;
pub use tessera_lmdb::LmdbBackend;
pub use tessera_sqlite::SqliteBackend;

// Re-export main types from this crate
pub use atomic::AtomicOperation;
pub use db::{ReadOptions, SetOptions, TesseraDb};
pub use list::{ListIterator, ListOptions};
pub use queue::{EnqueueOptions, QueueHandler, QueueListener};
