//! Tessera Prelude
//!
//! ```
//! use tessera::prelude::*;
//! ```

// Core types
pub use crate::{
    key, BackendKind, BackendMeta, CommitResult, Consistency, Cursor, Entry, EntryMaybe, Key,
    KeyPart, Result, Symbol, TesseraError, Value, Versionstamp,
};

// Configs
pub use crate::{BackendConfig, LimitsConfig, LmdbConfig, QueueConfig, SqliteConfig, StoreConfig};

// Store API
pub use crate::{
    AtomicOperation, EnqueueOptions, ListIterator, ListOptions, ListSelector, QueueHandler,
    QueueListener, ReadOptions, SetOptions, TesseraDb,
};

// Re-export common external deps
pub use anyhow;
pub use std::sync::Arc;
pub use tracing;
