//! Tessera Core: types, codecs and the commit engine shared by every backend
//!
//! This crate defines the backend-independent half of the store:
//! - Typed composite keys with an order-preserving binary encoding and a
//!   JSON text form (plus transparent decoding of legacy text keys)
//! - Structured values with binary and JSON codecs that keep integers,
//!   floats and binary data apart
//! - The atomic commit engine (checks, set/delete/sum/min/max) that each
//!   backend runs inside its own native write transaction
//! - The [`Backend`] trait and an in-memory implementation
//! - Configuration for every backend and for queue delivery

pub mod blocking;
pub mod clock;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod observe;
pub mod traits;
pub mod types;

pub use config::{
    BackendConfig, LimitsConfig, LmdbConfig, QueueConfig, ReadPoolConfig, SqliteConfig,
    StoreConfig, SyncMode, SynchronousMode,
};
pub use error::{Result, TesseraError};
pub use memory::MemoryBackend;
pub use traits::{Backend, KvTxn};
pub use types::{
    AtomicWrite, BackendKind, BackendMeta, Check, CommitResult, Consistency, Cursor, Entry,
    EntryMaybe, Key, KeyPart, ListSelector, Mutation, MutationKind, ScanRange, ScanRequest, ScannedEntry,
    StoredRecord, Symbol, Value, Versionstamp,
};
