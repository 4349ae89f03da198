//! SQLite-backed relational store
//!
//! Implements the Tessera [`Backend`](tessera_core::Backend) contract on a
//! single SQLite database file.
//!
//! Key features:
//! - One table of entries: binary `sort_key` for ordering, JSON text for keys and values
//! - Atomic commits in `BEGIN IMMEDIATE` transactions on a single writer connection
//! - Pool of read-only connections for eventually consistent reads
//! - Keys written by older releases (JSON-array strings, comma-joined text)
//!   decode transparently on read

pub mod read_pool;
pub mod rows;
pub mod schema;
pub mod store;
pub mod txn;

pub use read_pool::{PooledSqliteConnection, SqliteReadPool};
pub use store::SqliteBackend;
pub use txn::SqliteKvTxn;

use tessera_core::TesseraError;

/// Map a SQLite error onto the store's error taxonomy
pub(crate) fn db_err(err: rusqlite::Error) -> TesseraError {
    match err {
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::Utf8Error(_) => TesseraError::Encoding(err.to_string()),
        other => TesseraError::Connectivity(other.to_string()),
    }
}
