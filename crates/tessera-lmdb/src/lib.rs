//! LMDB-backed embedded store
//!
//! Implements the Tessera [`Backend`](tessera_core::Backend) contract on a
//! single LMDB environment.
//!
//! Key features:
//! - Keys stored under their order-preserving encoding, so cursor order is key order
//! - Each atomic commit runs in one LMDB write transaction (all or nothing)
//! - Forward and reverse range scans positioned with `MDB_SET_RANGE`
//! - Expiry index for sweeping expired entries without a full scan
//! - Single-writer semantics (enforced by LMDB's writer lock)

pub mod keys;
pub mod scan;
pub mod store;
pub mod txn;

pub use store::LmdbBackend;
pub use txn::LmdbKvTxn;
