//! SQLite Read Connection Pool
//!
//! Provides a pool of read-only SQLite connections for reads issued with
//! eventual consistency. Unlike LMDB, SQLite requires separate connections for
//! true read concurrency. The pool is used from the blocking thread pool, so
//! acquisition waits synchronously.

use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tessera_core::{
    error::{Result, TesseraError},
    ReadPoolConfig,
};

use crate::db_err;

/// A pooled read-only connection, returned to the pool on drop
pub struct PooledSqliteConnection<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl PooledSqliteConnection<'_> {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// SQLite Read Connection Pool
///
/// Each connection is opened with `SQLITE_OPEN_READ_ONLY`.
pub struct SqliteReadPool {
    connections: Vec<Mutex<Connection>>,
    next: AtomicUsize,
    acquire_timeout: Duration,
    db_path: PathBuf,
}

impl SqliteReadPool {
    /// Opens `pool_size` read-only connections to the database.
    pub fn new(db_path: &Path, config: &ReadPoolConfig) -> Result<Self> {
        let pool_size = config.pool_size.max(1);
        let mut connections = Vec::with_capacity(pool_size);

        for _ in 0..pool_size {
            let conn = Connection::open_with_flags(
                db_path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(db_err)?;
            connections.push(Mutex::new(conn));
        }

        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            db_path: db_path.to_path_buf(),
        })
    }

    /// Acquire a pooled read-only connection
    ///
    /// Takes any idle connection; when all are busy, waits up to the
    /// configured timeout for one of them.
    pub fn acquire(&self) -> Result<PooledSqliteConnection<'_>> {
        for conn in &self.connections {
            if let Some(guard) = conn.try_lock() {
                return Ok(PooledSqliteConnection { conn: guard });
            }
        }

        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[slot]
            .try_lock_for(self.acquire_timeout)
            .map(|guard| PooledSqliteConnection { conn: guard })
            .ok_or_else(|| {
                TesseraError::Connectivity(format!(
                    "read pool acquire timeout after {:?}",
                    self.acquire_timeout
                ))
            })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn pool_size(&self) -> usize {
        self.connections.len()
    }
}
