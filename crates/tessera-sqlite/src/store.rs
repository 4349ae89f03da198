use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{
    blocking::{run_blocking, run_blocking_commit},
    clock::now_millis,
    engine::apply_atomic_write,
    error::{Result, TesseraError},
    traits::Backend,
    types::{
        AtomicWrite, BackendKind, BackendMeta, CommitResult, Consistency, Entry, Key, ScanRequest,
        ScannedEntry, Versionstamp,
    },
    SqliteConfig,
};
use tracing::{debug, info};

use crate::db_err;
use crate::read_pool::SqliteReadPool;
use crate::rows::{select_entry, select_range};
use crate::schema;
use crate::txn::SqliteKvTxn;

struct SqliteInner {
    writer: Mutex<Connection>,
    read_pool: Option<SqliteReadPool>,
    config: SqliteConfig,
    closed: AtomicBool,
}

impl SqliteInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TesseraError::Closed)
        } else {
            Ok(())
        }
    }

    /// Run a read on a pooled connection when allowed, otherwise on the writer
    fn read<R>(&self, consistency: Consistency, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        self.ensure_open()?;
        match (&self.read_pool, consistency) {
            (Some(pool), Consistency::Eventual) => {
                let conn = pool.acquire()?;
                f(conn.connection())
            }
            _ => {
                let conn = self.writer.lock();
                f(&conn)
            }
        }
    }
}

/// Relational SQLite backend
///
/// One writer connection serializes commits (`BEGIN IMMEDIATE`); reads with
/// [`Consistency::Eventual`] go to a pool of read-only connections when one is
/// configured. Values are stored as JSON text, keys as an order-preserving
/// BLOB plus a JSON text column.
#[derive(Clone)]
pub struct SqliteBackend {
    inner: Arc<SqliteInner>,
}

impl SqliteBackend {
    pub fn open(cfg: SqliteConfig) -> Result<Self> {
        if let Some(parent) = cfg.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            &cfg.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(db_err)?;

        Self::configure_connection(&conn, &cfg)?;
        schema::init_schema(&conn)?;

        let read_pool = if cfg.read_pool.enabled {
            Some(SqliteReadPool::new(&cfg.path, &cfg.read_pool)?)
        } else {
            None
        };

        info!(
            path = %cfg.path.display(),
            read_pool = read_pool.as_ref().map(|p| p.pool_size()).unwrap_or(0),
            "Opened SQLite backend"
        );

        Ok(Self {
            inner: Arc::new(SqliteInner {
                writer: Mutex::new(conn),
                read_pool,
                config: cfg,
                closed: AtomicBool::new(false),
            }),
        })
    }

    fn configure_connection(conn: &Connection, cfg: &SqliteConfig) -> Result<()> {
        if cfg.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| TesseraError::Config(e.to_string()))?;
        }

        conn.pragma_update(None, "synchronous", cfg.synchronous.as_pragma())
            .map_err(|e| TesseraError::Config(e.to_string()))?;

        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| TesseraError::Config(e.to_string()))?;

        conn.pragma_update(None, "cache_size", cfg.cache_size)
            .map_err(|e| TesseraError::Config(e.to_string()))?;

        conn.busy_timeout(Duration::from_millis(cfg.busy_timeout_ms))
            .map_err(|e| TesseraError::Config(e.to_string()))?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.inner.config.path
    }

    /// Run `f` against the writer connection (for migrations and diagnostics)
    ///
    /// Holds the writer lock for the duration of `f`.
    pub fn with_connection<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        self.inner.ensure_open()?;
        let conn = self.inner.writer.lock();
        f(&conn)
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn get_many(&self, keys: &[Key], consistency: Consistency) -> Result<Vec<Option<Entry>>> {
        let inner = self.inner.clone();
        let encoded = keys.iter().map(Key::encode).collect::<Result<Vec<_>>>()?;
        run_blocking("sqlite get", move || {
            inner.read(consistency, |conn| {
                let now = now_millis();
                encoded
                    .iter()
                    .map(|sort_key| select_entry(conn, sort_key, now))
                    .collect()
            })
        })
        .await
    }

    async fn scan(&self, request: ScanRequest) -> Result<Vec<ScannedEntry>> {
        let inner = self.inner.clone();
        run_blocking("sqlite scan", move || {
            inner.read(request.consistency, |conn| {
                select_range(
                    conn,
                    &request.range,
                    request.limit,
                    request.reverse,
                    now_millis(),
                )
            })
        })
        .await
    }

    async fn commit(&self, write: AtomicWrite) -> Result<CommitResult> {
        let inner = self.inner.clone();
        inner.ensure_open()?;
        run_blocking_commit(move || {
            let mut conn = inner.writer.lock();
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(db_err)?;
            let mut txn = SqliteKvTxn::new(tx);
            let result = apply_atomic_write(&mut txn, &write, now_millis())?;
            if result.is_ok() {
                txn.commit()?;
            }
            Ok(result)
        })
        .await
    }

    async fn purge_expired(&self, now_ms: i64) -> Result<usize> {
        let inner = self.inner.clone();
        run_blocking("sqlite purge", move || {
            inner.ensure_open()?;
            let conn = inner.writer.lock();
            let purged = conn
                .execute(
                    "DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    [now_ms],
                )
                .map_err(db_err)?;
            if purged > 0 {
                debug!(purged, "Purged expired SQLite entries");
            }
            Ok(purged)
        })
        .await
    }

    async fn meta(&self) -> Result<BackendMeta> {
        let inner = self.inner.clone();
        run_blocking("sqlite meta", move || {
            inner.read(Consistency::Strong, |conn| {
                let (versionstamp, schema_version, created_at) = conn
                    .query_row(
                        "SELECT versionstamp, schema_version, created_at FROM kv_meta WHERE id = 0",
                        [],
                        |row| {
                            Ok((
                                row.get::<_, i64>(0)?,
                                row.get::<_, i64>(1)?,
                                row.get::<_, String>(2)?,
                            ))
                        },
                    )
                    .map_err(db_err)?;
                let entry_count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM kv_entries
                         WHERE expires_at IS NULL OR expires_at > ?1",
                        [now_millis()],
                        |row| row.get(0),
                    )
                    .map_err(db_err)?;
                Ok(BackendMeta {
                    kind: BackendKind::Sqlite,
                    versionstamp: Versionstamp::new(versionstamp as u64),
                    entry_count: entry_count as u64,
                    schema_version: schema_version as u32,
                    created_at: Some(created_at),
                })
            })
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            info!(path = %self.inner.config.path.display(), "Closed SQLite backend");
        }
        // Connections close when the last handle drops.
        Ok(())
    }
}
