use async_trait::async_trait;
use lmdb::{Cursor, Database, DatabaseFlags, Environment, EnvironmentFlags, Transaction, WriteFlags};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera_core::{
    blocking::{run_blocking, run_blocking_commit},
    clock::now_millis,
    codec::decode_record,
    config::SyncMode,
    engine::apply_atomic_write,
    error::{Result, TesseraError},
    traits::Backend,
    types::{
        AtomicWrite, BackendKind, BackendMeta, CommitResult, Consistency, Entry, Key, ScanRequest,
        ScannedEntry,
    },
    LmdbConfig,
};
use tracing::{debug, info};

use crate::keys::{meta_keys, split_expiry_index_key, SCHEMA_VERSION};
use crate::scan::scan_range;
use crate::txn::{read_record, read_versionstamp, LmdbKvTxn};

struct LmdbInner {
    env: Environment,
    entries_db: Database,
    expiry_db: Database,
    meta_db: Database,
    path: PathBuf,
    closed: AtomicBool,
}

impl LmdbInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TesseraError::Closed)
        } else {
            Ok(())
        }
    }

    fn get_meta<T: Transaction>(&self, txn: &T, key: &str) -> Result<Option<String>> {
        match txn.get(self.meta_db, &key) {
            Ok(bytes) => {
                let value = std::str::from_utf8(bytes)
                    .map_err(|e| TesseraError::Encoding(e.to_string()))?
                    .to_string();
                Ok(Some(value))
            }
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(TesseraError::Connectivity(e.to_string())),
        }
    }

    fn begin_ro(&self) -> Result<lmdb::RoTransaction<'_>> {
        self.env
            .begin_ro_txn()
            .map_err(|e| TesseraError::Connectivity(e.to_string()))
    }
}

/// Embedded LMDB backend
///
/// Entries are stored in the `entries` database keyed by their
/// order-preserving encoding, so LMDB's native byte order is the key order.
/// A secondary `expiry` database indexes entries by expiry time for the
/// sweeper, and `meta` holds the versionstamp counter.
///
/// LMDB allows a single writer; concurrent commits queue on its writer lock
/// inside the blocking pool.
#[derive(Clone)]
pub struct LmdbBackend {
    inner: Arc<LmdbInner>,
}

impl LmdbBackend {
    pub fn open(cfg: LmdbConfig) -> Result<Self> {
        std::fs::create_dir_all(&cfg.path)?;

        let mut env_builder = Environment::new();
        env_builder.set_max_dbs(3); // entries, expiry, meta
        env_builder.set_map_size(cfg.map_size);
        env_builder.set_max_readers(cfg.max_readers);

        let mut flags = EnvironmentFlags::empty();
        match cfg.sync_mode {
            SyncMode::Full => {}
            SyncMode::NoMetaSync => {
                flags.insert(EnvironmentFlags::NO_META_SYNC);
            }
            SyncMode::NoSync => {
                flags.insert(EnvironmentFlags::NO_SYNC);
            }
        }
        env_builder.set_flags(flags);

        let env = env_builder
            .open(&cfg.path)
            .map_err(|e| TesseraError::Io(std::io::Error::other(e)))?;

        let entries_db = env
            .create_db(Some("entries"), DatabaseFlags::empty())
            .map_err(|e| TesseraError::Connectivity(e.to_string()))?;
        let expiry_db = env
            .create_db(Some("expiry"), DatabaseFlags::empty())
            .map_err(|e| TesseraError::Connectivity(e.to_string()))?;
        let meta_db = env
            .create_db(Some("meta"), DatabaseFlags::empty())
            .map_err(|e| TesseraError::Connectivity(e.to_string()))?;

        {
            let mut txn = env
                .begin_rw_txn()
                .map_err(|e| TesseraError::Connectivity(e.to_string()))?;

            if txn.get(meta_db, &meta_keys::SCHEMA_VERSION).is_err() {
                txn.put(
                    meta_db,
                    &meta_keys::SCHEMA_VERSION,
                    &SCHEMA_VERSION.to_string(),
                    WriteFlags::empty(),
                )
                .map_err(|e| TesseraError::Connectivity(e.to_string()))?;
            }

            if txn.get(meta_db, &meta_keys::CREATED_AT).is_err() {
                let now = chrono::Utc::now().to_rfc3339();
                txn.put(meta_db, &meta_keys::CREATED_AT, &now, WriteFlags::empty())
                    .map_err(|e| TesseraError::Connectivity(e.to_string()))?;
            }

            txn.commit()
                .map_err(|e| TesseraError::Connectivity(e.to_string()))?;
        }

        info!(path = %cfg.path.display(), "Opened LMDB backend");

        Ok(Self {
            inner: Arc::new(LmdbInner {
                env,
                entries_db,
                expiry_db,
                meta_db,
                path: cfg.path,
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Flush the environment to disk regardless of the configured sync mode
    pub fn sync(&self) -> Result<()> {
        self.inner
            .env
            .sync(true)
            .map_err(|e| TesseraError::Connectivity(e.to_string()))
    }
}

#[async_trait]
impl Backend for LmdbBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Lmdb
    }

    async fn get_many(&self, keys: &[Key], _consistency: Consistency) -> Result<Vec<Option<Entry>>> {
        let inner = self.inner.clone();
        let keys = keys.to_vec();
        run_blocking("lmdb get", move || {
            inner.ensure_open()?;
            let txn = inner.begin_ro()?;
            let now = now_millis();
            keys.into_iter()
                .map(|key| {
                    let encoded = key.encode()?;
                    Ok(read_record(&txn, inner.entries_db, &encoded)?
                        .filter(|record| record.is_live(now))
                        .map(|record| record.into_entry(key.persistable())))
                })
                .collect()
        })
        .await
    }

    async fn scan(&self, request: ScanRequest) -> Result<Vec<ScannedEntry>> {
        let inner = self.inner.clone();
        run_blocking("lmdb scan", move || {
            inner.ensure_open()?;
            let txn = inner.begin_ro()?;
            scan_range(
                &txn,
                inner.entries_db,
                &request.range,
                request.limit,
                request.reverse,
                now_millis(),
            )
        })
        .await
    }

    async fn commit(&self, write: AtomicWrite) -> Result<CommitResult> {
        let inner = self.inner.clone();
        inner.ensure_open()?;
        run_blocking_commit(move || {
            let txn = inner
                .env
                .begin_rw_txn()
                .map_err(|e| TesseraError::Connectivity(e.to_string()))?;
            let mut txn = LmdbKvTxn::new(txn, inner.entries_db, inner.expiry_db, inner.meta_db);
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
        run_blocking("lmdb purge", move || {
            inner.ensure_open()?;
            let mut txn = inner
                .env
                .begin_rw_txn()
                .map_err(|e| TesseraError::Connectivity(e.to_string()))?;

            let mut due = Vec::new();
            {
                let mut cursor = txn
                    .open_ro_cursor(inner.expiry_db)
                    .map_err(|e| TesseraError::Connectivity(e.to_string()))?;
                for (index_key, _) in cursor.iter_start() {
                    match split_expiry_index_key(index_key) {
                        Some((at, _)) if at > now_ms => break,
                        Some((at, encoded)) => due.push((index_key.to_vec(), at, encoded.to_vec())),
                        None => due.push((index_key.to_vec(), i64::MIN, Vec::new())),
                    }
                }
            }

            let mut purged = 0;
            for (index_key, at, encoded) in due {
                if !encoded.is_empty() {
                    let still_due = read_record(&txn, inner.entries_db, &encoded)?
                        .is_some_and(|record| record.expires_at == Some(at));
                    if still_due {
                        txn.del(inner.entries_db, &encoded, None)
                            .map_err(|e| TesseraError::Connectivity(e.to_string()))?;
                        purged += 1;
                    }
                }
                txn.del(inner.expiry_db, &index_key, None)
                    .map_err(|e| TesseraError::Connectivity(e.to_string()))?;
            }

            txn.commit()
                .map_err(|e| TesseraError::Connectivity(e.to_string()))?;
            if purged > 0 {
                debug!(purged, "Purged expired LMDB entries");
            }
            Ok(purged)
        })
        .await
    }

    async fn meta(&self) -> Result<BackendMeta> {
        let inner = self.inner.clone();
        run_blocking("lmdb meta", move || {
            inner.ensure_open()?;
            let txn = inner.begin_ro()?;
            let versionstamp = read_versionstamp(&txn, inner.meta_db)?;
            let schema_version = inner
                .get_meta(&txn, meta_keys::SCHEMA_VERSION)?
                .and_then(|v| v.parse().ok())
                .unwrap_or(SCHEMA_VERSION);
            let created_at = inner.get_meta(&txn, meta_keys::CREATED_AT)?;
            let entry_count = {
                let now = now_millis();
                let mut cursor = txn
                    .open_ro_cursor(inner.entries_db)
                    .map_err(|e| TesseraError::Connectivity(e.to_string()))?;
                let mut live = 0u64;
                for (_, value) in cursor.iter_start() {
                    if decode_record(value)?.is_live(now) {
                        live += 1;
                    }
                }
                live
            };
            Ok(BackendMeta {
                kind: BackendKind::Lmdb,
                versionstamp,
                entry_count,
                schema_version,
                created_at,
            })
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            self.sync()?;
            info!(path = %self.inner.path.display(), "Closed LMDB backend");
        }
        Ok(())
    }
}
