//! Unified Tessera store handle
//!
//! Provides a single entry point over whichever backend the configuration
//! selects, plus the background expiry sweeper and queue listeners.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_core::{
    blocking::run_blocking,
    clock::millis_after,
    codec::encode_value_binary,
    observe, AtomicWrite, Backend, BackendConfig, BackendMeta, CommitResult, Consistency,
    EntryMaybe, Key, KeyPart, ListSelector, MemoryBackend, Result, ScanRequest, ScannedEntry,
    StoreConfig, TesseraError, Value, Versionstamp,
};
use tessera_lmdb::LmdbBackend;
use tessera_sqlite::SqliteBackend;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::atomic::AtomicOperation;
use crate::expiry::spawn_expiry_sweeper;
use crate::list::{ListIterator, ListOptions};
use crate::queue::{EnqueueOptions, QueueHandler, QueueListener, QUEUE_NAMESPACE};

/// Options for point reads
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    pub consistency: Consistency,
}

/// Options for unconditional writes
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Lower bound on the entry's lifetime. Once elapsed, reads treat the
    /// entry as absent and the sweeper removes it eventually.
    pub expire_in: Option<Duration>,
}

impl SetOptions {
    pub fn expire_in(duration: Duration) -> Self {
        Self {
            expire_in: Some(duration),
        }
    }

    pub(crate) fn expires_at(&self) -> Option<i64> {
        self.expire_in.map(millis_after)
    }
}

pub(crate) struct DbInner {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) config: StoreConfig,
    /// Set once `close` starts; no new listeners after this
    closing: AtomicBool,
    /// Set once background work has drained; every call fails after this
    closed: AtomicBool,
    /// Woken on every commit that enqueues a message
    pub(crate) queue_notify: Arc<Notify>,
    /// Broadcast `true` on close
    pub(crate) shutdown: watch::Sender<bool>,
    pub(crate) active_listeners: Arc<AtomicUsize>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// Tessera database handle
///
/// Cheap to clone; every clone shares the same backend. Open once at
/// startup, pass it to every collaborator and call [`close`](Self::close)
/// on shutdown. After close, every call on any clone fails with
/// [`TesseraError::Closed`].
#[derive(Clone)]
pub struct TesseraDb {
    pub(crate) inner: Arc<DbInner>,
}

impl TesseraDb {
    /// Open the backend selected by `config`
    ///
    /// Must be called within a tokio runtime: the expiry sweeper is spawned
    /// here unless `expiry_sweep_interval_ms` is zero.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let backend: Arc<dyn Backend> = match &config.backend {
            BackendConfig::Memory => Arc::new(MemoryBackend::new()),
            BackendConfig::Lmdb(cfg) => {
                let cfg = cfg.clone();
                Arc::new(run_blocking("lmdb open", move || LmdbBackend::open(cfg)).await?)
            }
            BackendConfig::Sqlite(cfg) => {
                let cfg = cfg.clone();
                Arc::new(run_blocking("sqlite open", move || SqliteBackend::open(cfg)).await?)
            }
        };

        Ok(Self::with_backend(backend, config))
    }

    /// Open a fresh in-memory store with default settings
    pub async fn open_in_memory() -> Result<Self> {
        Self::open(StoreConfig::memory()).await
    }

    /// Wrap an already opened backend
    pub fn with_backend(backend: Arc<dyn Backend>, config: StoreConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        let inner = Arc::new(DbInner {
            backend,
            config,
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            queue_notify: Arc::new(Notify::new()),
            shutdown,
            active_listeners: Arc::new(AtomicUsize::new(0)),
            sweeper: Mutex::new(None),
        });

        let db = Self { inner };
        if db.inner.config.expiry_sweep_interval_ms > 0 {
            let interval = Duration::from_millis(db.inner.config.expiry_sweep_interval_ms);
            let handle = spawn_expiry_sweeper(
                db.inner.backend.clone(),
                interval,
                db.inner.shutdown.subscribe(),
            );
            *db.inner.sweeper.lock() = Some(handle);
        }

        info!(backend = %db.inner.backend.kind(), "Opened Tessera store");
        db
    }

    /// Open a store, run `f` with it and close it again
    ///
    /// The store is closed whether `f` succeeds or fails; an error from `f`
    /// takes precedence over an error from closing.
    pub async fn scoped<F, Fut, R>(config: StoreConfig, f: F) -> Result<R>
    where
        F: FnOnce(TesseraDb) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let db = Self::open(config).await?;
        let result = f(db.clone()).await;
        let closed = db.close().await;
        let value = result?;
        closed?;
        Ok(value)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            Err(TesseraError::Closed)
        } else {
            Ok(())
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Validate a caller-supplied key before it reaches the backend
    pub(crate) fn validate_key(&self, key: &Key) -> Result<()> {
        if is_reserved(key) {
            return Err(TesseraError::Validation(format!(
                "key namespace {:?} is reserved",
                QUEUE_NAMESPACE
            )));
        }
        self.validate_internal_key(key)
    }

    /// Size and emptiness checks, without the reserved-namespace rule
    pub(crate) fn validate_internal_key(&self, key: &Key) -> Result<()> {
        let encoded = key.encode()?;
        let max = self.inner.config.limits.max_key_size;
        if encoded.len() > max {
            return Err(TesseraError::Validation(format!(
                "key {} is {} bytes encoded, limit is {}",
                key,
                encoded.len(),
                max
            )));
        }
        Ok(())
    }

    pub(crate) fn validate_value(&self, value: &Value) -> Result<()> {
        if !value.is_finite() {
            return Err(TesseraError::Validation(
                "NaN and infinite floats cannot be stored".into(),
            ));
        }
        let size = encode_value_binary(value)?.len();
        let max = self.inner.config.limits.max_value_size;
        if size > max {
            return Err(TesseraError::Validation(format!(
                "value is {} bytes encoded, limit is {}",
                size, max
            )));
        }
        Ok(())
    }

    /// Point lookup; a missing key is not an error
    pub async fn get(&self, key: impl Into<Key>) -> Result<EntryMaybe> {
        self.get_with(key, ReadOptions::default()).await
    }

    pub async fn get_with(&self, key: impl Into<Key>, options: ReadOptions) -> Result<EntryMaybe> {
        let mut found = self.get_many_with(vec![key.into()], options).await?;
        found
            .pop()
            .ok_or_else(|| TesseraError::Connectivity("backend returned no result".into()))
    }

    /// Several point lookups, positionally aligned with `keys`
    pub async fn get_many(&self, keys: Vec<Key>) -> Result<Vec<EntryMaybe>> {
        self.get_many_with(keys, ReadOptions::default()).await
    }

    pub async fn get_many_with(
        &self,
        keys: Vec<Key>,
        options: ReadOptions,
    ) -> Result<Vec<EntryMaybe>> {
        self.ensure_open()?;
        for key in &keys {
            self.validate_key(key)?;
        }

        let found = self
            .inner
            .backend
            .get_many(&keys, options.consistency)
            .await?;
        if found.len() != keys.len() {
            return Err(TesseraError::Connectivity(format!(
                "backend returned {} results for {} keys",
                found.len(),
                keys.len()
            )));
        }

        Ok(keys
            .into_iter()
            .zip(found)
            .map(|(key, entry)| match entry {
                Some(entry) => EntryMaybe::from(entry),
                None => EntryMaybe::missing(key.persistable()),
            })
            .collect())
    }

    /// Unconditional upsert, returning the new versionstamp
    pub async fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<Versionstamp> {
        self.set_with(key, value, SetOptions::default()).await
    }

    pub async fn set_with(
        &self,
        key: impl Into<Key>,
        value: impl Into<Value>,
        options: SetOptions,
    ) -> Result<Versionstamp> {
        self.atomic()
            .set_with(key, value, options)
            .commit()
            .await?
            .into_result()
    }

    /// Remove `key`; removing an absent key succeeds
    pub async fn delete(&self, key: impl Into<Key>) -> Result<()> {
        self.atomic().delete(key).commit().await?.into_result()?;
        Ok(())
    }

    /// Start an atomic operation draft
    pub fn atomic(&self) -> AtomicOperation {
        AtomicOperation::new(self.clone())
    }

    /// Lazily list entries matching `selector`
    pub fn list(&self, selector: ListSelector, options: ListOptions) -> Result<ListIterator> {
        self.ensure_open()?;
        ListIterator::new(self.clone(), selector, options)
    }

    /// Durably schedule a queue message
    pub async fn enqueue(&self, value: impl Into<Value>, options: EnqueueOptions) -> Result<()> {
        self.atomic()
            .enqueue(value, options)
            .commit()
            .await?
            .into_result()?;
        Ok(())
    }

    /// Start consuming queue messages with `handler`
    ///
    /// Each message is delivered at least once; handlers must tolerate
    /// redelivery.
    pub fn listen_queue<H: QueueHandler>(&self, handler: H) -> Result<QueueListener> {
        if self.inner.closing.load(Ordering::SeqCst) {
            return Err(TesseraError::Closed);
        }
        Ok(QueueListener::spawn(self.clone(), Arc::new(handler)))
    }

    /// Backend kind, current versionstamp and entry count
    pub async fn meta(&self) -> Result<BackendMeta> {
        self.ensure_open()?;
        self.inner.backend.meta().await
    }

    /// Send a validated write to the backend
    pub(crate) async fn commit_write(&self, write: AtomicWrite, enqueued: bool) -> Result<CommitResult> {
        self.ensure_open()?;
        let started = Instant::now();
        let result = self.inner.backend.commit(write).await;

        let outcome = match &result {
            Ok(CommitResult::Committed { .. }) => "committed",
            Ok(CommitResult::Conflict) => "conflict",
            Err(_) => "error",
        };
        observe::record_commit(self.inner.backend.kind().as_str(), outcome, started.elapsed());
        debug!(outcome, elapsed = ?started.elapsed(), "Atomic commit");

        if enqueued && matches!(result, Ok(CommitResult::Committed { .. })) {
            self.inner.queue_notify.notify_one();
        }
        result
    }

    /// Range scan used by list iterators and the queue listener
    pub(crate) async fn scan(&self, request: ScanRequest) -> Result<Vec<ScannedEntry>> {
        self.ensure_open()?;
        self.inner.backend.scan(request).await
    }

    /// Stop background work and release the backend
    ///
    /// Waits for queue listeners to finish and settle their in-flight
    /// messages; the store stays usable until they have. Closing twice is a
    /// no-op.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Closing Tessera store");

        self.inner.shutdown.send_replace(true);

        let sweeper = self.inner.sweeper.lock().take();
        if let Some(handle) = sweeper {
            let _ = handle.await;
        }

        while self.inner.active_listeners.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.backend.close().await
    }
}

/// True when the key's first persistable part is the queue namespace
pub(crate) fn is_reserved(key: &Key) -> bool {
    matches!(
        key.parts().iter().find(|p| p.is_persistable()),
        Some(KeyPart::Text(ns)) if ns == QUEUE_NAMESPACE
    )
}
