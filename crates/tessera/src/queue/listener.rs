use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{
    clock::{millis_after, now_millis},
    observe, AtomicWrite, Check, CommitResult, Consistency, Key, ListSelector, Mutation,
    MutationKind, QueueConfig, Result, ScanRequest, ScannedEntry, TesseraError, Versionstamp,
};
use tokio::sync::{watch, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::message::{QueueMessage, QueuedItem};
use super::{QueueHandler, QUEUE_NAMESPACE};
use crate::db::TesseraDb;

/// Handle to a running queue consumer
///
/// Dropping the handle detaches the consumer; it then runs until the store
/// is closed. Call [`shutdown`](Self::shutdown) to stop it earlier.
pub struct QueueListener {
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl QueueListener {
    pub(crate) fn spawn(db: TesseraDb, handler: Arc<dyn QueueHandler>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let config = db.inner.config.queue.clone();

        let worker = Worker {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            shutdown: db.inner.shutdown.subscribe(),
            stop: stop.clone(),
            wake: wake.clone(),
            db,
            handler,
            config,
        };

        let active = worker.db.inner.active_listeners.clone();
        active.fetch_add(1, Ordering::SeqCst);
        let handle = tokio::spawn(async move {
            worker.run().await;
            active.fetch_sub(1, Ordering::SeqCst);
        });

        Self {
            stop,
            wake,
            handle: Some(handle),
        }
    }

    /// Stop polling and wait for in-flight handlers to finish
    pub async fn shutdown(mut self) {
        info!("Queue listener shutdown requested");
        self.stop.store(true, Ordering::SeqCst);
        self.wake.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

struct Worker {
    db: TesseraDb,
    handler: Arc<dyn QueueHandler>,
    config: QueueConfig,
    semaphore: Arc<Semaphore>,
    shutdown: watch::Receiver<bool>,
    stop: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

/// What one poll found and how much of it this consumer took over
#[derive(Debug, Clone, Copy)]
struct PollBatch {
    fetched: usize,
    /// Entries claimed or removed as malformed
    settled: usize,
}

impl PollBatch {
    /// Poll again right away only when the batch was full and this consumer
    /// moved something out of the due range; a batch lost entirely to
    /// concurrent claims waits for the next tick.
    fn more_due(&self, batch_size: usize) -> bool {
        self.fetched == batch_size && self.settled > 0
    }
}

/// A claimed message, parked at its lease position while the handler runs
struct Lease {
    key: Key,
    versionstamp: Versionstamp,
    message: QueueMessage,
}

impl Worker {
    fn stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst) || *self.shutdown.borrow()
    }

    async fn run(mut self) {
        info!(
            max_concurrent = self.config.max_concurrent,
            poll_interval_ms = self.config.poll_interval_ms,
            "Queue listener started"
        );
        let enqueued = self.db.inner.queue_notify.clone();

        while !self.stopping() {
            match self.poll_once().await {
                Ok(batch) if batch.more_due(self.config.batch_size) => {
                    tokio::task::yield_now().await;
                    continue;
                }
                Ok(_) => {}
                Err(TesseraError::Closed) => break,
                Err(e) => error!(error = %e, "Queue poll failed"),
            }

            tokio::select! {
                _ = self.shutdown.changed() => {}
                _ = self.wake.notified() => {}
                _ = enqueued.notified() => {}
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        info!("Queue listener stopping, waiting for in-flight handlers");
        let _ = self
            .semaphore
            .acquire_many(self.config.max_concurrent as u32)
            .await;
        info!("Queue listener stopped");
    }

    /// Claim and dispatch every due message of one batch
    async fn poll_once(&self) -> Result<PollBatch> {
        let now = now_millis();
        let range = ListSelector::PrefixEnd {
            prefix: Key::new(vec![QUEUE_NAMESPACE.into()]),
            end: Key::new(vec![QUEUE_NAMESPACE.into(), (now.max(0) as u64 + 1).into()]),
        }
        .to_range()?;

        let due = self
            .db
            .scan(ScanRequest {
                range,
                limit: self.config.batch_size,
                reverse: false,
                consistency: Consistency::Strong,
            })
            .await?;
        let mut batch = PollBatch {
            fetched: due.len(),
            settled: 0,
        };
        if batch.fetched > 0 {
            debug!(fetched = batch.fetched, "Found due queue messages");
        }

        for ScannedEntry { entry, .. } in due {
            if self.stopping() {
                break;
            }

            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| TesseraError::Closed)?;

            let item = match QueuedItem::from_entry(entry.clone()) {
                Ok(item) => item,
                Err(e) => {
                    warn!(key = %entry.key, error = %e, "Dropping malformed queue entry");
                    let drop_entry = AtomicWrite {
                        checks: vec![Check {
                            key: entry.key.clone(),
                            versionstamp: Some(entry.versionstamp),
                        }],
                        mutations: vec![Mutation {
                            key: entry.key,
                            kind: MutationKind::Delete,
                        }],
                    };
                    if self.db.commit_write(drop_entry, false).await?.is_ok() {
                        batch.settled += 1;
                    }
                    continue;
                }
            };

            if let Some(lease) = self.claim(item).await? {
                let db = self.db.clone();
                let handler = self.handler.clone();
                let timeout = self.config.handler_timeout();
                tokio::spawn(deliver(db, handler, timeout, lease, permit));
                batch.settled += 1;
            }
        }

        Ok(batch)
    }

    /// Move a due message to its lease position
    ///
    /// Returns `None` when another consumer claimed it first.
    async fn claim(&self, item: QueuedItem) -> Result<Option<Lease>> {
        let lease_key = item
            .message
            .key_at(millis_after(Duration::from_millis(self.config.lease_ms)));
        let claim = AtomicWrite {
            checks: vec![Check {
                key: item.key.clone(),
                versionstamp: Some(item.versionstamp),
            }],
            mutations: vec![
                Mutation {
                    key: item.key,
                    kind: MutationKind::Delete,
                },
                Mutation {
                    key: lease_key.clone(),
                    kind: MutationKind::Set {
                        value: item.message.to_value(),
                        expires_at: None,
                    },
                },
            ],
        };

        match self.db.commit_write(claim, false).await? {
            CommitResult::Committed { versionstamp } => Ok(Some(Lease {
                key: lease_key,
                versionstamp,
                message: item.message,
            })),
            CommitResult::Conflict => {
                debug!(id = %item.message.id, "Queue message claimed elsewhere");
                Ok(None)
            }
        }
    }
}

/// Run the handler for one claimed message and settle the outcome
async fn deliver(
    db: TesseraDb,
    handler: Arc<dyn QueueHandler>,
    timeout: Duration,
    lease: Lease,
    permit: OwnedSemaphorePermit,
) {
    let payload = lease.message.payload.clone();
    let mut task = tokio::spawn(async move { handler.handle(payload).await });

    let failure = match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(Ok(()))) => None,
        Ok(Ok(Err(e))) => Some(format!("{:#}", e)),
        Ok(Err(join)) => Some(format!("handler panicked: {}", join)),
        Err(_) => {
            task.abort();
            Some(format!("handler timed out after {:?}", timeout))
        }
    };

    let id = lease.message.id.clone();
    let settled = match failure {
        None => settle_success(&db, lease).await,
        Some(reason) => {
            error!(id = %id, attempt = lease.message.attempt, reason = %reason, "Queue handler failed");
            settle_failure(&db, lease).await
        }
    };

    match settled {
        Ok(outcome) => observe::record_queue_delivery(outcome),
        Err(e) => error!(id = %id, error = %e, "Failed to settle queue message"),
    }

    // The listener's drain completes once every permit is back; the store
    // handle must already be gone by then.
    drop(db);
    drop(permit);
}

fn release(lease: &Lease) -> AtomicWrite {
    AtomicWrite {
        checks: vec![Check {
            key: lease.key.clone(),
            versionstamp: Some(lease.versionstamp),
        }],
        mutations: vec![Mutation {
            key: lease.key.clone(),
            kind: MutationKind::Delete,
        }],
    }
}

async fn settle_success(db: &TesseraDb, lease: Lease) -> Result<&'static str> {
    match db.commit_write(release(&lease), false).await? {
        CommitResult::Committed { .. } => {
            debug!(id = %lease.message.id, "Queue message delivered");
            Ok("ok")
        }
        CommitResult::Conflict => Ok(lease_lost(&lease)),
    }
}

async fn settle_failure(db: &TesseraDb, lease: Lease) -> Result<&'static str> {
    let mut write = release(&lease);

    let (outcome, requeued) = match lease.message.next_backoff() {
        Some(delay) => {
            let mut retry = lease.message.clone();
            retry.attempt += 1;
            write.mutations.push(Mutation {
                key: retry.key_at(millis_after(delay)),
                kind: MutationKind::Set {
                    value: retry.to_value(),
                    expires_at: None,
                },
            });
            debug!(id = %retry.id, attempt = retry.attempt, ?delay, "Rescheduling queue message");
            ("retry", true)
        }
        None => {
            let keys = lease.message.dead_letter_keys()?;
            warn!(
                id = %lease.message.id,
                attempts = lease.message.attempt + 1,
                dead_letter_keys = keys.len(),
                "Queue message undeliverable"
            );
            for key in keys {
                write.mutations.push(Mutation {
                    key,
                    kind: MutationKind::Set {
                        value: lease.message.payload.clone(),
                        expires_at: None,
                    },
                });
            }
            ("dead_letter", false)
        }
    };

    match db.commit_write(write, requeued).await? {
        CommitResult::Committed { .. } => Ok(outcome),
        CommitResult::Conflict => Ok(lease_lost(&lease)),
    }
}

fn lease_lost(lease: &Lease) -> &'static str {
    warn!(
        id = %lease.message.id,
        "Queue lease expired before the message was settled"
    );
    "lease_lost"
}
