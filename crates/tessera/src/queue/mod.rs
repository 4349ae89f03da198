//! Durable work queue layered on the key-value store
//!
//! Messages are ordinary entries under the reserved `__queue__` namespace,
//! keyed by `[__queue__, ready_at_ms, id]` so a range scan up to "now"
//! yields exactly the due messages in dispatch order. Delivery is
//! at-least-once: a listener claims a message by atomically moving it to a
//! lease position, runs the handler with no store lock held, and then
//! removes, reschedules or dead-letters it in a second commit.

mod listener;
mod message;

pub use listener::QueueListener;
pub(crate) use message::QueueMessage;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tessera_core::{clock::millis_after, Key, Result, TesseraError, Value};

/// Leading key part of every queue entry
pub const QUEUE_NAMESPACE: &str = "__queue__";

/// Longest accepted initial delay (30 days)
pub const MAX_DELAY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Most retries a message may schedule
pub const MAX_BACKOFF_STEPS: usize = 5;

/// Longest accepted single retry delay
pub const MAX_BACKOFF_STEP: Duration = Duration::from_secs(60 * 60);

/// Retry delays used when a message does not specify its own
pub const DEFAULT_BACKOFF_SCHEDULE: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

/// Delivery options for one message
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Time before the first delivery attempt
    pub delay: Option<Duration>,
    /// Keys that receive the payload once every retry has failed
    pub keys_if_undelivered: Vec<Key>,
    /// Retry delays, consumed in order; `None` uses [`DEFAULT_BACKOFF_SCHEDULE`]
    pub backoff_schedule: Option<Vec<Duration>>,
}

impl EnqueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_keys_if_undelivered(mut self, keys: Vec<Key>) -> Self {
        self.keys_if_undelivered = keys;
        self
    }

    pub fn with_backoff_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.backoff_schedule = Some(schedule);
        self
    }

    pub fn backoff_schedule(&self) -> Vec<Duration> {
        self.backoff_schedule
            .clone()
            .unwrap_or_else(|| DEFAULT_BACKOFF_SCHEDULE.to_vec())
    }

    pub(crate) fn ready_at(&self) -> i64 {
        millis_after(self.delay.unwrap_or(Duration::ZERO))
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(delay) = self.delay {
            if delay > MAX_DELAY {
                return Err(TesseraError::Validation(format!(
                    "queue delay {:?} exceeds the {:?} maximum",
                    delay, MAX_DELAY
                )));
            }
        }

        if let Some(schedule) = &self.backoff_schedule {
            if schedule.len() > MAX_BACKOFF_STEPS {
                return Err(TesseraError::Validation(format!(
                    "backoff schedule has {} steps, at most {} allowed",
                    schedule.len(),
                    MAX_BACKOFF_STEPS
                )));
            }
            if let Some(step) = schedule.iter().find(|d| **d > MAX_BACKOFF_STEP) {
                return Err(TesseraError::Validation(format!(
                    "backoff step {:?} exceeds the {:?} maximum",
                    step, MAX_BACKOFF_STEP
                )));
            }
        }

        Ok(())
    }
}

/// Consumer of queue messages
///
/// Invoked at least once per message. Returning an error (or exceeding the
/// configured handler timeout) schedules a retry.
#[async_trait]
pub trait QueueHandler: Send + Sync + 'static {
    async fn handle(&self, message: Value) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> QueueHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, message: Value) -> anyhow::Result<()> {
        (self)(message).await
    }
}
