//! Queue listener configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, TesseraError};

/// Configuration for queue delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// How often the listener polls for due items when nothing wakes it earlier.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How long a claimed item stays invisible to other consumers.
    ///
    /// An item whose handler neither succeeds nor fails within the lease
    /// becomes due again.
    #[serde(default = "default_lease")]
    pub lease_ms: u64,

    /// Maximum time a single handler invocation may run.
    #[serde(default = "default_handler_timeout")]
    pub handler_timeout_ms: u64,

    /// Maximum number of handler invocations in flight.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Maximum number of due items fetched per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_poll_interval() -> u64 {
    250
}

fn default_lease() -> u64 {
    60_000
}

fn default_handler_timeout() -> u64 {
    30_000
}

fn default_max_concurrent() -> usize {
    10
}

fn default_batch_size() -> usize {
    32
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            lease_ms: default_lease(),
            handler_timeout_ms: default_handler_timeout(),
            max_concurrent: default_max_concurrent(),
            batch_size: default_batch_size(),
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease_ms = lease.as_millis() as u64;
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lease_ms <= self.handler_timeout_ms {
            return Err(TesseraError::Config(format!(
                "queue lease ({}ms) must exceed the handler timeout ({}ms)",
                self.lease_ms, self.handler_timeout_ms
            )));
        }
        if self.max_concurrent == 0 || self.batch_size == 0 {
            return Err(TesseraError::Config(
                "queue max_concurrent and batch_size must be positive".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(TesseraError::Config(
                "queue poll interval must be positive".into(),
            ));
        }
        Ok(())
    }
}
