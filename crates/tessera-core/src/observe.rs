//! Optional metrics instrumentation for Tessera.
//!
//! When the `observe` feature is enabled, key operations emit counters and
//! histograms via the [`metrics`] crate. A downstream application must install
//! a metrics recorder (e.g. `metrics-exporter-prometheus`) to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record an atomic commit (counter + latency histogram).
///
/// - `tessera.commit.total` – counter with `backend` and `outcome` labels
///   (`committed` / `conflict` / `error`)
/// - `tessera.commit.duration_seconds` – histogram of commit latency
#[inline]
pub fn record_commit(backend: &'static str, outcome: &'static str, duration: std::time::Duration) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tessera.commit.total", "backend" => backend, "outcome" => outcome)
            .increment(1);
        metrics::histogram!("tessera.commit.duration_seconds", "backend" => backend)
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (backend, outcome, duration);
    }
}

/// Record one batch fetched by a list iterator.
///
/// - `tessera.list.batches_total` – counter
/// - `tessera.list.entries_total` – counter of entries returned
#[inline]
pub fn record_list_batch(entries: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tessera.list.batches_total").increment(1);
        metrics::counter!("tessera.list.entries_total").increment(entries as u64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = entries;
    }
}

/// Record the outcome of one queue delivery.
///
/// - `tessera.queue.deliveries_total` – counter with `outcome` label
///   (`ok` / `retry` / `dead_letter` / `lease_lost`)
#[inline]
pub fn record_queue_delivery(outcome: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tessera.queue.deliveries_total", "outcome" => outcome).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = outcome;
    }
}

/// Record an expiry sweep.
///
/// - `tessera.expiry.purged_total` – counter of removed entries
#[inline]
pub fn record_expiry_sweep(purged: usize) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("tessera.expiry.purged_total").increment(purged as u64);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = purged;
    }
}
