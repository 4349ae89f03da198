//! Background removal of expired entries
//!
//! Reads already treat expired entries as absent; the sweeper only reclaims
//! their storage.

use std::sync::Arc;
use std::time::Duration;
use tessera_core::{clock::now_millis, observe, Backend, TesseraError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

pub(crate) fn spawn_expiry_sweeper(
    backend: Arc<dyn Backend>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match backend.purge_expired(now_millis()).await {
                        Ok(purged) => {
                            observe::record_expiry_sweep(purged);
                            if purged > 0 {
                                debug!(purged, "Expiry sweep removed entries");
                            }
                        }
                        Err(TesseraError::Closed) => break,
                        Err(e) => error!(error = %e, "Expiry sweep failed"),
                    }
                }
            }
        }

        debug!("Expiry sweeper stopped");
    })
}
