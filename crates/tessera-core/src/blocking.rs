//! Bridges from async callers to the synchronous storage engines.

use crate::error::{Result, TesseraError};

/// Run a blocking read or maintenance operation off the async scheduler.
pub async fn run_blocking<F, R>(op: &'static str, f: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TesseraError::Connectivity(format!("{} task failed: {}", op, e)))?
}

/// Run a blocking commit.
///
/// Once the closure has been handed to the blocking pool its native commit
/// may already have happened, so a lost task is reported as ambiguous rather
/// than as a connectivity failure.
pub async fn run_blocking_commit<F, R>(f: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TesseraError::AmbiguousCommit(format!("commit task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_errors_are_classified() {
        let ok = run_blocking("read", || Ok(7)).await.unwrap();
        assert_eq!(ok, 7);

        let inner: Result<()> = run_blocking("read", || Err(TesseraError::Encoding("x".into()))).await;
        assert!(matches!(inner, Err(TesseraError::Encoding(_))));

        let lost: Result<()> = run_blocking_commit(|| panic!("boom")).await;
        assert!(matches!(lost, Err(TesseraError::AmbiguousCommit(_))));
    }
}
