use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    AtomicWrite, BackendKind, BackendMeta, CommitResult, Consistency, Entry, Key, ScanRequest,
    ScannedEntry,
};

/// Storage engine behind a store handle.
///
/// Every implementation honours the same logical contract: identical key
/// order, all-or-nothing commits through [`crate::engine::apply_atomic_write`],
/// and expired entries reading as absent.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    fn kind(&self) -> BackendKind;

    /// Point reads, positionally aligned with `keys`. Keys are already validated.
    async fn get_many(&self, keys: &[Key], consistency: Consistency) -> Result<Vec<Option<Entry>>>;

    /// Live entries within the request's range, in key order (or reversed),
    /// at most `limit` of them, each with the encoded key it is stored under.
    async fn scan(&self, request: ScanRequest) -> Result<Vec<ScannedEntry>>;

    /// Evaluate checks and apply mutations atomically.
    async fn commit(&self, write: AtomicWrite) -> Result<CommitResult>;

    /// Physically remove entries that expired at or before `now_ms`.
    async fn purge_expired(&self, now_ms: i64) -> Result<usize>;

    async fn meta(&self) -> Result<BackendMeta>;

    /// Release backend resources. Further calls fail.
    async fn close(&self) -> Result<()>;
}
