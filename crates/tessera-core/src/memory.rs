//! In-memory backend.
//!
//! Entries live in a [`BTreeMap`] keyed by encoded key bytes, so range scans
//! come out in the same order as on disk-backed stores. A single
//! [`parking_lot::RwLock`] serializes commits; readers never observe a
//! partially applied commit because mutations are staged and only published
//! once the whole write succeeded.
//!
//! Data is not persisted; it is lost when the process exits.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clock::now_millis;
use crate::engine::apply_atomic_write;
use crate::error::{Result, TesseraError};
use crate::traits::{Backend, KvTxn};
use crate::types::{
    AtomicWrite, BackendKind, BackendMeta, CommitResult, Consistency, Entry, Key, ScanRequest,
    ScannedEntry, StoredRecord, Versionstamp,
};

#[derive(Default)]
struct MemoryState {
    entries: BTreeMap<Vec<u8>, (Key, StoredRecord)>,
    versionstamp: Versionstamp,
    closed: bool,
}

impl MemoryState {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(TesseraError::Closed)
        } else {
            Ok(())
        }
    }
}

/// In-memory storage backend.
///
/// Cheaply cloneable; all clones share the same data.
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
    created_at: String,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Staging area over a locked state; published by the caller on success.
struct MemoryTxn<'a> {
    state: &'a MemoryState,
    staged: BTreeMap<Vec<u8>, Option<(Key, StoredRecord)>>,
    versionstamp: Option<Versionstamp>,
}

impl KvTxn for MemoryTxn<'_> {
    fn get_record(&mut self, key: &[u8]) -> Result<Option<StoredRecord>> {
        if let Some(staged) = self.staged.get(key) {
            return Ok(staged.as_ref().map(|(_, r)| r.clone()));
        }
        Ok(self.state.entries.get(key).map(|(_, r)| r.clone()))
    }

    fn put_record(
        &mut self,
        key: &Key,
        encoded: &[u8],
        record: &StoredRecord,
        _previous: Option<&StoredRecord>,
    ) -> Result<()> {
        self.staged.insert(
            encoded.to_vec(),
            Some((key.persistable(), record.clone())),
        );
        Ok(())
    }

    fn delete_record(&mut self, encoded: &[u8], _previous: &StoredRecord) -> Result<()> {
        self.staged.insert(encoded.to_vec(), None);
        Ok(())
    }

    fn next_versionstamp(&mut self) -> Result<Versionstamp> {
        let next = self.state.versionstamp.next()?;
        self.versionstamp = Some(next);
        Ok(next)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn get_many(&self, keys: &[Key], _consistency: Consistency) -> Result<Vec<Option<Entry>>> {
        let state = self.state.read();
        state.ensure_open()?;
        let now = now_millis();
        keys.iter()
            .map(|key| {
                let encoded = key.encode()?;
                Ok(state
                    .entries
                    .get(&encoded)
                    .filter(|(_, record)| record.is_live(now))
                    .map(|(stored_key, record)| record.clone().into_entry(stored_key.clone())))
            })
            .collect()
    }

    async fn scan(&self, request: ScanRequest) -> Result<Vec<ScannedEntry>> {
        let state = self.state.read();
        state.ensure_open()?;
        if request.range.is_empty() || request.limit == 0 {
            return Ok(Vec::new());
        }
        let now = now_millis();
        let range = state
            .entries
            .range((request.range.start.clone(), request.range.end.clone()));
        let live = |(encoded, (key, record)): (&Vec<u8>, &(Key, StoredRecord))| {
            record.is_live(now).then(|| ScannedEntry {
                position: encoded.clone(),
                entry: record.clone().into_entry(key.clone()),
            })
        };
        let entries = if request.reverse {
            range.rev().filter_map(live).take(request.limit).collect()
        } else {
            range.filter_map(live).take(request.limit).collect()
        };
        Ok(entries)
    }

    async fn commit(&self, write: AtomicWrite) -> Result<CommitResult> {
        let mut state = self.state.write();
        state.ensure_open()?;

        let mut txn = MemoryTxn {
            state: &*state,
            staged: BTreeMap::new(),
            versionstamp: None,
        };
        let result = apply_atomic_write(&mut txn, &write, now_millis())?;
        let MemoryTxn {
            staged,
            versionstamp,
            ..
        } = txn;

        if let CommitResult::Committed { .. } = result {
            for (encoded, change) in staged {
                match change {
                    Some(entry) => {
                        state.entries.insert(encoded, entry);
                    }
                    None => {
                        state.entries.remove(&encoded);
                    }
                }
            }
            if let Some(versionstamp) = versionstamp {
                state.versionstamp = versionstamp;
            }
        }
        Ok(result)
    }

    async fn purge_expired(&self, now_ms: i64) -> Result<usize> {
        let mut state = self.state.write();
        state.ensure_open()?;
        let before = state.entries.len();
        state.entries.retain(|_, (_, record)| record.is_live(now_ms));
        Ok(before - state.entries.len())
    }

    async fn meta(&self) -> Result<BackendMeta> {
        let state = self.state.read();
        state.ensure_open()?;
        let now = now_millis();
        let entry_count = state
            .entries
            .values()
            .filter(|(_, record)| record.is_live(now))
            .count();
        Ok(BackendMeta {
            kind: BackendKind::Memory,
            versionstamp: state.versionstamp,
            entry_count: entry_count as u64,
            schema_version: 1,
            created_at: Some(self.created_at.clone()),
        })
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.write();
        state.closed = true;
        state.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key;
    use crate::types::{Check, ListSelector, Mutation, MutationKind, Value};

    fn set(key: Key, value: impl Into<Value>) -> AtomicWrite {
        AtomicWrite {
            checks: vec![],
            mutations: vec![Mutation {
                key,
                kind: MutationKind::Set {
                    value: value.into(),
                    expires_at: None,
                },
            }],
        }
    }

    fn scan_all(selector: ListSelector, reverse: bool) -> ScanRequest {
        ScanRequest {
            range: selector.to_range().unwrap(),
            limit: 100,
            reverse,
            consistency: Consistency::Strong,
        }
    }

    #[tokio::test]
    async fn test_commit_and_read() {
        let backend = MemoryBackend::new();
        let result = backend.commit(set(key!["a"], 1)).await.unwrap();
        let entries = backend.get_many(&[key!["a"], key!["b"]], Consistency::Strong).await.unwrap();
        assert_eq!(entries[0].as_ref().unwrap().versionstamp, result.versionstamp().unwrap());
        assert!(entries[1].is_none());
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_trace() {
        let backend = MemoryBackend::new();
        backend.commit(set(key!["name"], "ada")).await.unwrap();

        let write = AtomicWrite {
            checks: vec![],
            mutations: vec![
                Mutation {
                    key: key!["other"],
                    kind: MutationKind::Set {
                        value: Value::Int(1),
                        expires_at: None,
                    },
                },
                Mutation {
                    key: key!["name"],
                    kind: MutationKind::Sum(1),
                },
            ],
        };
        assert!(backend.commit(write).await.is_err());
        let other = backend.get_many(&[key!["other"]], Consistency::Strong).await.unwrap();
        assert!(other[0].is_none());
        assert_eq!(backend.meta().await.unwrap().versionstamp, Versionstamp::new(1));
    }

    #[tokio::test]
    async fn test_conflict_does_not_advance_versionstamp() {
        let backend = MemoryBackend::new();
        backend.commit(set(key!["a"], 1)).await.unwrap();
        let mut write = set(key!["a"], 2);
        write.checks.push(Check {
            key: key!["a"],
            versionstamp: None,
        });
        assert_eq!(backend.commit(write).await.unwrap(), CommitResult::Conflict);
        assert_eq!(backend.meta().await.unwrap().versionstamp, Versionstamp::new(1));
    }

    #[tokio::test]
    async fn test_scan_order_and_reverse() {
        let backend = MemoryBackend::new();
        for k in [key!["k", "b"], key!["k", 2], key!["k", true], key!["k", "a"]] {
            backend.commit(set(k, Value::Null)).await.unwrap();
        }
        let forward: Vec<Key> = backend
            .scan(scan_all(ListSelector::prefix(key!["k"]), false))
            .await
            .unwrap()
            .into_iter()
            .map(|hit| hit.entry.key)
            .collect();
        assert_eq!(
            forward,
            vec![key!["k", 2], key!["k", "a"], key!["k", "b"], key!["k", true]]
        );

        let mut backward: Vec<Key> = backend
            .scan(scan_all(ListSelector::prefix(key!["k"]), true))
            .await
            .unwrap()
            .into_iter()
            .map(|hit| hit.entry.key)
            .collect();
        backward.reverse();
        assert_eq!(backward, forward);
    }

    #[tokio::test]
    async fn test_expired_entries_hidden_then_purged() {
        let backend = MemoryBackend::new();
        let write = AtomicWrite {
            checks: vec![],
            mutations: vec![Mutation {
                key: key!["tmp"],
                kind: MutationKind::Set {
                    value: Value::Int(1),
                    expires_at: Some(now_millis() - 1),
                },
            }],
        };
        backend.commit(write).await.unwrap();
        assert!(backend.get_many(&[key!["tmp"]], Consistency::Strong).await.unwrap()[0].is_none());
        assert_eq!(backend.meta().await.unwrap().entry_count, 0);
        assert_eq!(backend.purge_expired(now_millis()).await.unwrap(), 1);
        assert_eq!(backend.purge_expired(now_millis()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_backend_rejects_calls() {
        let backend = MemoryBackend::new();
        backend.close().await.unwrap();
        let err = backend.commit(set(key!["a"], 1)).await.unwrap_err();
        assert!(matches!(err, TesseraError::Closed));
    }
}
