//! Atomic operation builder
//!
//! `AtomicOperation` collects versionstamp checks and mutations, then
//! submits them to the backend as one all-or-nothing commit.
//!
//! # Example
//!
//! ```ignore
//! use tessera::prelude::*;
//!
//! let current = db.get(key!["users", "u1"]).await?;
//! let result = db
//!     .atomic()
//!     .check(key!["users", "u1"], current.versionstamp)
//!     .set(key!["users", "u1"], "renamed")
//!     .sum(key!["stats", "renames"], 1)
//!     .commit()
//!     .await?;
//! if !result.is_ok() {
//!     // somebody else wrote users/u1 first; re-read and retry
//! }
//! ```

use tessera_core::{
    AtomicWrite, Check, CommitResult, Key, Mutation, MutationKind, Result, TesseraError, Value,
    Versionstamp,
};

use crate::db::{SetOptions, TesseraDb};
use crate::queue::{EnqueueOptions, QueueMessage};

/// A single-use draft of checks and mutations.
///
/// Arguments are validated as they are added; the first invalid one is
/// reported by [`commit`](Self::commit) and nothing is sent to the backend.
/// Dropping the draft without committing writes nothing.
pub struct AtomicOperation {
    db: TesseraDb,
    write: AtomicWrite,
    enqueued: bool,
    error: Option<TesseraError>,
}

impl AtomicOperation {
    pub(crate) fn new(db: TesseraDb) -> Self {
        Self {
            db,
            write: AtomicWrite::new(),
            enqueued: false,
            error: None,
        }
    }

    fn fail(&mut self, err: TesseraError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn push(mut self, key: Key, kind: MutationKind) -> Self {
        let valid = self.db.validate_key(&key).and_then(|_| match &kind {
            MutationKind::Set { value, .. } => self.db.validate_value(value),
            _ => Ok(()),
        });
        match valid {
            Ok(()) => self.write.mutations.push(Mutation { key, kind }),
            Err(err) => self.fail(err),
        }
        self
    }

    /// Require `key` to currently carry `versionstamp` (`None`: be absent).
    pub fn check(mut self, key: impl Into<Key>, versionstamp: Option<Versionstamp>) -> Self {
        let key = key.into();
        match self.db.validate_key(&key) {
            Ok(()) => self.write.checks.push(Check { key, versionstamp }),
            Err(err) => self.fail(err),
        }
        self
    }

    pub fn set(self, key: impl Into<Key>, value: impl Into<Value>) -> Self {
        self.set_with(key, value, SetOptions::default())
    }

    pub fn set_with(self, key: impl Into<Key>, value: impl Into<Value>, options: SetOptions) -> Self {
        let kind = MutationKind::Set {
            value: value.into(),
            expires_at: options.expires_at(),
        };
        self.push(key.into(), kind)
    }

    pub fn delete(self, key: impl Into<Key>) -> Self {
        self.push(key.into(), MutationKind::Delete)
    }

    /// Add `delta` to the integer at `key` (absent counts as zero).
    pub fn sum(self, key: impl Into<Key>, delta: i64) -> Self {
        self.push(key.into(), MutationKind::Sum(delta))
    }

    pub fn min(self, key: impl Into<Key>, operand: i64) -> Self {
        self.push(key.into(), MutationKind::Min(operand))
    }

    pub fn max(self, key: impl Into<Key>, operand: i64) -> Self {
        self.push(key.into(), MutationKind::Max(operand))
    }

    /// Enqueue a message as part of this commit.
    pub fn enqueue(mut self, value: impl Into<Value>, options: EnqueueOptions) -> Self {
        let staged = self.stage_enqueue(value.into(), options);
        match staged {
            Ok(mutation) => {
                self.write.mutations.push(mutation);
                self.enqueued = true;
            }
            Err(err) => self.fail(err),
        }
        self
    }

    fn stage_enqueue(&self, payload: Value, options: EnqueueOptions) -> Result<Mutation> {
        options.validate()?;
        for key in &options.keys_if_undelivered {
            self.db.validate_key(key)?;
        }
        self.db.validate_value(&payload)?;

        let message = QueueMessage::new(payload, &options)?;
        let key = message.key_at(options.ready_at());
        self.db.validate_internal_key(&key)?;
        Ok(Mutation {
            key,
            kind: MutationKind::Set {
                value: message.to_value(),
                expires_at: None,
            },
        })
    }

    pub fn len(&self) -> usize {
        self.write.checks.len() + self.write.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.write.is_empty()
    }

    /// Submit the draft.
    ///
    /// A failed check is reported as [`CommitResult::Conflict`], not as an
    /// error. Use [`CommitResult::into_result`] to turn it into one.
    pub async fn commit(self) -> Result<CommitResult> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.db.commit_write(self.write, self.enqueued).await
    }
}
