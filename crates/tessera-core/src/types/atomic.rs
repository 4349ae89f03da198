use super::{Key, Value, Versionstamp};
use crate::error::{Result, TesseraError};

/// Precondition of an atomic write: `key` must currently carry `versionstamp`.
///
/// `None` means the key must be absent (or expired).
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub key: Key,
    pub versionstamp: Option<Versionstamp>,
}

/// What a mutation does to its key.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationKind {
    Set {
        value: Value,
        /// Absolute expiry in milliseconds since the Unix epoch.
        expires_at: Option<i64>,
    },
    Delete,
    /// Add to the current integer; absent counts as zero.
    Sum(i64),
    /// Keep the smaller of the current integer and the operand.
    Min(i64),
    /// Keep the larger of the current integer and the operand.
    Max(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub key: Key,
    pub kind: MutationKind,
}

/// Checks and mutations committed together, all or nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomicWrite {
    pub checks: Vec<Check>,
    pub mutations: Vec<Mutation>,
}

impl AtomicWrite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty() && self.mutations.is_empty()
    }
}

/// Outcome of a commit whose checks were evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitResult {
    Committed { versionstamp: Versionstamp },
    /// A check did not hold; nothing was written.
    Conflict,
}

impl CommitResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, CommitResult::Committed { .. })
    }

    pub fn versionstamp(&self) -> Option<Versionstamp> {
        match self {
            CommitResult::Committed { versionstamp } => Some(*versionstamp),
            CommitResult::Conflict => None,
        }
    }

    /// Turn a conflict into [`TesseraError::Conflict`] for `?`-style callers.
    pub fn into_result(self) -> Result<Versionstamp> {
        match self {
            CommitResult::Committed { versionstamp } => Ok(versionstamp),
            CommitResult::Conflict => Err(TesseraError::Conflict),
        }
    }
}
