//! Commit engine shared by every backend.
//!
//! A backend opens its native write transaction, wraps it in a [`KvTxn`] and
//! hands it to [`apply_atomic_write`]. It commits the native transaction only
//! when the result is [`CommitResult::Committed`]; on `Conflict` or `Err` the
//! transaction is dropped and nothing becomes visible.

use tracing::debug;

use crate::error::{Result, TesseraError};
use crate::traits::KvTxn;
use crate::types::{AtomicWrite, CommitResult, Key, MutationKind, StoredRecord, Value};

/// Evaluate every check, then apply every mutation in order under one new
/// versionstamp.
pub fn apply_atomic_write<T: KvTxn + ?Sized>(
    txn: &mut T,
    write: &AtomicWrite,
    now_ms: i64,
) -> Result<CommitResult> {
    for check in &write.checks {
        let encoded = check.key.encode()?;
        let current = live(txn.get_record(&encoded)?, now_ms).map(|r| r.versionstamp);
        if current != check.versionstamp {
            debug!(
                key = %check.key,
                expected = ?check.versionstamp,
                actual = ?current,
                "Atomic check failed"
            );
            return Ok(CommitResult::Conflict);
        }
    }

    let versionstamp = txn.next_versionstamp()?;

    for mutation in &write.mutations {
        let encoded = mutation.key.encode()?;
        let previous = txn.get_record(&encoded)?;
        match &mutation.kind {
            MutationKind::Set { value, expires_at } => {
                let record = StoredRecord {
                    versionstamp,
                    expires_at: *expires_at,
                    value: value.clone(),
                };
                txn.put_record(&mutation.key, &encoded, &record, previous.as_ref())?;
            }
            MutationKind::Delete => {
                if let Some(previous) = previous {
                    txn.delete_record(&encoded, &previous)?;
                }
            }
            MutationKind::Sum(delta) => {
                let current = current_int(&mutation.key, previous.as_ref(), now_ms)?;
                let next = match current {
                    Some(v) => v.checked_add(*delta).ok_or_else(|| {
                        TesseraError::Validation(format!(
                            "sum overflow at {}: {} + {}",
                            mutation.key, v, delta
                        ))
                    })?,
                    None => *delta,
                };
                put_int(txn, &mutation.key, &encoded, next, versionstamp, previous.as_ref())?;
            }
            MutationKind::Min(operand) => {
                let current = current_int(&mutation.key, previous.as_ref(), now_ms)?;
                let next = current.map_or(*operand, |v| v.min(*operand));
                put_int(txn, &mutation.key, &encoded, next, versionstamp, previous.as_ref())?;
            }
            MutationKind::Max(operand) => {
                let current = current_int(&mutation.key, previous.as_ref(), now_ms)?;
                let next = current.map_or(*operand, |v| v.max(*operand));
                put_int(txn, &mutation.key, &encoded, next, versionstamp, previous.as_ref())?;
            }
        }
    }

    Ok(CommitResult::Committed { versionstamp })
}

fn live(record: Option<StoredRecord>, now_ms: i64) -> Option<StoredRecord> {
    record.filter(|r| r.is_live(now_ms))
}

fn current_int(key: &Key, previous: Option<&StoredRecord>, now_ms: i64) -> Result<Option<i64>> {
    match previous.filter(|r| r.is_live(now_ms)) {
        None => Ok(None),
        Some(record) => match &record.value {
            Value::Int(v) => Ok(Some(*v)),
            other => Err(TesseraError::Validation(format!(
                "cannot apply an integer mutation to {} value at {}",
                other.type_name(),
                key
            ))),
        },
    }
}

fn put_int<T: KvTxn + ?Sized>(
    txn: &mut T,
    key: &Key,
    encoded: &[u8],
    value: i64,
    versionstamp: crate::types::Versionstamp,
    previous: Option<&StoredRecord>,
) -> Result<()> {
    let record = StoredRecord {
        versionstamp,
        expires_at: None,
        value: Value::Int(value),
    };
    txn.put_record(key, encoded, &record, previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key;
    use crate::types::{Check, Mutation, Versionstamp};
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct MapTxn {
        records: BTreeMap<Vec<u8>, StoredRecord>,
        last: u64,
    }

    impl KvTxn for MapTxn {
        fn get_record(&mut self, key: &[u8]) -> Result<Option<StoredRecord>> {
            Ok(self.records.get(key).cloned())
        }

        fn put_record(
            &mut self,
            _key: &Key,
            encoded: &[u8],
            record: &StoredRecord,
            _previous: Option<&StoredRecord>,
        ) -> Result<()> {
            self.records.insert(encoded.to_vec(), record.clone());
            Ok(())
        }

        fn delete_record(&mut self, encoded: &[u8], _previous: &StoredRecord) -> Result<()> {
            self.records.remove(encoded);
            Ok(())
        }

        fn next_versionstamp(&mut self) -> Result<Versionstamp> {
            self.last += 1;
            Ok(Versionstamp::new(self.last))
        }
    }

    fn set(key: Key, value: Value) -> Mutation {
        Mutation {
            key,
            kind: MutationKind::Set {
                value,
                expires_at: None,
            },
        }
    }

    fn value_at(txn: &mut MapTxn, key: &Key) -> Option<Value> {
        txn.get_record(&key.encode().unwrap())
            .unwrap()
            .map(|r| r.value)
    }

    #[test]
    fn test_all_mutations_share_versionstamp() {
        let mut txn = MapTxn::default();
        let write = AtomicWrite {
            checks: vec![],
            mutations: vec![set(key!["a"], Value::Int(1)), set(key!["b"], Value::Int(2))],
        };
        let result = apply_atomic_write(&mut txn, &write, 0).unwrap();
        let vs = result.versionstamp().unwrap();
        for record in txn.records.values() {
            assert_eq!(record.versionstamp, vs);
        }
    }

    #[test]
    fn test_failed_check_allocates_nothing() {
        let mut txn = MapTxn::default();
        let write = AtomicWrite {
            checks: vec![Check {
                key: key!["a"],
                versionstamp: Some(Versionstamp::new(9)),
            }],
            mutations: vec![set(key!["a"], Value::Int(1))],
        };
        assert_eq!(
            apply_atomic_write(&mut txn, &write, 0).unwrap(),
            CommitResult::Conflict
        );
        assert_eq!(txn.last, 0);
        assert!(txn.records.is_empty());
    }

    #[test]
    fn test_expired_entry_satisfies_absent_check() {
        let mut txn = MapTxn::default();
        let write = AtomicWrite {
            checks: vec![],
            mutations: vec![Mutation {
                key: key!["session"],
                kind: MutationKind::Set {
                    value: Value::from("old"),
                    expires_at: Some(100),
                },
            }],
        };
        apply_atomic_write(&mut txn, &write, 0).unwrap();

        let claim = AtomicWrite {
            checks: vec![Check {
                key: key!["session"],
                versionstamp: None,
            }],
            mutations: vec![set(key!["session"], Value::from("new"))],
        };
        assert_eq!(
            apply_atomic_write(&mut txn, &claim, 50).unwrap(),
            CommitResult::Conflict
        );
        assert!(apply_atomic_write(&mut txn, &claim, 100).unwrap().is_ok());
        assert_eq!(value_at(&mut txn, &key!["session"]), Some(Value::from("new")));
    }

    #[test]
    fn test_sum_min_max() {
        let mut txn = MapTxn::default();
        let counter = key!["counter"];
        let ops = [
            MutationKind::Sum(5),
            MutationKind::Sum(-2),
            MutationKind::Max(10),
            MutationKind::Min(4),
        ];
        for kind in ops {
            let write = AtomicWrite {
                checks: vec![],
                mutations: vec![Mutation {
                    key: counter.clone(),
                    kind,
                }],
            };
            apply_atomic_write(&mut txn, &write, 0).unwrap();
        }
        assert_eq!(value_at(&mut txn, &counter), Some(Value::Int(4)));
    }

    #[test]
    fn test_sum_rejects_non_integer_and_overflow() {
        let mut txn = MapTxn::default();
        let write = AtomicWrite {
            checks: vec![],
            mutations: vec![set(key!["name"], Value::from("ada")), set(key!["n"], Value::Int(i64::MAX))],
        };
        apply_atomic_write(&mut txn, &write, 0).unwrap();

        for (key, delta) in [(key!["name"], 1), (key!["n"], 1)] {
            let sum = AtomicWrite {
                checks: vec![],
                mutations: vec![Mutation {
                    key,
                    kind: MutationKind::Sum(delta),
                }],
            };
            let err = apply_atomic_write(&mut txn, &sum, 0).unwrap_err();
            assert!(matches!(err, TesseraError::Validation(_)));
        }
    }

    #[test]
    fn test_mutations_see_earlier_mutations() {
        let mut txn = MapTxn::default();
        let k = key!["k"];
        let write = AtomicWrite {
            checks: vec![],
            mutations: vec![
                set(k.clone(), Value::Int(1)),
                Mutation {
                    key: k.clone(),
                    kind: MutationKind::Sum(1),
                },
                Mutation {
                    key: key!["gone"],
                    kind: MutationKind::Delete,
                },
            ],
        };
        apply_atomic_write(&mut txn, &write, 0).unwrap();
        assert_eq!(value_at(&mut txn, &k), Some(Value::Int(2)));
    }
}
