//! Backend conformance suite
//!
//! Every scenario runs unchanged against the memory, LMDB and SQLite
//! backends; they must behave identically.

mod common;

use common::{open, Flavor};
use std::collections::BTreeMap;
use tessera::prelude::*;

async fn ordering_is_backend_independent(db: &TesseraDb) {
    // Inserted out of order, with every part type and mixed lengths.
    let keys = vec![
        key!["k", true],
        key!["k", "b"],
        key!["k", -3],
        key!["k", vec![0u8, 1]],
        key!["k", 7u64],
        key!["k", "a", 1],
        key!["k", 5],
        key!["k", "a"],
        key!["k", false],
        key!["k", ""],
    ];
    for (i, key) in keys.iter().enumerate() {
        db.set(key.clone(), i as i64).await.unwrap();
    }

    let listed: Vec<Key> = db
        .list(ListSelector::prefix(key!["k"]), ListOptions::new().with_batch_size(3))
        .unwrap()
        .collect()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.key)
        .collect();

    let mut expected = keys.clone();
    expected.sort();
    assert_eq!(listed, expected);
    assert_eq!(listed[0], key!["k", 7u64]);
    assert_eq!(listed[9], key!["k", true]);
}

async fn values_round_trip(db: &TesseraDb) {
    let mut nested = BTreeMap::new();
    nested.insert("list".to_string(), Value::Array(vec![Value::Int(1), Value::Float(1.0), Value::Null]));
    nested.insert("$bytes".to_string(), Value::from("not really bytes"));

    let values = vec![
        Value::Null,
        Value::Bool(false),
        Value::Int(-42),
        Value::Int(i64::MAX),
        Value::Float(2.5),
        Value::Float(3.0),
        Value::from("text"),
        Value::Bytes(vec![0, 159, 146, 150]),
        Value::Array(vec![Value::from("a"), Value::Bytes(vec![])]),
        Value::Object(nested.clone()),
        Value::object([("inner", Value::Object(nested))]),
        Value::object([("$bytes", "looks like a tag")]),
    ];

    for (i, value) in values.iter().enumerate() {
        db.set(key!["values", i], value.clone()).await.unwrap();
    }
    for (i, value) in values.iter().enumerate() {
        let found = db.get(key!["values", i]).await.unwrap();
        assert_eq!(found.value.as_ref(), Some(value), "value #{}", i);
    }
}

async fn non_finite_floats_rejected(db: &TesseraDb) {
    let nested = Value::object([("ratio", Value::Array(vec![Value::Float(f64::INFINITY)]))]);
    for value in [Value::Float(f64::NAN), nested] {
        let err = db.set(key!["floats", "bad"], value).await.unwrap_err();
        assert!(matches!(err, TesseraError::Validation(_)), "{:?}", err);
    }

    // The whole operation is refused, including its valid mutations.
    let err = db
        .atomic()
        .set(key!["floats", "good"], 1.5)
        .set(key!["floats", "bad"], f64::NEG_INFINITY)
        .commit()
        .await
        .unwrap_err();
    assert!(matches!(err, TesseraError::Validation(_)));
    assert!(db.get(key!["floats", "good"]).await.unwrap().is_none());
    assert_eq!(db.meta().await.unwrap().versionstamp, Versionstamp::ZERO);
}

async fn failed_check_writes_nothing(db: &TesseraDb) {
    db.set(key!["a"], "existing").await.unwrap();
    let before = db.get(key!["a"]).await.unwrap();

    let result = db
        .atomic()
        .check(key!["a"], None)
        .set(key!["a"], "new")
        .set(key!["b"], "new")
        .commit()
        .await
        .unwrap();

    assert_eq!(result, CommitResult::Conflict);
    assert_eq!(db.get(key!["a"]).await.unwrap(), before);
    assert!(db.get(key!["b"]).await.unwrap().is_none());
}

async fn cursor_resumption(db: &TesseraDb) {
    for i in 0..25 {
        db.set(key!["page", i], i).await.unwrap();
    }

    let selector = ListSelector::prefix(key!["page"]);
    let mut seen = Vec::new();
    let mut cursor: Option<Cursor> = None;
    loop {
        let mut options = ListOptions::new().with_limit(4).with_batch_size(3);
        if let Some(cursor) = cursor.take() {
            // Cursors survive a trip through their text form.
            options = options.with_cursor(cursor.to_string().parse().unwrap());
        }
        let mut iter = db.list(selector.clone(), options).unwrap();
        let mut page = 0;
        while let Some(entry) = iter.next().await.unwrap() {
            seen.push(entry.value.as_i64().unwrap());
            page += 1;
        }
        if page == 0 {
            break;
        }
        cursor = iter.cursor();
    }

    assert_eq!(seen, (0..25).collect::<Vec<i64>>());
}

async fn versionstamps_increase(db: &TesseraDb) {
    let mut last = Versionstamp::ZERO;
    for i in 0..10 {
        let vs = db.set(key!["counter"], i).await.unwrap();
        assert!(vs > last);
        last = vs;
    }
    assert_eq!(db.get(key!["counter"]).await.unwrap().versionstamp, Some(last));
    assert_eq!(last.to_string().len(), 20);
    assert_eq!(db.meta().await.unwrap().versionstamp, last);
}

async fn users_by_id(db: &TesseraDb) {
    db.set(key!["users", "by_id", "u1"], Value::object([("name", "A")]))
        .await
        .unwrap();

    let found = db.get(key!["users", "by_id", "u1"]).await.unwrap();
    assert_eq!(found.value, Some(Value::object([("name", "A")])));
    assert!(found.versionstamp.is_some());
}

async fn concurrent_expect_absent_has_one_winner(db: &TesseraDb) {
    let mut tasks = Vec::new();
    for i in 0..8 {
        let db = db.clone();
        tasks.push(tokio::spawn(async move {
            db.atomic()
                .check(key!["lock"], None)
                .set(key!["lock"], i)
                .commit()
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

async fn concurrent_sums_serialize(db: &TesseraDb) {
    let mut tasks = Vec::new();
    for _ in 0..10 {
        let db = db.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..10 {
                db.atomic().sum(key!["hits"], 1).commit().await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(db.get(key!["hits"]).await.unwrap().value, Some(Value::Int(100)));
}

async fn symbols_are_dropped(db: &TesseraDb) {
    let key = Key::new(vec!["tmp".into(), Symbol::new().into(), "x".into()]);
    db.set(key, 1).await.unwrap();

    let found = db.get(key!["tmp", "x"]).await.unwrap();
    assert_eq!(found.value, Some(Value::Int(1)));
    assert_eq!(found.key, key!["tmp", "x"]);

    let only_symbol = Key::new(vec![Symbol::new().into()]);
    let err = db.set(only_symbol, 1).await.unwrap_err();
    assert!(matches!(err, TesseraError::Validation(_)));
}

async fn delete_is_idempotent(db: &TesseraDb) {
    db.delete(key!["never", "written"]).await.unwrap();
    db.set(key!["gone"], 1).await.unwrap();
    db.delete(key!["gone"]).await.unwrap();
    db.delete(key!["gone"]).await.unwrap();
    assert!(db.get(key!["gone"]).await.unwrap().is_none());
}

async fn entry_count_skips_expired(db: &TesseraDb) {
    db.set(key!["count", "kept"], 1).await.unwrap();
    db.set_with(
        key!["count", "brief"],
        2,
        SetOptions::expire_in(std::time::Duration::from_millis(5)),
    )
    .await
    .unwrap();
    assert_eq!(db.meta().await.unwrap().entry_count, 2);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(db.meta().await.unwrap().entry_count, 1);
}

async fn eventual_reads_see_committed_data(db: &TesseraDb) {
    db.set(key!["ev", 1], "one").await.unwrap();
    let found = db
        .get_with(
            key!["ev", 1],
            ReadOptions {
                consistency: Consistency::Eventual,
            },
        )
        .await
        .unwrap();
    assert_eq!(found.value, Some(Value::from("one")));

    let listed = db
        .list(
            ListSelector::prefix(key!["ev"]),
            ListOptions::new().with_consistency(Consistency::Eventual),
        )
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

macro_rules! conformance {
    ($($scenario:ident),* $(,)?) => {
        mod memory {
            use super::*;
            $(
                #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
                async fn $scenario() {
                    let store = open(Flavor::Memory).await;
                    super::$scenario(&store.db).await;
                    store.db.close().await.unwrap();
                }
            )*
        }

        mod lmdb {
            use super::*;
            $(
                #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
                async fn $scenario() {
                    let store = open(Flavor::Lmdb).await;
                    super::$scenario(&store.db).await;
                    store.db.close().await.unwrap();
                }
            )*
        }

        mod sqlite {
            use super::*;
            $(
                #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
                async fn $scenario() {
                    let store = open(Flavor::Sqlite).await;
                    super::$scenario(&store.db).await;
                    store.db.close().await.unwrap();
                }
            )*
        }
    };
}

conformance!(
    ordering_is_backend_independent,
    values_round_trip,
    non_finite_floats_rejected,
    failed_check_writes_nothing,
    cursor_resumption,
    versionstamps_increase,
    users_by_id,
    concurrent_expect_absent_has_one_winner,
    concurrent_sums_serialize,
    symbols_are_dropped,
    delete_is_idempotent,
    entry_count_skips_expired,
    eventual_reads_see_committed_data,
);
