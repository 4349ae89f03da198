//! Lifecycle and persistence tests for on-disk stores

mod common;

use common::{config_for, Flavor};
use std::time::Duration;
use tessera::prelude::*;

async fn reopen_keeps_data_and_versionstamps(flavor: Flavor) {
    let dir = tempfile::tempdir().unwrap();

    let last = {
        let db = TesseraDb::open(config_for(flavor, Some(&dir))).await.unwrap();
        db.set(key!["users", "by_id", "u1"], Value::object([("name", "A")]))
            .await
            .unwrap();
        let last = db.set(key!["users", "by_id", "u2"], "B").await.unwrap();
        db.close().await.unwrap();
        last
    };

    let db = TesseraDb::open(config_for(flavor, Some(&dir))).await.unwrap();
    let found = db.get(key!["users", "by_id", "u1"]).await.unwrap();
    assert_eq!(found.value, Some(Value::object([("name", "A")])));

    let next = db.set(key!["users", "by_id", "u3"], "C").await.unwrap();
    assert!(next > last);
    assert_eq!(db.meta().await.unwrap().entry_count, 3);
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_lmdb_reopen() {
    reopen_keeps_data_and_versionstamps(Flavor::Lmdb).await;
}

#[tokio::test]
async fn test_sqlite_reopen() {
    reopen_keeps_data_and_versionstamps(Flavor::Sqlite).await;
}

#[tokio::test]
async fn test_config_from_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("store.db");
    let config_path = dir.path().join("tessera.json");
    let json = serde_json::json!({
        "backend": { "type": "sqlite", "path": db_path },
        "queue": { "poll_interval_ms": 50 },
        "expiry_sweep_interval_ms": 0
    });
    std::fs::write(&config_path, json.to_string()).unwrap();

    let config = StoreConfig::from_json_file(&config_path).unwrap();
    assert_eq!(config.queue.poll_interval_ms, 50);
    assert_eq!(config.limits.max_key_size, 2048);

    let db = TesseraDb::open(config).await.unwrap();
    assert_eq!(db.meta().await.unwrap().kind, BackendKind::Sqlite);
    db.close().await.unwrap();
    assert!(db_path.exists());
}

#[tokio::test]
async fn test_sweeper_reclaims_expired_entries() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(Flavor::Sqlite, Some(&dir))
        .with_expiry_sweep_interval(Duration::from_millis(20));
    let db = TesseraDb::open(config).await.unwrap();

    db.set_with(key!["session", "s1"], "token", SetOptions::expire_in(Duration::from_millis(10)))
        .await
        .unwrap();
    db.set(key!["session", "s2"], "token").await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(db.get(key!["session", "s1"]).await.unwrap().is_none());
    assert_eq!(db.meta().await.unwrap().entry_count, 1);
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_scoped_store_is_closed_afterwards() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(Flavor::Lmdb, Some(&dir));

    let kept = TesseraDb::scoped(config.clone(), |db| async move {
        db.set(key!["scoped"], 1).await?;
        Ok(db)
    })
    .await
    .unwrap();
    assert!(kept.is_closed());
    assert!(matches!(
        kept.get(key!["scoped"]).await.unwrap_err(),
        TesseraError::Closed
    ));

    let value = TesseraDb::scoped(config, |db| async move {
        Ok(db.get(key!["scoped"]).await?.value)
    })
    .await
    .unwrap();
    assert_eq!(value, Some(Value::Int(1)));
}

#[tokio::test]
async fn test_sqlite_paging_over_legacy_keys() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(Flavor::Sqlite, Some(&dir));
    let sqlite = match &config.backend {
        BackendConfig::Sqlite(cfg) => tessera::SqliteBackend::open(cfg.clone()).unwrap(),
        other => panic!("unexpected backend {:?}", other),
    };
    let db = TesseraDb::with_backend(Arc::new(sqlite.clone()), config);

    db.set(key!["c", 1], 1).await.unwrap();
    db.set(key!["c", 2], 2).await.unwrap();
    db.set(key!["c", "a"], 3).await.unwrap();

    // Rows written by older releases carry comma-joined key text.
    sqlite
        .with_connection(|conn| {
            for (i, text) in [(1i64, "c,1"), (2i64, "c,2")] {
                conn.execute(
                    "UPDATE kv_entries SET key_json = ?1 WHERE sort_key = ?2",
                    rusqlite::params![text, key!["c", i].encode()?],
                )
                .map_err(|e| TesseraError::Other(e.into()))?;
            }
            Ok(())
        })
        .unwrap();

    let selector = ListSelector::prefix(key!["c"]);
    let listed = db
        .list(selector.clone(), ListOptions::new().with_batch_size(1))
        .unwrap()
        .collect()
        .await
        .unwrap();
    let values: Vec<Value> = listed.iter().map(|e| e.value.clone()).collect();
    assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    assert_eq!(listed[0].key, key!["c", "1"]);

    let mut first = db
        .list(selector.clone(), ListOptions::new().with_limit(1))
        .unwrap();
    first.next().await.unwrap();
    let rest = db
        .list(selector, ListOptions::new().with_cursor(first.cursor().unwrap()))
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(rest.len(), 2);
    assert_eq!(rest[0].value, Value::Int(2));

    db.close().await.unwrap();
}
