//! Queue delivery tests: success, retry, dead-lettering and delay.

#[macro_use]
mod common;

use common::{config_for, open, Flavor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tessera::prelude::*;

async fn queue_is_empty(db: &TesseraDb) -> bool {
    db.meta().await.unwrap().entry_count == 0
}

async fn delivers_once_on_success(flavor: Flavor) {
    let store = open(flavor).await;
    let db = store.db.clone();

    let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = received.clone();
    let listener = db
        .listen_queue(move |message: Value| {
            let sink = sink.clone();
            async move {
                sink.lock().push(message);
                anyhow::Ok(())
            }
        })
        .unwrap();

    db.enqueue(Value::object([("job", 1)]), EnqueueOptions::new())
        .await
        .unwrap();

    assert!(
        wait_until!(Duration::from_secs(5), {
            let delivered = received.lock().len();
            delivered == 1 && queue_is_empty(&db).await
        })
    );
    assert_eq!(received.lock()[0], Value::object([("job", 1)]));

    listener.shutdown().await;
    db.close().await.unwrap();
}

async fn retries_then_succeeds(flavor: Flavor) {
    let store = open(flavor).await;
    let db = store.db.clone();

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let listener = db
        .listen_queue(move |_message: Value| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    anyhow::bail!("transient failure");
                }
                anyhow::Ok(())
            }
        })
        .unwrap();

    let options = EnqueueOptions::new()
        .with_backoff_schedule(vec![Duration::from_millis(10), Duration::from_millis(10)])
        .with_keys_if_undelivered(vec![key!["failed", "retry"]]);
    db.enqueue("work", options).await.unwrap();

    assert!(
        wait_until!(
            Duration::from_secs(5),
            attempts.load(Ordering::SeqCst) == 3 && queue_is_empty(&db).await
        )
    );
    assert!(db.get(key!["failed", "retry"]).await.unwrap().is_none());

    listener.shutdown().await;
    db.close().await.unwrap();
}

async fn dead_letters_after_backoff(flavor: Flavor) {
    let store = open(flavor).await;
    let db = store.db.clone();

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let listener = db
        .listen_queue(move |_message: Value| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(anyhow::anyhow!("always fails"))
            }
        })
        .unwrap();

    let options = EnqueueOptions::new()
        .with_backoff_schedule(vec![Duration::from_millis(10), Duration::from_millis(20)])
        .with_keys_if_undelivered(vec![key!["failed", "a"], key!["failed", "b"]]);
    db.enqueue(Value::object([("order", 42)]), options)
        .await
        .unwrap();

    assert!(
        wait_until!(Duration::from_secs(5), {
            let found = db
                .get_many(vec![key!["failed", "a"], key!["failed", "b"]])
                .await
                .unwrap();
            found.iter().all(|e| e.is_some())
        })
    );

    let found = db
        .get_many(vec![key!["failed", "a"], key!["failed", "b"]])
        .await
        .unwrap();
    for entry in found {
        assert_eq!(entry.value, Some(Value::object([("order", 42)])));
    }
    // One initial attempt plus one per backoff step.
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    // Only the two dead-letter entries remain; the queue itself is empty.
    assert_eq!(db.meta().await.unwrap().entry_count, 2);

    listener.shutdown().await;
    db.close().await.unwrap();
}

async fn delay_defers_delivery(flavor: Flavor) {
    let store = open(flavor).await;
    let db = store.db.clone();

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    let listener = db
        .listen_queue(move |_message: Value| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        })
        .unwrap();

    db.enqueue(1, EnqueueOptions::new().with_delay(Duration::from_millis(400)))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(delivered.load(Ordering::SeqCst), 0);

    assert!(
        wait_until!(
            Duration::from_secs(5),
            delivered.load(Ordering::SeqCst) == 1
        )
    );

    listener.shutdown().await;
    db.close().await.unwrap();
}

async fn enqueue_joins_atomic_commit(flavor: Flavor) {
    let store = open(flavor).await;
    let db = store.db.clone();

    db.set(key!["orders", 1], "pending").await.unwrap();

    // The failed check discards the message together with the write.
    let result = db
        .atomic()
        .check(key!["orders", 1], None)
        .set(key!["orders", 1], "placed")
        .enqueue("notify", EnqueueOptions::new())
        .commit()
        .await
        .unwrap();
    assert_eq!(result, CommitResult::Conflict);
    assert_eq!(db.meta().await.unwrap().entry_count, 1);

    let current = db.get(key!["orders", 1]).await.unwrap();
    let result = db
        .atomic()
        .check(key!["orders", 1], current.versionstamp)
        .set(key!["orders", 1], "placed")
        .enqueue("notify", EnqueueOptions::new())
        .commit()
        .await
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(db.meta().await.unwrap().entry_count, 2);

    db.close().await.unwrap();
}

async fn rejects_invalid_options(flavor: Flavor) {
    let store = open(flavor).await;
    let db = store.db.clone();

    let too_long = EnqueueOptions::new().with_delay(Duration::from_secs(31 * 24 * 60 * 60));
    let err = db.enqueue(1, too_long).await.unwrap_err();
    assert!(matches!(err, TesseraError::Validation(_)));

    let reserved = EnqueueOptions::new()
        .with_keys_if_undelivered(vec![key![tessera::queue::QUEUE_NAMESPACE, "x"]]);
    let err = db.enqueue(1, reserved).await.unwrap_err();
    assert!(matches!(err, TesseraError::Validation(_)));

    db.close().await.unwrap();
}

macro_rules! queue_tests {
    ($($scenario:ident),* $(,)?) => {
        mod memory {
            use super::*;
            $(
                #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
                async fn $scenario() {
                    super::$scenario(Flavor::Memory).await;
                }
            )*
        }

        mod lmdb {
            use super::*;
            $(
                #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
                async fn $scenario() {
                    super::$scenario(Flavor::Lmdb).await;
                }
            )*
        }

        mod sqlite {
            use super::*;
            $(
                #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
                async fn $scenario() {
                    super::$scenario(Flavor::Sqlite).await;
                }
            )*
        }
    };
}

queue_tests!(
    delivers_once_on_success,
    retries_then_succeeds,
    dead_letters_after_backoff,
    delay_defers_delivery,
    enqueue_joins_atomic_commit,
    rejects_invalid_options,
);

/// A handler still running when `close` is called gets to settle its
/// message; reopening finds the queue empty.
async fn close_settles_in_flight_delivery(flavor: Flavor) {
    let dir = tempfile::tempdir().unwrap();
    let started = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));

    {
        let db = TesseraDb::open(config_for(flavor, Some(&dir))).await.unwrap();
        let (on_start, on_finish) = (started.clone(), finished.clone());
        let _listener = db
            .listen_queue(move |_message: Value| {
                let (on_start, on_finish) = (on_start.clone(), on_finish.clone());
                async move {
                    on_start.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    on_finish.fetch_add(1, Ordering::SeqCst);
                    anyhow::Ok(())
                }
            })
            .unwrap();

        db.enqueue("slow", EnqueueOptions::new()).await.unwrap();
        assert!(wait_until!(
            Duration::from_secs(5),
            started.load(Ordering::SeqCst) == 1
        ));

        db.close().await.unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    let db = TesseraDb::open(config_for(flavor, Some(&dir))).await.unwrap();
    assert_eq!(db.meta().await.unwrap().entry_count, 0);
    db.close().await.unwrap();
    assert_eq!(started.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lmdb_close_settles_in_flight_delivery() {
    close_settles_in_flight_delivery(Flavor::Lmdb).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_close_settles_in_flight_delivery() {
    close_settles_in_flight_delivery(Flavor::Sqlite).await;
}
