//! Stress tests for caplog-store
//!
//! These tests exercise the in-memory backend under concurrent appends and tailing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use caplog_store::{
    BoundedLogOptions, EntryId, LogHandle, LogStore, Lookup, MemoryLogStore, NewEntry, TailOptions,
};
use rand::Rng;
use serde_json::json;

async fn test_log(options: BoundedLogOptions) -> (Arc<MemoryLogStore>, Arc<dyn LogHandle>) {
    let store = Arc::new(MemoryLogStore::new());
    let log = store.create_bounded_log("stress", &options).await.unwrap();
    (store, log)
}

#[tokio::test]
async fn test_append_throughput() {
    let (_store, log) = test_log(BoundedLogOptions::default()).await;

    let count = 10_000;
    let start = Instant::now();
    for i in 0..count {
        log.append(NewEntry::new("tick", json!(i))).await.unwrap();
    }
    let elapsed = start.elapsed();
    let per_sec = count as f64 / elapsed.as_secs_f64();

    println!("✓ Appended {} entries in {:?}", count, elapsed);
    println!("  Throughput: {:.2} entries/sec", per_sec);

    assert!(per_sec > 1_000.0, "Append throughput too low: {:.2}/sec", per_sec);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appenders_with_tailing_reader() {
    let (_store, log) = test_log(BoundedLogOptions::default()).await;
    let anchor = log.append(NewEntry::sentinel()).await.unwrap();
    let cursor = log
        .open_tail_cursor(anchor.id, &TailOptions::awaiting(Duration::from_millis(10)))
        .await
        .unwrap();

    let writers = 4;
    let per_writer = 250;
    let total = writers * per_writer;

    let reader = tokio::spawn(async move {
        let mut seen = Vec::with_capacity(total);
        while seen.len() < total {
            match cursor.next().await.unwrap() {
                Some(entry) => seen.push(entry),
                None => break,
            }
        }
        seen
    });

    let mut handles = Vec::new();
    for w in 0..writers {
        let log = log.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..per_writer {
                log.append(NewEntry::new(format!("writer-{w}"), json!(i)))
                    .await
                    .unwrap();
                if rand::rng().random_bool(0.1) {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let seen = tokio::time::timeout(Duration::from_secs(10), reader)
        .await
        .expect("reader timed out")
        .unwrap();

    assert_eq!(seen.len(), total);
    assert!(seen.windows(2).all(|w| w[0].id < w[1].id), "ids out of order");

    // Each writer's own sequence is preserved
    for w in 0..writers {
        let name = format!("writer-{w}");
        let values: Vec<_> = seen
            .iter()
            .filter(|e| e.event.as_deref() == Some(name.as_str()))
            .map(|e| e.message.as_u64().unwrap())
            .collect();
        assert_eq!(values, (0..per_writer as u64).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_eviction_under_load_keeps_caps() {
    let (store, log) = test_log(BoundedLogOptions::with_size_bytes(4096).max_count(Some(100))).await;

    let mut last = EntryId::ZERO;
    for i in 0..5_000 {
        last = log
            .append(NewEntry::new("load", json!({ "i": i, "body": "x".repeat(i % 50) })))
            .await
            .unwrap()
            .id;
    }

    let memory = store.log("stress").unwrap();
    assert!(memory.len() <= 100);
    assert!(memory.total_bytes() <= 4096);

    let latest = log.find_one(Lookup::Latest).await.unwrap().unwrap();
    assert_eq!(latest.id, last);
    assert!(log.find_one(Lookup::Id(EntryId(1))).await.unwrap().is_none());
}
