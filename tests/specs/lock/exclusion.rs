// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutual exclusion specs
//!
//! Verify that critical sections on one key never overlap and that a
//! non-blocking acquire of a held key reports contention.

use crate::prelude::*;

const WRITERS: usize = 8;

/// Run `WRITERS` concurrent blocking writes through `lock` and return the
/// fake storage they wrote to
async fn race_writers<L: LockClient>(lock: L) -> FakeStorageAdapter {
    let storage = FakeStorageAdapter::new();
    storage.set_delay(Duration::from_millis(10));
    let writer = Arc::new(CoordinatedWriter::new(lock, storage.clone()));

    let tasks: Vec<_> = (0..WRITERS)
        .map(|i| {
            let writer = writer.clone();
            tokio::spawn(async move {
                writer
                    .write(write("events", WriteMode::Append, json!([{ "id": i }])))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    storage
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_lock_serializes_critical_sections() {
    let lock = MemoryLockClient::new().with_poll_interval(Duration::from_millis(5));
    let storage = race_writers(lock).await;

    assert_eq!(storage.max_in_flight(), 1);
    assert_eq!(storage.calls().len(), WRITERS);
    assert_eq!(storage.table(&table("events")).unwrap().rows.len(), WRITERS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_lock_serializes_critical_sections() {
    let store = Store::new();
    // Separate clients share nothing in memory, only the lock directory
    let lock = FileLockClient::new(store.lock_dir())
        .unwrap()
        .with_poll_interval(Duration::from_millis(5));

    let storage = race_writers(lock).await;

    assert_eq!(storage.max_in_flight(), 1);
    assert_eq!(storage.table(&table("events")).unwrap().rows.len(), WRITERS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_lock_clients_on_one_directory_exclude_each_other() {
    let store = Store::new();
    let storage = FakeStorageAdapter::new();
    storage.set_delay(Duration::from_millis(10));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let lock = FileLockClient::new(store.lock_dir())
                .unwrap()
                .with_poll_interval(Duration::from_millis(5));
            let writer = CoordinatedWriter::new(lock, storage.clone());
            tokio::spawn(async move {
                writer
                    .write(write("events", WriteMode::Append, json!([{ "id": i }])))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(storage.max_in_flight(), 1);
}

#[tokio::test]
async fn different_tables_run_concurrently() {
    let storage = FakeStorageAdapter::new();
    storage.set_delay(Duration::from_millis(50));
    let writer = CoordinatedWriter::new(MemoryLockClient::new(), storage.clone());

    let (a, b) = tokio::join!(
        writer.write(write("a", WriteMode::Append, json!([{ "id": 1 }]))),
        writer.write(write("b", WriteMode::Append, json!([{ "id": 2 }]))),
    );

    a.unwrap();
    b.unwrap();
    assert_eq!(storage.max_in_flight(), 2);
}

#[tokio::test]
async fn non_blocking_acquire_of_held_key_is_unavailable() {
    let lock = MemoryLockClient::new();
    let storage = FakeStorageAdapter::new();
    let writer = CoordinatedWriter::new(lock.clone(), storage.clone())
        .with_acquire_mode(AcquireMode::NonBlocking);

    let held = lock
        .acquire(&LockKey::for_table(&table("events")), AcquireMode::Blocking)
        .await
        .unwrap()
        .unwrap();

    let err = writer
        .write(write("events", WriteMode::Append, json!([{ "id": 1 }])))
        .await
        .unwrap_err();

    assert!(err.is_unavailable(), "expected Unavailable, got {:?}", err);
    assert!(matches!(&err, GuardError::Unavailable(key) if key.as_str() == "events"));
    assert!(storage.calls().is_empty(), "operation must not run");

    lock.release(held).await.unwrap();
    writer
        .write(write("events", WriteMode::Append, json!([{ "id": 1 }])))
        .await
        .unwrap();
}

#[tokio::test]
async fn non_blocking_acquire_with_file_lock_is_unavailable() {
    let store = Store::new();
    let holder = FileLockClient::new(store.lock_dir()).unwrap();
    let contender = FileLockClient::new(store.lock_dir()).unwrap();
    let storage = FakeStorageAdapter::new();

    let _held = holder
        .acquire(&LockKey::for_table(&table("events")), AcquireMode::Blocking)
        .await
        .unwrap()
        .unwrap();

    let err = CoordinatedMaintainer::new(contender, storage.clone())
        .with_acquire_mode(AcquireMode::NonBlocking)
        .maintain(MaintenanceRequest::new(table("events")))
        .await
        .unwrap_err();

    assert!(err.is_unavailable());
    assert!(storage.calls().is_empty());
}
