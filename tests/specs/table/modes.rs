// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write mode specs
//!
//! Verify append, overwrite, error and ignore writes through the lock-guarded
//! writer against the local table store.

use crate::prelude::*;

fn writer(store: &Store) -> CoordinatedWriter<MemoryLockClient, LocalTableStore> {
    CoordinatedWriter::new(MemoryLockClient::new(), store.adapter())
}

#[tokio::test]
async fn overwrite_twice_keeps_only_the_second_payload() {
    let store = Store::new();
    let writer = writer(&store);

    writer
        .write(write("events", WriteMode::Overwrite, json!([{ "id": 1 }, { "id": 2 }])))
        .await
        .unwrap();
    writer
        .write(write("events", WriteMode::Overwrite, json!([{ "id": 3 }, { "id": 4 }])))
        .await
        .unwrap();

    similar_asserts::assert_eq!(
        store.table("events").scan().unwrap(),
        rows(json!([{ "id": 3 }, { "id": 4 }]))
    );
}

#[tokio::test]
async fn append_a_then_b_is_the_union_in_two_files() {
    let store = Store::new();
    let writer = writer(&store);

    writer
        .write(write("events", WriteMode::Append, json!([{ "id": 1 }])))
        .await
        .unwrap();
    writer
        .write(write("events", WriteMode::Append, json!([{ "id": 2 }])))
        .await
        .unwrap();

    let table = store.table("events");
    similar_asserts::assert_eq!(ids(&table), vec![1, 2]);
    assert_eq!(table.data_file_count().unwrap(), 2);
    assert_eq!(table.version().unwrap(), 1);
}

#[tokio::test]
async fn error_mode_refuses_an_existing_table() {
    let store = Store::new();
    let writer = writer(&store);
    writer
        .write(write("events", WriteMode::Error, json!([{ "id": 1 }])))
        .await
        .unwrap();

    let err = writer
        .write(write("events", WriteMode::Error, json!([{ "id": 2 }])))
        .await
        .unwrap_err();

    assert!(matches!(
        err.operation_error(),
        Some(StorageError::TableAlreadyExists(_))
    ));
    similar_asserts::assert_eq!(ids(&store.table("events")), vec![1]);
}

#[tokio::test]
async fn ignore_mode_is_distinguishable_from_empty_write() {
    let store = Store::new();
    let writer = writer(&store);
    writer
        .write(write("events", WriteMode::Append, json!([{ "id": 1 }])))
        .await
        .unwrap();

    let ignored = writer
        .write(write("events", WriteMode::Ignore, json!([{ "id": 2 }])))
        .await
        .unwrap();
    let empty = writer
        .write(write("events", WriteMode::Append, json!([])))
        .await
        .unwrap();

    assert!(ignored.is_skipped());
    assert_eq!(empty.version, Some(1));
    assert_eq!(empty.rows_written, 0);
    similar_asserts::assert_eq!(ids(&store.table("events")), vec![1]);
}

#[tokio::test]
async fn schema_mismatch_is_an_operation_error() {
    let store = Store::new();
    let writer = writer(&store);
    writer
        .write(write("events", WriteMode::Append, json!([{ "id": 1 }])))
        .await
        .unwrap();

    let err = writer
        .write(write("events", WriteMode::Append, json!([{ "id": "one" }])))
        .await
        .unwrap_err();

    assert!(matches!(
        err.into_operation_error(),
        Some(StorageError::SchemaMismatch { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_blocking_writes_both_succeed() {
    let store = Store::new();
    let lock = MemoryLockClient::new();
    let first = CoordinatedWriter::new(lock.clone(), store.adapter());
    let second = CoordinatedWriter::new(lock, store.adapter());

    let a = tokio::spawn(async move {
        first
            .write(write("events", WriteMode::Append, json!([{ "id": 1 }])))
            .await
    });
    let b = tokio::spawn(async move {
        second
            .write(write("events", WriteMode::Append, json!([{ "id": 2 }])))
            .await
    });

    let mut versions = vec![
        a.await.unwrap().unwrap().version.unwrap(),
        b.await.unwrap().unwrap().version.unwrap(),
    ];
    versions.sort();

    assert_eq!(versions, vec![0, 1]);
    similar_asserts::assert_eq!(ids(&store.table("events")), vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writes_through_file_locks_all_commit() {
    let store = Store::new();
    let tasks: Vec<_> = (0..6)
        .map(|i| {
            let lock = FileLockClient::new(store.lock_dir())
                .unwrap()
                .with_poll_interval(Duration::from_millis(5));
            let writer = CoordinatedWriter::new(lock, store.adapter());
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

    let table = store.table("events");
    similar_asserts::assert_eq!(ids(&table), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(table.version().unwrap(), 5);
}

#[tokio::test]
async fn zero_row_first_write_does_not_lock_out_later_appends() {
    let store = Store::new();
    let writer = writer(&store);

    let empty = writer
        .write(write("events", WriteMode::Append, json!([])))
        .await
        .unwrap();
    writer
        .write(write("events", WriteMode::Append, json!([{ "id": 1 }])))
        .await
        .unwrap();
    writer
        .write(write("events", WriteMode::Append, json!([{ "id": 2 }])))
        .await
        .unwrap();

    assert_eq!(empty.version, Some(0));
    similar_asserts::assert_eq!(ids(&store.table("events")), vec![1, 2]);
}
