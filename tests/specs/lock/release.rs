// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Release specs
//!
//! Verify that every granted lock is released exactly once, whatever the
//! critical section does.

use crate::prelude::*;
use tlk_core::LockError;

fn writer(
    lock: &FakeLockClient,
    storage: &FakeStorageAdapter,
) -> CoordinatedWriter<FakeLockClient, FakeStorageAdapter> {
    CoordinatedWriter::new(lock.clone(), storage.clone())
}

#[tokio::test]
async fn successful_write_releases_once() {
    let lock = FakeLockClient::new();
    let storage = FakeStorageAdapter::new();

    let outcome = writer(&lock, &storage)
        .write(write("events", WriteMode::Append, json!([{ "id": 1 }])))
        .await
        .unwrap();

    assert_eq!(outcome.version, Some(0));
    assert_eq!(lock.acquisitions(), 1);
    assert_eq!(lock.releases(), 1);
    assert_eq!(lock.double_releases(), 0);
    assert!(!lock.is_held(&LockKey::new("events")));
}

#[tokio::test]
async fn storage_error_is_returned_after_release() {
    let lock = FakeLockClient::new();
    let storage = FakeStorageAdapter::new();
    storage.fail_next(StorageError::Corrupt("checksum mismatch".to_string()));

    let err = writer(&lock, &storage)
        .write(write("events", WriteMode::Append, json!([{ "id": 1 }])))
        .await
        .unwrap_err();

    assert!(matches!(
        err.operation_error(),
        Some(StorageError::Corrupt(_))
    ));
    assert_eq!(lock.releases(), 1);
    assert!(!lock.is_held(&LockKey::new("events")));
}

#[tokio::test]
async fn panic_in_storage_releases_then_unwinds() {
    let lock = FakeLockClient::new();
    let storage = FakeStorageAdapter::new();
    storage.panic_next("storage exploded");

    let task = {
        let writer = writer(&lock, &storage);
        tokio::spawn(async move {
            writer
                .write(write("events", WriteMode::Append, json!([{ "id": 1 }])))
                .await
        })
    };
    let err = task.await.unwrap_err();

    assert!(err.is_panic());
    assert_eq!(lock.releases(), 1);
    assert!(!lock.is_held(&LockKey::new("events")));
}

#[tokio::test]
async fn maintenance_releases_once_for_both_steps() {
    let lock = FakeLockClient::new();
    let storage = FakeStorageAdapter::new();
    writer(&lock, &storage)
        .write(write("events", WriteMode::Append, json!([{ "id": 1 }])))
        .await
        .unwrap();

    CoordinatedMaintainer::new(lock.clone(), storage.clone())
        .maintain(MaintenanceRequest::new(table("events")))
        .await
        .unwrap();

    assert_eq!(lock.acquisitions(), 2);
    assert_eq!(lock.releases(), 2);
}

#[tokio::test]
async fn failed_release_after_success_is_reported() {
    let lock = FakeLockClient::new();
    let storage = FakeStorageAdapter::new();
    lock.fail_next_release(LockError::Transport("connection reset".to_string()));

    let err = writer(&lock, &storage)
        .write(write("events", WriteMode::Append, json!([{ "id": 1 }])))
        .await
        .unwrap_err();

    assert!(err.work_completed(), "expected Release, got {:?}", err);
    // The write itself committed
    assert_eq!(storage.table(&table("events")).unwrap().version, 0);
}

#[tokio::test]
async fn lock_service_failure_skips_the_operation() {
    let lock = FakeLockClient::new();
    let storage = FakeStorageAdapter::new();
    lock.fail_next_acquire(LockError::Transport("connection refused".to_string()));

    let err = writer(&lock, &storage)
        .write(write("events", WriteMode::Append, json!([{ "id": 1 }])))
        .await
        .unwrap_err();

    assert!(matches!(err, GuardError::Lock(LockError::Transport(_))));
    assert!(storage.calls().is_empty());
    assert_eq!(lock.releases(), 0);
}
