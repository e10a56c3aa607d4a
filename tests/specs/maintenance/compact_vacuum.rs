// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maintenance specs
//!
//! Verify compaction followed by vacuum under one table lock, against the
//! local table store.

use crate::prelude::*;

/// Overwrite [{id: 1}] then append [{id: 2}]: two active data files
async fn two_file_table(store: &Store, lock: &MemoryLockClient) {
    let writer = CoordinatedWriter::new(lock.clone(), store.adapter());
    writer
        .write(write("events", WriteMode::Overwrite, json!([{ "id": 1 }])))
        .await
        .unwrap();
    writer
        .write(write("events", WriteMode::Append, json!([{ "id": 2 }])))
        .await
        .unwrap();
}

fn aggressive(name: &str) -> MaintenanceRequest {
    MaintenanceRequest::new(table(name))
        .with_retention(Duration::ZERO)
        .with_dry_run(false)
        .without_retention_enforcement()
}

#[tokio::test]
async fn compaction_then_vacuum_converges_to_one_file() {
    let store = Store::new();
    let lock = MemoryLockClient::new();
    two_file_table(&store, &lock).await;
    let maintainer = CoordinatedMaintainer::new(lock, store.adapter());
    let table = store.table("events");
    assert_eq!(table.data_file_count().unwrap(), 2);

    let first = maintainer.maintain(aggressive("events")).await.unwrap();

    assert_eq!(first.compaction.read_version, 1);
    assert_eq!(first.compaction.committed_version, Some(2));
    assert_eq!(first.compaction.files_removed, 2);
    assert_eq!(first.compaction.files_added, 1);
    // Vacuum looked at the version compaction read, which had no tombstones
    assert!(first.vacuum.files_deleted.is_empty());
    assert!(!first.vacuum.dry_run);
    similar_asserts::assert_eq!(ids(&table), vec![1, 2]);
    assert_eq!(table.snapshot().unwrap().files().len(), 1);
    assert_eq!(table.data_file_count().unwrap(), 3);

    let second = maintainer.maintain(aggressive("events")).await.unwrap();

    assert_eq!(second.compaction.committed_version, None);
    assert_eq!(second.vacuum.files_deleted.len(), 2);
    similar_asserts::assert_eq!(ids(&table), vec![1, 2]);
    assert_eq!(table.data_file_count().unwrap(), 1);
    assert_eq!(table.version().unwrap(), 2);
}

#[tokio::test]
async fn default_maintenance_is_a_dry_run() {
    let store = Store::new();
    let lock = MemoryLockClient::new();
    two_file_table(&store, &lock).await;
    let maintainer = CoordinatedMaintainer::new(lock, store.adapter());

    maintainer
        .maintain(MaintenanceRequest::new(table("events")))
        .await
        .unwrap();
    let report = maintainer
        .maintain(MaintenanceRequest::new(table("events")))
        .await
        .unwrap();

    assert!(report.vacuum.dry_run);
    assert!(report.vacuum.files_deleted.is_empty());
    assert_eq!(store.table("events").data_file_count().unwrap(), 3);
}

#[tokio::test]
async fn enforced_retention_rejects_zero_hours() {
    let store = Store::new();
    let lock = MemoryLockClient::new();
    two_file_table(&store, &lock).await;
    let maintainer = CoordinatedMaintainer::new(lock.clone(), store.adapter());

    let err = maintainer
        .maintain(
            MaintenanceRequest::new(table("events"))
                .with_retention(Duration::ZERO)
                .with_dry_run(false),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err.operation_error(),
        Some(StorageError::InvalidRetention { .. })
    ));
    // The lock was released despite the failure
    let writer = CoordinatedWriter::new(lock, store.adapter())
        .with_acquire_mode(AcquireMode::NonBlocking);
    writer
        .write(write("events", WriteMode::Append, json!([{ "id": 3 }])))
        .await
        .unwrap();
}

#[tokio::test]
async fn maintaining_a_missing_table_fails_cleanly() {
    let store = Store::new();
    let maintainer = CoordinatedMaintainer::new(MemoryLockClient::new(), store.adapter());

    let err = maintainer
        .maintain(MaintenanceRequest::new(table("missing")))
        .await
        .unwrap_err();

    assert!(matches!(
        err.operation_error(),
        Some(StorageError::TableNotFound(_))
    ));
}
