// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the behavioral specs

#![allow(dead_code, unused_imports)]

pub use serde_json::json;
pub use std::sync::Arc;
pub use std::time::Duration;
pub use tlk_adapters::{
    FakeLockClient, FakeStorageAdapter, FileLockClient, LocalTableStore, MemoryLockClient,
};
pub use tlk_core::{
    AcquireMode, CoordinatedMaintainer, CoordinatedWriter, GuardError, LockClient, LockGuard,
    LockKey, MaintenanceRequest, Record, StorageAdapter, StorageError, TableName, WriteMode,
    WriteRequest,
};
pub use tlk_storage::Table;

use tempfile::TempDir;

/// A table store rooted in a temporary directory
pub struct Store {
    dir: TempDir,
    adapter: LocalTableStore,
}

impl Store {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalTableStore::new(dir.path().join("tables"));
        Self { dir, adapter }
    }

    pub fn adapter(&self) -> LocalTableStore {
        self.adapter.clone()
    }

    pub fn table(&self, name: &str) -> Table {
        self.adapter.table(&table(name))
    }

    /// A directory for lock files next to the tables
    pub fn lock_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("locks")
    }
}

pub fn table(name: &str) -> TableName {
    TableName::new(name).unwrap()
}

/// Records from a JSON array of objects
pub fn rows(value: serde_json::Value) -> Vec<Record> {
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::Object(map) => map,
                other => panic!("not an object: {}", other),
            })
            .collect(),
        other => panic!("not an array: {}", other),
    }
}

/// Row ids, sorted, of everything active in `table`
pub fn ids(table: &Table) -> Vec<i64> {
    let mut ids: Vec<i64> = table
        .scan()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect();
    ids.sort();
    ids
}

pub fn write(name: &str, mode: WriteMode, records: serde_json::Value) -> WriteRequest {
    WriteRequest::new(table(name), rows(records)).with_mode(mode)
}
