// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock-guarded table writes

use crate::error::WriteError;
use crate::guard::LockGuard;
use crate::lock::{AcquireMode, LockClient};
use crate::request::{WriteOutcome, WriteRequest};
use crate::storage::StorageAdapter;

/// Writes to a table while holding the table's lock
///
/// Concurrent writers to one table through the same lock service are
/// serialized; a blocking writer waits for the current holder to finish.
#[derive(Clone, Debug)]
pub struct CoordinatedWriter<L: LockClient, S: StorageAdapter> {
    guard: LockGuard<L>,
    storage: S,
    mode: AcquireMode,
}

impl<L: LockClient, S: StorageAdapter> CoordinatedWriter<L, S> {
    pub fn new(lock: L, storage: S) -> Self {
        Self {
            guard: LockGuard::new(lock),
            storage,
            mode: AcquireMode::Blocking,
        }
    }

    /// Use `mode` when acquiring the table lock (blocking by default)
    pub fn with_acquire_mode(mut self, mode: AcquireMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn acquire_mode(&self) -> AcquireMode {
        self.mode
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub async fn write(&self, request: WriteRequest) -> Result<WriteOutcome, WriteError> {
        let key = request.lock_key();
        tracing::debug!(
            table = %request.table(),
            write_mode = %request.mode(),
            rows = request.records().len(),
            "coordinated write"
        );
        let storage = self.storage.clone();
        self.guard
            .run(&key, self.mode, move || async move { storage.write(request).await })
            .await
    }
}

#[cfg(test)]
#[path = "writer_tests.rs"]
mod tests;
