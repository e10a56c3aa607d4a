// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock-guarded compaction and vacuum
//!
//! Both steps run under one acquisition of the table lock, so no writer can
//! commit between them. Vacuum considers the tombstones of the version the
//! compaction pass read: files the pass itself replaced are left for the next
//! maintenance run.

use crate::error::{MaintenanceError, StorageError};
use crate::guard::LockGuard;
use crate::lock::{AcquireMode, LockClient};
use crate::request::{MaintenanceReport, MaintenanceRequest};
use crate::storage::StorageAdapter;

#[derive(Clone, Debug)]
pub struct CoordinatedMaintainer<L: LockClient, S: StorageAdapter> {
    guard: LockGuard<L>,
    storage: S,
    mode: AcquireMode,
}

impl<L: LockClient, S: StorageAdapter> CoordinatedMaintainer<L, S> {
    pub fn new(lock: L, storage: S) -> Self {
        Self {
            guard: LockGuard::new(lock),
            storage,
            mode: AcquireMode::Blocking,
        }
    }

    pub fn with_acquire_mode(mut self, mode: AcquireMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn acquire_mode(&self) -> AcquireMode {
        self.mode
    }

    pub async fn maintain(
        &self,
        request: MaintenanceRequest,
    ) -> Result<MaintenanceReport, MaintenanceError> {
        let key = request.lock_key();
        let storage = self.storage.clone();
        self.guard
            .run(&key, self.mode, move || async move {
                let table = request.table().clone();
                let compaction = storage
                    .compact(&table, request.partition_filters(), &request.compact_options())
                    .await?;
                tracing::info!(
                    table = %table,
                    read_version = compaction.read_version,
                    files_added = compaction.files_added,
                    files_removed = compaction.files_removed,
                    "compaction finished"
                );

                let vacuum = storage
                    .vacuum(&table, &request.vacuum_options(Some(compaction.read_version)))
                    .await?;
                tracing::info!(
                    table = %table,
                    dry_run = vacuum.dry_run,
                    files = vacuum.files_deleted.len(),
                    "vacuum finished"
                );

                Ok::<_, StorageError>(MaintenanceReport {
                    table,
                    compaction,
                    vacuum,
                })
            })
            .await
    }
}

#[cfg(test)]
#[path = "maintainer_tests.rs"]
mod tests;
