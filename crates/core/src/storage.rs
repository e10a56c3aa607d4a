// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table store adapter trait

use crate::error::StorageError;
use crate::key::TableName;
use crate::request::{
    CompactMetrics, CompactOptions, PartitionFilter, VacuumMetrics, VacuumOptions, WriteOutcome,
    WriteRequest,
};
use async_trait::async_trait;

/// Adapter for a versioned table store
///
/// Calls are not coordinated with each other; run them inside a lock-guarded
/// critical section when more than one process may touch the table.
#[async_trait]
pub trait StorageAdapter: Clone + Send + Sync + 'static {
    /// Commit records according to the request's write mode
    async fn write(&self, request: WriteRequest) -> Result<WriteOutcome, StorageError>;

    /// Rewrite small files of matching partitions into fewer larger ones
    async fn compact(
        &self,
        table: &TableName,
        filters: &[PartitionFilter],
        options: &CompactOptions,
    ) -> Result<CompactMetrics, StorageError>;

    /// Delete data files that left the table longer than the retention ago
    async fn vacuum(
        &self,
        table: &TableName,
        options: &VacuumOptions,
    ) -> Result<VacuumMetrics, StorageError>;
}
