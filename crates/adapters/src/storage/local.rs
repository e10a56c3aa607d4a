// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table store over local directories

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tlk_core::{
    CompactMetrics, CompactOptions, PartitionFilter, StorageAdapter, StorageConfig, StorageError,
    TableName, VacuumMetrics, VacuumOptions, WriteOutcome, WriteRequest,
};
use tlk_storage::{Table, TableError};
use tokio::task::JoinError;

/// Tables stored as subdirectories of one root directory
///
/// File I/O runs on the blocking thread pool.
#[derive(Clone, Debug)]
pub struct LocalTableStore {
    root: PathBuf,
}

impl LocalTableStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle to the table directory for `name`
    pub fn table(&self, name: &TableName) -> Table {
        Table::at(self.root.join(name.as_str()))
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, TableError> + Send + 'static,
    {
        match tokio::task::spawn_blocking(work).await {
            Ok(result) => result.map_err(StorageError::from),
            Err(e) => Err(join_error(e)),
        }
    }
}

/// A panic in the blocking task continues in the caller
fn join_error(e: JoinError) -> StorageError {
    match e.try_into_panic() {
        Ok(payload) => std::panic::resume_unwind(payload),
        Err(e) => StorageError::Io(io::Error::other(format!("storage task failed: {}", e))),
    }
}

#[async_trait]
impl StorageAdapter for LocalTableStore {
    async fn write(&self, request: WriteRequest) -> Result<WriteOutcome, StorageError> {
        let table = self.table(request.table());
        let (name, records, mode, options) = request.into_parts();
        let outcome = self
            .blocking(move || table.write(&records, mode, &options))
            .await?;
        Ok(WriteOutcome {
            table: name,
            version: outcome.version,
            rows_written: outcome.rows_written,
            files_added: outcome.files_added,
            files_removed: outcome.files_removed,
        })
    }

    async fn compact(
        &self,
        table: &TableName,
        filters: &[PartitionFilter],
        options: &CompactOptions,
    ) -> Result<CompactMetrics, StorageError> {
        let table = self.table(table);
        let filters = filters.to_vec();
        let options = options.clone();
        self.blocking(move || table.compact(&filters, &options)).await
    }

    async fn vacuum(
        &self,
        table: &TableName,
        options: &VacuumOptions,
    ) -> Result<VacuumMetrics, StorageError> {
        let table = self.table(table);
        let options = options.clone();
        self.blocking(move || table.vacuum(&options)).await
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
