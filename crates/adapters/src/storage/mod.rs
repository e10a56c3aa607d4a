// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table store adapters

mod delta;
mod local;

pub use delta::DeltaTableStore;
pub use local::LocalTableStore;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeStorageAdapter, FakeTable, StorageCall};

use async_trait::async_trait;
use tlk_core::{
    CompactMetrics, CompactOptions, PartitionFilter, StorageAdapter, StorageBackend,
    StorageConfig, StorageError, TableName, VacuumMetrics, VacuumOptions, WriteOutcome,
    WriteRequest,
};

/// The table store selected by configuration
#[derive(Clone, Debug)]
pub enum ConfiguredTableStore {
    Delta(DeltaTableStore),
    Local(LocalTableStore),
}

impl ConfiguredTableStore {
    pub fn from_config(config: &StorageConfig) -> Self {
        tracing::debug!(
            backend = %config.backend,
            root = %config.root.display(),
            "table store configured"
        );
        match config.backend {
            StorageBackend::Delta => {
                ConfiguredTableStore::Delta(DeltaTableStore::from_config(config))
            }
            StorageBackend::Local => {
                ConfiguredTableStore::Local(LocalTableStore::from_config(config))
            }
        }
    }

    pub fn backend(&self) -> StorageBackend {
        match self {
            ConfiguredTableStore::Delta(_) => StorageBackend::Delta,
            ConfiguredTableStore::Local(_) => StorageBackend::Local,
        }
    }
}

#[async_trait]
impl StorageAdapter for ConfiguredTableStore {
    async fn write(&self, request: WriteRequest) -> Result<WriteOutcome, StorageError> {
        match self {
            ConfiguredTableStore::Delta(store) => store.write(request).await,
            ConfiguredTableStore::Local(store) => store.write(request).await,
        }
    }

    async fn compact(
        &self,
        table: &TableName,
        filters: &[PartitionFilter],
        options: &CompactOptions,
    ) -> Result<CompactMetrics, StorageError> {
        match self {
            ConfiguredTableStore::Delta(store) => store.compact(table, filters, options).await,
            ConfiguredTableStore::Local(store) => store.compact(table, filters, options).await,
        }
    }

    async fn vacuum(
        &self,
        table: &TableName,
        options: &VacuumOptions,
    ) -> Result<VacuumMetrics, StorageError> {
        match self {
            ConfiguredTableStore::Delta(store) => store.vacuum(table, options).await,
            ConfiguredTableStore::Local(store) => store.vacuum(table, options).await,
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
