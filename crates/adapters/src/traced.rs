// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use async_trait::async_trait;
use std::time::Instant;
use tlk_core::{
    AcquireMode, CompactMetrics, CompactOptions, LockClient, LockError, LockHandle, LockKey,
    PartitionFilter, StorageAdapter, StorageError, TableName, VacuumMetrics, VacuumOptions,
    WriteOutcome, WriteRequest,
};
use tracing::Instrument;

/// Wrapper that adds tracing to any LockClient
#[derive(Clone, Debug)]
pub struct TracedLockClient<L> {
    inner: L,
}

impl<L> TracedLockClient<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

#[async_trait]
impl<L: LockClient> LockClient for TracedLockClient<L> {
    async fn acquire(
        &self,
        key: &LockKey,
        mode: AcquireMode,
    ) -> Result<Option<LockHandle>, LockError> {
        let span = tracing::info_span!("lock.acquire", %key, %mode);
        async {
            // Precondition: an empty key would lock nothing in particular
            if key.is_empty() {
                tracing::error!("empty lock key");
                return Err(LockError::InvalidKey(key.to_string()));
            }

            let start = Instant::now();
            let result = self.inner.acquire(key, mode).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(Some(handle)) => tracing::info!(token = %handle.token(), elapsed_ms, "granted"),
                Ok(None) => tracing::info!(elapsed_ms, "not granted"),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "acquire failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn release(&self, handle: LockHandle) -> Result<(), LockError> {
        let span = tracing::info_span!("lock.release", key = %handle.key(), token = %handle.token());
        async {
            let held_ms = (chrono::Utc::now() - handle.acquired_at()).num_milliseconds();
            let result = self.inner.release(handle).await;
            match &result {
                Ok(()) => tracing::info!(held_ms, "released"),
                Err(e) => tracing::error!(held_ms, error = %e, "release failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Wrapper that adds tracing to any StorageAdapter
#[derive(Clone, Debug)]
pub struct TracedStorageAdapter<S> {
    inner: S,
}

impl<S> TracedStorageAdapter<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: StorageAdapter> StorageAdapter for TracedStorageAdapter<S> {
    async fn write(&self, request: WriteRequest) -> Result<WriteOutcome, StorageError> {
        let span = tracing::info_span!(
            "storage.write",
            table = %request.table(),
            mode = %request.mode()
        );
        async {
            tracing::info!(rows = request.records().len(), "writing");

            let start = Instant::now();
            let result = self.inner.write(request).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(outcome) if outcome.is_skipped() => {
                    tracing::info!(elapsed_ms, "table exists, write skipped")
                }
                Ok(outcome) => tracing::info!(
                    version = outcome.version,
                    files_added = outcome.files_added,
                    files_removed = outcome.files_removed,
                    elapsed_ms,
                    "committed"
                ),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "write failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn compact(
        &self,
        table: &TableName,
        filters: &[PartitionFilter],
        options: &CompactOptions,
    ) -> Result<CompactMetrics, StorageError> {
        let span = tracing::info_span!("storage.compact", %table, filters = filters.len());
        async {
            // Precondition: a zero target can never be met
            if options.target_size == Some(0) {
                tracing::error!("target_size is zero");
                return Err(StorageError::InvalidConfiguration(
                    "target_size must be positive".to_string(),
                ));
            }

            let start = Instant::now();
            let result = self.inner.compact(table, filters, options).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(metrics) => tracing::info!(
                    read_version = metrics.read_version,
                    committed_version = metrics.committed_version,
                    files_added = metrics.files_added,
                    files_removed = metrics.files_removed,
                    elapsed_ms,
                    "compacted"
                ),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "compaction failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn vacuum(
        &self,
        table: &TableName,
        options: &VacuumOptions,
    ) -> Result<VacuumMetrics, StorageError> {
        let span = tracing::info_span!(
            "storage.vacuum",
            %table,
            dry_run = options.dry_run,
            as_of_version = options.as_of_version
        );
        async {
            if !options.enforce_retention_duration {
                tracing::warn!(retention = ?options.retention, "retention check disabled");
            }

            let start = Instant::now();
            let result = self.inner.vacuum(table, options).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(metrics) => tracing::info!(
                    files = metrics.files_deleted.len(),
                    elapsed_ms,
                    "vacuumed"
                ),
                Err(e) => tracing::error!(elapsed_ms, error = %e, "vacuum failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
