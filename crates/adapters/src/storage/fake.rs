// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake table store for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tlk_core::{
    CompactMetrics, CompactOptions, PartitionFilter, Record, StorageAdapter, StorageError,
    TableName, VacuumMetrics, VacuumOptions, WriteMode, WriteOutcome, WriteRequest,
};

/// Recorded storage call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCall {
    Write {
        table: String,
        mode: WriteMode,
        rows: usize,
    },
    Compact {
        table: String,
        filters: Vec<PartitionFilter>,
    },
    Vacuum {
        table: String,
        options: VacuumOptions,
    },
}

/// Fake table state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeTable {
    pub version: u64,
    pub rows: Vec<Record>,
    pub active_files: usize,
}

enum Injected {
    Error(StorageError),
    Panic(String),
}

#[derive(Default)]
struct FakeStorageState {
    tables: HashMap<TableName, FakeTable>,
    calls: Vec<StorageCall>,
    injected: VecDeque<Injected>,
    delay: Option<Duration>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Fake table store for testing
///
/// Tracks how many calls run at once, so tests can check that a lock kept
/// critical sections apart.
#[derive(Clone, Default)]
pub struct FakeStorageAdapter {
    state: Arc<Mutex<FakeStorageState>>,
}

/// Marks one call as running until dropped
struct InFlight<'a> {
    state: &'a Mutex<FakeStorageState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_flight -= 1;
    }
}

impl FakeStorageAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FakeStorageState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// Every call sleeps this long before doing its work
    pub fn set_delay(&self, delay: Duration) {
        self.with_state(|s| s.delay = Some(delay));
    }

    /// The next call fails with `error`
    pub fn fail_next(&self, error: StorageError) {
        self.with_state(|s| s.injected.push_back(Injected::Error(error)));
    }

    /// The next call panics with `message`
    pub fn panic_next(&self, message: impl Into<String>) {
        let message = message.into();
        self.with_state(|s| s.injected.push_back(Injected::Panic(message)));
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<StorageCall> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn table(&self, name: &TableName) -> Option<FakeTable> {
        self.with_state(|s| s.tables.get(name).cloned())
    }

    pub fn in_flight(&self) -> usize {
        self.with_state(|s| s.in_flight)
    }

    /// Most calls ever running at once
    pub fn max_in_flight(&self) -> usize {
        self.with_state(|s| s.max_in_flight)
    }

    async fn enter(&self, call: StorageCall) -> Result<InFlight<'_>, StorageError> {
        let (injected, delay) = self.with_state(|s| {
            s.calls.push(call);
            s.in_flight += 1;
            s.max_in_flight = s.max_in_flight.max(s.in_flight);
            (s.injected.pop_front(), s.delay)
        });
        let guard = InFlight { state: &self.state };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match injected {
            None => Ok(guard),
            Some(Injected::Error(error)) => Err(error),
            Some(Injected::Panic(message)) => fail(message),
        }
    }
}

#[allow(clippy::panic)]
fn fail(message: String) -> ! {
    panic!("{}", message)
}

fn not_found(table: &TableName) -> StorageError {
    StorageError::TableNotFound(table.to_string())
}

#[async_trait]
impl StorageAdapter for FakeStorageAdapter {
    async fn write(&self, request: WriteRequest) -> Result<WriteOutcome, StorageError> {
        let _guard = self
            .enter(StorageCall::Write {
                table: request.table().to_string(),
                mode: request.mode(),
                rows: request.records().len(),
            })
            .await?;
        let (name, records, mode, _options) = request.into_parts();

        self.with_state(|s| {
            let rows_written = records.len();
            let files_added = usize::from(!records.is_empty());
            let Some(table) = s.tables.get_mut(&name) else {
                s.tables.insert(
                    name.clone(),
                    FakeTable {
                        version: 0,
                        rows: records,
                        active_files: files_added,
                    },
                );
                return Ok(WriteOutcome {
                    table: name,
                    version: Some(0),
                    rows_written,
                    files_added,
                    files_removed: 0,
                });
            };

            let files_removed = match mode {
                WriteMode::Error => return Err(StorageError::TableAlreadyExists(name.to_string())),
                WriteMode::Ignore => return Ok(WriteOutcome::skipped(name)),
                WriteMode::Append => {
                    table.rows.extend(records);
                    0
                }
                WriteMode::Overwrite => {
                    table.rows = records;
                    std::mem::take(&mut table.active_files)
                }
            };
            table.version += 1;
            table.active_files += files_added;
            Ok(WriteOutcome {
                table: name,
                version: Some(table.version),
                rows_written,
                files_added,
                files_removed,
            })
        })
    }

    async fn compact(
        &self,
        table: &TableName,
        filters: &[PartitionFilter],
        options: &CompactOptions,
    ) -> Result<CompactMetrics, StorageError> {
        let _guard = self
            .enter(StorageCall::Compact {
                table: table.to_string(),
                filters: filters.to_vec(),
            })
            .await?;
        if options.target_size == Some(0) {
            return Err(StorageError::InvalidConfiguration(
                "target_size must be positive".to_string(),
            ));
        }

        self.with_state(|s| {
            let state = s.tables.get_mut(table).ok_or_else(|| not_found(table))?;
            let mut metrics = CompactMetrics {
                read_version: state.version,
                total_considered_files: state.active_files,
                ..CompactMetrics::default()
            };
            if state.active_files < 2 {
                metrics.total_files_skipped = state.active_files;
                return Ok(metrics);
            }
            state.version += 1;
            metrics.committed_version = Some(state.version);
            metrics.files_removed = state.active_files;
            metrics.files_added = 1;
            metrics.partitions_optimized = 1;
            state.active_files = 1;
            Ok(metrics)
        })
    }

    async fn vacuum(
        &self,
        table: &TableName,
        options: &VacuumOptions,
    ) -> Result<VacuumMetrics, StorageError> {
        let _guard = self
            .enter(StorageCall::Vacuum {
                table: table.to_string(),
                options: options.clone(),
            })
            .await?;

        self.with_state(|s| {
            if !s.tables.contains_key(table) {
                return Err(not_found(table));
            }
            Ok(VacuumMetrics {
                dry_run: options.dry_run,
                files_deleted: Vec::new(),
            })
        })
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
