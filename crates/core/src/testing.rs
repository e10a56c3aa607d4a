// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal collaborators for this crate's unit tests

use crate::error::{LockError, StorageError};
use crate::key::{LockKey, SequentialTokens, TableName, TokenSource};
use crate::lock::{AcquireMode, LockClient, LockHandle};
use crate::request::{
    CompactMetrics, CompactOptions, PartitionFilter, VacuumMetrics, VacuumOptions, WriteOutcome,
    WriteRequest,
};
use crate::storage::StorageAdapter;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockCall {
    Acquire { key: String, mode: AcquireMode },
    Release { key: String, token: String },
}

#[derive(Default)]
struct LockState {
    held: HashMap<String, String>,
    refuse: bool,
    fail_acquire: bool,
    fail_release: bool,
    release_delay: Option<Duration>,
    calls: Vec<LockCall>,
}

/// Lock service that never waits: a held key is reported unavailable
#[derive(Clone)]
pub struct ScriptedLock {
    state: Arc<Mutex<LockState>>,
    tokens: SequentialTokens,
}

impl Default for ScriptedLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLock {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LockState::default())),
            tokens: SequentialTokens::new("t"),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut LockState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub fn refuse(&self) {
        self.with_state(|s| s.refuse = true);
    }

    pub fn fail_acquire(&self) {
        self.with_state(|s| s.fail_acquire = true);
    }

    pub fn fail_release(&self) {
        self.with_state(|s| s.fail_release = true);
    }

    /// Releases take `delay` before the key is freed
    pub fn delay_release(&self, delay: Duration) {
        self.with_state(|s| s.release_delay = Some(delay));
    }

    pub fn calls(&self) -> Vec<LockCall> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn releases(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, LockCall::Release { .. }))
            .count()
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.with_state(|s| s.held.contains_key(key))
    }
}

#[async_trait]
impl LockClient for ScriptedLock {
    async fn acquire(
        &self,
        key: &LockKey,
        mode: AcquireMode,
    ) -> Result<Option<LockHandle>, LockError> {
        let token = self.tokens.next_token();
        self.with_state(|s| {
            s.calls.push(LockCall::Acquire {
                key: key.to_string(),
                mode,
            });
            if s.fail_acquire {
                return Err(LockError::Transport("connection refused".to_string()));
            }
            if s.refuse || s.held.contains_key(key.as_str()) {
                return Ok(None);
            }
            s.held.insert(key.to_string(), token.to_string());
            Ok(Some(LockHandle::new(key.clone(), token)))
        })
    }

    async fn release(&self, handle: LockHandle) -> Result<(), LockError> {
        if let Some(delay) = self.with_state(|s| s.release_delay) {
            tokio::time::sleep(delay).await;
        }
        self.with_state(|s| {
            s.calls.push(LockCall::Release {
                key: handle.key().to_string(),
                token: handle.token().to_string(),
            });
            s.held.remove(handle.key().as_str());
            if s.fail_release {
                return Err(LockError::Transport("connection reset".to_string()));
            }
            Ok(())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCall {
    Write { table: String },
    Compact { table: String, filters: usize },
    Vacuum { table: String, as_of_version: Option<u64>, dry_run: bool },
}

#[derive(Default)]
struct StorageState {
    version: u64,
    fail_compact: bool,
    fail_vacuum: bool,
    calls: Vec<StorageCall>,
}

/// Storage that records calls and commits empty versions
#[derive(Clone, Default)]
pub struct RecordingStorage {
    state: Arc<Mutex<StorageState>>,
}

impl RecordingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut StorageState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    pub fn fail_compact(&self) {
        self.with_state(|s| s.fail_compact = true);
    }

    pub fn fail_vacuum(&self) {
        self.with_state(|s| s.fail_vacuum = true);
    }

    pub fn calls(&self) -> Vec<StorageCall> {
        self.with_state(|s| s.calls.clone())
    }
}

#[async_trait]
impl StorageAdapter for RecordingStorage {
    async fn write(&self, request: WriteRequest) -> Result<WriteOutcome, StorageError> {
        self.with_state(|s| {
            s.calls.push(StorageCall::Write {
                table: request.table().to_string(),
            });
            let version = s.version;
            s.version += 1;
            Ok(WriteOutcome {
                table: request.table().clone(),
                version: Some(version),
                rows_written: request.records().len(),
                files_added: 1,
                files_removed: 0,
            })
        })
    }

    async fn compact(
        &self,
        table: &TableName,
        filters: &[PartitionFilter],
        _options: &CompactOptions,
    ) -> Result<CompactMetrics, StorageError> {
        self.with_state(|s| {
            s.calls.push(StorageCall::Compact {
                table: table.to_string(),
                filters: filters.len(),
            });
            if s.fail_compact {
                return Err(StorageError::TableNotFound(table.to_string()));
            }
            let read_version = s.version.saturating_sub(1);
            s.version += 1;
            Ok(CompactMetrics {
                read_version,
                committed_version: Some(read_version + 1),
                files_added: 1,
                files_removed: 2,
                partitions_optimized: 1,
                total_considered_files: 2,
                total_files_skipped: 0,
            })
        })
    }

    async fn vacuum(
        &self,
        table: &TableName,
        options: &VacuumOptions,
    ) -> Result<VacuumMetrics, StorageError> {
        self.with_state(|s| {
            s.calls.push(StorageCall::Vacuum {
                table: table.to_string(),
                as_of_version: options.as_of_version,
                dry_run: options.dry_run,
            });
            if s.fail_vacuum {
                return Err(StorageError::InvalidRetention {
                    requested: options.retention.unwrap_or_default(),
                    minimum: std::time::Duration::from_secs(168 * 3600),
                });
            }
            Ok(VacuumMetrics {
                dry_run: options.dry_run,
                files_deleted: Vec::new(),
            })
        })
    }
}
