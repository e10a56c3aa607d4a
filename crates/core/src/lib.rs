// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tlk-core: lock-guarded critical sections over versioned tables
//!
//! This crate provides:
//! - The lock service and table store adapter traits
//! - [`LockGuard`], which runs one operation under a lock and releases it on
//!   every exit path
//! - [`CoordinatedWriter`] and [`CoordinatedMaintainer`], the write and
//!   compact + vacuum critical sections
//! - A pure lease state machine for lock services that grant expiring leases
//! - Configuration

pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod key;
pub mod lease;
pub mod lock;
pub mod maintainer;
pub mod request;
pub mod schema;
pub mod storage;
pub mod writer;

#[cfg(test)]
mod testing;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    Config, ConfigError, FileLockConfig, LockBackend, LockConfig, MaintenanceConfig, RedisConfig,
    StorageBackend, StorageConfig,
};
pub use error::{GuardError, InvalidName, LockError, MaintenanceError, StorageError, WriteError};
pub use guard::{HeldLock, LockGuard};
pub use key::{LockKey, LockToken, RandomTokens, SequentialTokens, TableName, TokenSource};
pub use lease::{Lease, LeaseEvent, LeaseInput, LeaseState, ReleaseRejection};
pub use lock::{AcquireMode, LockClient, LockHandle};
pub use maintainer::CoordinatedMaintainer;
pub use request::{
    CompactMetrics, CompactOptions, FilterOp, FilterValue, MaintenanceReport, MaintenanceRequest,
    PartitionFilter, VacuumMetrics, VacuumOptions, WriteMode, WriteOptions, WriteOutcome,
    WriteRequest,
};
pub use schema::{Column, ColumnType, Record, Schema, Value};
pub use storage::StorageAdapter;
pub use writer::CoordinatedWriter;
