// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O: lock services and table stores

pub mod lock;
pub mod storage;
pub mod traced;

pub use lock::{ConfiguredLockClient, FileLockClient, MemoryLockClient, RedisLockClient};
pub use storage::{ConfiguredTableStore, DeltaTableStore, LocalTableStore};
pub use traced::{TracedLockClient, TracedStorageAdapter};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use lock::{FakeLockClient, LockCall};
#[cfg(any(test, feature = "test-support"))]
pub use storage::{FakeStorageAdapter, FakeTable, StorageCall};
