// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tlk-storage: a local versioned table store
//!
//! A table is a directory of JSON-lines data files plus a `_tlk_log/`
//! transaction log. Every write, compaction and vacuum reads the latest
//! snapshot, and every commit publishes exactly one new version.

pub mod action;
pub mod data;
mod error;
pub mod log;
pub mod optimize;
pub mod snapshot;
pub mod table;
pub mod vacuum;

pub use action::{Action, AddFile, CommitInfo, Metadata, PartitionValues, RemoveFile};
pub use error::TableError;
pub use log::TransactionLog;
pub use optimize::{plan_compaction, CompactionPlan, CompactionTask};
pub use snapshot::{HistoryEntry, Snapshot};
pub use table::{CommitOutcome, Table};
pub use vacuum::plan_vacuum;
