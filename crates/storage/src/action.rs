// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transaction log actions
//!
//! Each commit is a list of actions, one JSON object per line, externally
//! tagged: `{"add": {...}}`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tlk_core::Schema;

/// Partition column name to partition value (None for null)
pub type PartitionValues = BTreeMap<String, Option<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Metadata(Metadata),
    Add(AddFile),
    Remove(RemoveFile),
    CommitInfo(CommitInfo),
}

/// Table-level description; the latest one wins on replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: Schema,
    #[serde(default)]
    pub partition_columns: Vec<String>,
    #[serde(default)]
    pub configuration: BTreeMap<String, Option<String>>,
    /// Milliseconds since the Unix epoch
    pub created_time: i64,
}

impl Metadata {
    pub fn config(&self, key: &str) -> Option<&str> {
        self.configuration.get(key).and_then(|v| v.as_deref())
    }
}

/// A data file joining the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddFile {
    /// Path relative to the table directory
    pub path: String,
    pub size: u64,
    pub rows: u64,
    #[serde(default)]
    pub partition_values: PartitionValues,
    pub modification_time: i64,
    /// False for rewrites that do not change table content
    pub data_change: bool,
    /// CRC-32 of the file bytes
    pub checksum: u32,
}

/// A data file leaving the table; the file stays on disk until vacuumed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveFile {
    pub path: String,
    /// Milliseconds since the Unix epoch
    pub deletion_timestamp: i64,
    pub data_change: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl RemoveFile {
    pub fn of(add: &AddFile, deletion_timestamp: i64, data_change: bool) -> Self {
        Self {
            path: add.path.clone(),
            deletion_timestamp,
            data_change,
            size: Some(add.size),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub timestamp: i64,
    pub operation: String,
    #[serde(default)]
    pub operation_parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_version: Option<u64>,
    #[serde(default)]
    pub metrics: BTreeMap<String, u64>,
}

impl CommitInfo {
    pub fn new(operation: impl Into<String>, timestamp: i64) -> Self {
        Self {
            timestamp,
            operation: operation.into(),
            operation_parameters: BTreeMap::new(),
            read_version: None,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.operation_parameters.insert(key.into(), value.to_string());
        self
    }

    pub fn with_read_version(mut self, version: Option<u64>) -> Self {
        self.read_version = version;
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: u64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }
}
