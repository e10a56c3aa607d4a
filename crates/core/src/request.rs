// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Requests, options and outcomes for table critical sections

use crate::config::MaintenanceConfig;
use crate::error::StorageError;
use crate::key::{LockKey, TableName};
use crate::schema::{Record, Schema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default cap on rows per data file
pub const DEFAULT_MAX_ROWS_PER_FILE: usize = 10 * 1024 * 1024;

/// How a write treats an existing table
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Fail if the table exists
    #[default]
    Error,
    /// Add rows as a new version
    Append,
    /// Replace committed data
    Overwrite,
    /// Do nothing if the table exists
    Ignore,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WriteMode::Error => "error",
            WriteMode::Append => "append",
            WriteMode::Overwrite => "overwrite",
            WriteMode::Ignore => "ignore",
        };
        f.write_str(s)
    }
}

impl FromStr for WriteMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(WriteMode::Error),
            "append" => Ok(WriteMode::Append),
            "overwrite" => Ok(WriteMode::Overwrite),
            "ignore" => Ok(WriteMode::Ignore),
            other => Err(StorageError::InvalidConfiguration(format!(
                "unknown write mode {:?}",
                other
            ))),
        }
    }
}

/// Comparison used by a partition filter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not in")]
    NotIn,
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterOp::Eq => "=",
            FilterOp::NotEq => "!=",
            FilterOp::In => "in",
            FilterOp::NotIn => "not in",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Single(String),
    List(Vec<String>),
}

/// Predicate over one partition column
///
/// Partition values compare as strings; a null partition value matches
/// nothing except `!=` and `not in`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionFilter {
    pub column: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

impl PartitionFilter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Eq,
            value: FilterValue::Single(value.into()),
        }
    }

    pub fn not_eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::NotEq,
            value: FilterValue::Single(value.into()),
        }
    }

    pub fn is_in<I, S>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            column: column.into(),
            op: FilterOp::In,
            value: FilterValue::List(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn not_in<I, S>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            column: column.into(),
            op: FilterOp::NotIn,
            value: FilterValue::List(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Build a filter from its three parts, e.g. `("day", "in", ["mon", "tue"])`
    pub fn parse(
        column: impl Into<String>,
        op: &str,
        value: FilterValue,
    ) -> Result<Self, StorageError> {
        let op = match op.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => FilterOp::Eq,
            "!=" => FilterOp::NotEq,
            "in" => FilterOp::In,
            "not in" => FilterOp::NotIn,
            other => {
                return Err(StorageError::InvalidFilter(format!(
                    "unsupported operator {:?}",
                    other
                )))
            }
        };
        let filter = Self {
            column: column.into(),
            op,
            value,
        };
        filter.check_shape()?;
        Ok(filter)
    }

    fn check_shape(&self) -> Result<(), StorageError> {
        match (self.op, &self.value) {
            (FilterOp::Eq | FilterOp::NotEq, FilterValue::Single(_)) => Ok(()),
            (FilterOp::In | FilterOp::NotIn, FilterValue::List(_)) => Ok(()),
            (op, _) => Err(StorageError::InvalidFilter(format!(
                "operator {:?} on {} needs {}",
                op.to_string(),
                self.column,
                if matches!(op, FilterOp::In | FilterOp::NotIn) {
                    "a list"
                } else {
                    "a single value"
                }
            ))),
        }
    }

    /// Check the filter against a table's partition columns
    pub fn validate(&self, partition_columns: &[String]) -> Result<(), StorageError> {
        if !partition_columns.iter().any(|c| c == &self.column) {
            return Err(StorageError::InvalidFilter(format!(
                "{} is not a partition column (partitioned by [{}])",
                self.column,
                partition_columns.join(", ")
            )));
        }
        self.check_shape()
    }

    pub fn matches(&self, partition_values: &BTreeMap<String, Option<String>>) -> bool {
        let actual = partition_values.get(&self.column).and_then(|v| v.as_deref());
        match (self.op, &self.value, actual) {
            (FilterOp::Eq, FilterValue::Single(expected), Some(v)) => v == expected,
            (FilterOp::NotEq, FilterValue::Single(expected), Some(v)) => v != expected,
            (FilterOp::In, FilterValue::List(set), Some(v)) => set.iter().any(|s| s == v),
            (FilterOp::NotIn, FilterValue::List(set), Some(v)) => !set.iter().any(|s| s == v),
            (FilterOp::NotEq | FilterOp::NotIn, _, None) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PartitionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            FilterValue::Single(v) => write!(f, "{} {} {:?}", self.column, self.op, v),
            FilterValue::List(vs) => write!(f, "{} {} {:?}", self.column, self.op, vs),
        }
    }
}

/// True when every filter matches
pub fn matches_all(filters: &[PartitionFilter], values: &BTreeMap<String, Option<String>>) -> bool {
    filters.iter().all(|f| f.matches(values))
}

/// Storage options for a write
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WriteOptions {
    pub partition_by: Vec<String>,
    /// Explicit schema; inferred from the records when absent
    pub schema: Option<Schema>,
    pub max_rows_per_file: usize,
    /// Cap on distinct partitions one write may create
    pub max_partitions: Option<usize>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub configuration: BTreeMap<String, Option<String>>,
    pub overwrite_schema: bool,
    /// Restrict an overwrite to matching partitions
    pub partition_filters: Vec<PartitionFilter>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            partition_by: Vec::new(),
            schema: None,
            max_rows_per_file: DEFAULT_MAX_ROWS_PER_FILE,
            max_partitions: None,
            name: None,
            description: None,
            configuration: BTreeMap::new(),
            overwrite_schema: false,
            partition_filters: Vec::new(),
        }
    }
}

impl WriteOptions {
    pub fn partition_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partition_by = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_max_rows_per_file(mut self, rows: usize) -> Self {
        self.max_rows_per_file = rows;
        self
    }

    pub fn with_max_partitions(mut self, partitions: usize) -> Self {
        self.max_partitions = Some(partitions);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_configuration(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.configuration.insert(key.into(), Some(value.into()));
        self
    }

    pub fn with_overwrite_schema(mut self, overwrite: bool) -> Self {
        self.overwrite_schema = overwrite;
        self
    }

    pub fn with_partition_filters(mut self, filters: Vec<PartitionFilter>) -> Self {
        self.partition_filters = filters;
        self
    }
}

/// One write critical section's input
///
/// Consumed by a single write call.
#[derive(Clone, Debug)]
pub struct WriteRequest {
    table: TableName,
    records: Vec<Record>,
    mode: WriteMode,
    options: WriteOptions,
}

impl WriteRequest {
    pub fn new(table: TableName, records: Vec<Record>) -> Self {
        Self {
            table,
            records,
            mode: WriteMode::default(),
            options: WriteOptions::default(),
        }
    }

    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_options(mut self, options: WriteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn options(&self) -> &WriteOptions {
        &self.options
    }

    pub fn lock_key(&self) -> LockKey {
        LockKey::for_table(&self.table)
    }

    pub fn into_parts(self) -> (TableName, Vec<Record>, WriteMode, WriteOptions) {
        (self.table, self.records, self.mode, self.options)
    }
}

/// What a write committed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub table: TableName,
    /// Committed version, or None when an `ignore` write found the table
    pub version: Option<u64>,
    pub rows_written: usize,
    pub files_added: usize,
    pub files_removed: usize,
}

impl WriteOutcome {
    /// Outcome of an `ignore` write against an existing table
    pub fn skipped(table: TableName) -> Self {
        Self {
            table,
            version: None,
            rows_written: 0,
            files_added: 0,
            files_removed: 0,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.version.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompactOptions {
    /// Target data file size in bytes; table default when absent
    pub target_size: Option<u64>,
    /// Parallel rewrite tasks; available parallelism when absent
    pub max_concurrent_tasks: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VacuumOptions {
    /// Minimum tombstone age; table default when absent
    pub retention: Option<Duration>,
    pub dry_run: bool,
    pub enforce_retention_duration: bool,
    /// Snapshot whose tombstones are eligible; latest when absent
    pub as_of_version: Option<u64>,
}

impl Default for VacuumOptions {
    fn default() -> Self {
        Self {
            retention: None,
            dry_run: true,
            enforce_retention_duration: true,
            as_of_version: None,
        }
    }
}

/// One maintenance critical section's input
#[derive(Clone, Debug)]
pub struct MaintenanceRequest {
    table: TableName,
    partition_filters: Vec<PartitionFilter>,
    target_size: Option<u64>,
    max_concurrent_tasks: Option<usize>,
    retention: Option<Duration>,
    dry_run: bool,
    enforce_retention_duration: bool,
}

impl MaintenanceRequest {
    /// A dry run with retention enforcement on
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            partition_filters: Vec::new(),
            target_size: None,
            max_concurrent_tasks: None,
            retention: None,
            dry_run: true,
            enforce_retention_duration: true,
        }
    }

    pub fn with_partition_filters(mut self, filters: Vec<PartitionFilter>) -> Self {
        self.partition_filters = filters;
        self
    }

    pub fn with_target_size(mut self, bytes: u64) -> Self {
        self.target_size = Some(bytes);
        self
    }

    pub fn with_max_concurrent_tasks(mut self, tasks: usize) -> Self {
        self.max_concurrent_tasks = Some(tasks);
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn with_retention_hours(self, hours: u64) -> Self {
        self.with_retention(Duration::from_secs(hours * 3600))
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Allow a retention below the table's configured minimum
    pub fn without_retention_enforcement(mut self) -> Self {
        self.enforce_retention_duration = false;
        self
    }

    /// Fill unset knobs from configuration
    pub fn with_defaults(mut self, defaults: &MaintenanceConfig) -> Self {
        self.retention = self.retention.or(defaults.retention);
        self.target_size = self.target_size.or(defaults.target_size);
        self.max_concurrent_tasks = self.max_concurrent_tasks.or(defaults.max_concurrent_tasks);
        self
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn partition_filters(&self) -> &[PartitionFilter] {
        &self.partition_filters
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn enforces_retention(&self) -> bool {
        self.enforce_retention_duration
    }

    pub fn compact_options(&self) -> CompactOptions {
        CompactOptions {
            target_size: self.target_size,
            max_concurrent_tasks: self.max_concurrent_tasks,
        }
    }

    pub fn vacuum_options(&self, as_of_version: Option<u64>) -> VacuumOptions {
        VacuumOptions {
            retention: self.retention,
            dry_run: self.dry_run,
            enforce_retention_duration: self.enforce_retention_duration,
            as_of_version,
        }
    }

    pub fn lock_key(&self) -> LockKey {
        LockKey::for_table(&self.table)
    }
}

/// What a compaction pass did
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactMetrics {
    /// Version the pass planned against
    pub read_version: u64,
    /// Version it committed; None when nothing was rewritten
    pub committed_version: Option<u64>,
    pub files_added: usize,
    pub files_removed: usize,
    pub partitions_optimized: usize,
    pub total_considered_files: usize,
    pub total_files_skipped: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacuumMetrics {
    pub dry_run: bool,
    /// Deleted files, or the files that would be deleted on a dry run
    pub files_deleted: Vec<String>,
}

/// Combined result of one maintenance critical section
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub table: TableName,
    pub compaction: CompactMetrics,
    pub vacuum: VacuumMetrics,
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
