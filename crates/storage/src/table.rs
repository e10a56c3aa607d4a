// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A versioned table in a local directory

use crate::action::{Action, AddFile, CommitInfo, Metadata, PartitionValues, RemoveFile};
use crate::data::{self, partition_values_of};
use crate::error::{filter_error, TableError};
use crate::log::TransactionLog;
use crate::snapshot::{HistoryEntry, Snapshot};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tlk_core::request::matches_all;
use tlk_core::{
    CompactMetrics, CompactOptions, PartitionFilter, Record, Schema, VacuumMetrics, VacuumOptions,
    WriteMode, WriteOptions,
};

/// What a write committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// None when an `ignore` write found the table
    pub version: Option<u64>,
    pub rows_written: usize,
    pub files_added: usize,
    pub files_removed: usize,
}

/// Handle to a table directory; the table may not exist yet
#[derive(Debug, Clone)]
pub struct Table {
    dir: PathBuf,
    name: String,
    log: TransactionLog,
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Table {
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let log = TransactionLog::new(&dir);
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        Self { dir, name, log }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn log(&self) -> &TransactionLog {
        &self.log
    }

    pub fn exists(&self) -> Result<bool, TableError> {
        Ok(self.log.latest_version()?.is_some())
    }

    /// Latest committed version
    pub fn version(&self) -> Result<u64, TableError> {
        Ok(self.snapshot()?.version())
    }

    pub fn snapshot(&self) -> Result<Snapshot, TableError> {
        self.snapshot_at(None)
    }

    pub fn snapshot_at(&self, version: Option<u64>) -> Result<Snapshot, TableError> {
        Snapshot::load(&self.log, version)?.ok_or_else(|| TableError::NotFound(self.name.clone()))
    }

    /// All active rows, in file commit order
    pub fn scan(&self) -> Result<Vec<Record>, TableError> {
        let snapshot = self.snapshot()?;
        let mut rows = Vec::new();
        for file in snapshot.files() {
            rows.extend(data::read_data_file(&self.dir, file)?);
        }
        Ok(rows)
    }

    /// Active rows of partitions matching every filter
    pub fn scan_partitions(&self, filters: &[PartitionFilter]) -> Result<Vec<Record>, TableError> {
        let snapshot = self.snapshot()?;
        for filter in filters {
            filter
                .validate(snapshot.partition_columns())
                .map_err(filter_error)?;
        }
        let mut rows = Vec::new();
        for file in snapshot
            .files()
            .iter()
            .filter(|f| matches_all(filters, &f.partition_values))
        {
            rows.extend(data::read_data_file(&self.dir, file)?);
        }
        Ok(rows)
    }

    /// Commit infos, oldest first
    pub fn history(&self) -> Result<Vec<HistoryEntry>, TableError> {
        Ok(self.snapshot()?.history().to_vec())
    }

    /// Data files physically present, active or not
    pub fn data_file_count(&self) -> Result<usize, TableError> {
        Ok(data::list_data_files(&self.dir)?.len())
    }

    pub fn data_files(&self) -> Result<Vec<String>, TableError> {
        data::list_data_files(&self.dir)
    }

    /// Commit `records` according to `mode`
    pub fn write(
        &self,
        records: &[Record],
        mode: WriteMode,
        options: &WriteOptions,
    ) -> Result<CommitOutcome, TableError> {
        let current = Snapshot::load(&self.log, None)?;

        match (mode, &current) {
            (WriteMode::Error, Some(_)) => {
                return Err(TableError::AlreadyExists(self.name.clone()));
            }
            (WriteMode::Ignore, Some(snapshot)) => {
                tracing::info!(table = %self.name, version = snapshot.version(), "table exists, write ignored");
                return Ok(CommitOutcome {
                    version: None,
                    rows_written: 0,
                    files_added: 0,
                    files_removed: 0,
                });
            }
            _ => {}
        }

        if options.overwrite_schema && mode != WriteMode::Overwrite {
            return Err(TableError::InvalidArgument(
                "overwrite_schema is only valid with overwrite mode".to_string(),
            ));
        }
        if !options.partition_filters.is_empty() && mode != WriteMode::Overwrite {
            return Err(TableError::InvalidArgument(
                "partition_filters are only valid with overwrite mode".to_string(),
            ));
        }
        if options.max_rows_per_file == 0 {
            return Err(TableError::InvalidArgument(
                "max_rows_per_file must be positive".to_string(),
            ));
        }

        let incoming = self.incoming_schema(records, options)?;
        let (metadata, replace_metadata) = match &current {
            None => (self.new_metadata(incoming, options)?, true),
            Some(snapshot) => self.existing_metadata(snapshot, incoming, records, options)?,
        };

        for filter in &options.partition_filters {
            filter
                .validate(&metadata.partition_columns)
                .map_err(filter_error)?;
        }

        let groups = group_by_partition(records, &metadata.partition_columns);
        if let Some(max) = options.max_partitions {
            if groups.len() > max {
                return Err(TableError::InvalidArgument(format!(
                    "write touches {} partitions, more than max_partitions {}",
                    groups.len(),
                    max
                )));
            }
        }
        if !options.partition_filters.is_empty() {
            if let Some(values) = groups
                .keys()
                .find(|values| !matches_all(&options.partition_filters, values))
            {
                return Err(TableError::InvalidFilter(format!(
                    "records in partition {} fall outside the overwritten partitions",
                    data::partition_dir(values)
                )));
            }
        }

        let timestamp = now_millis();
        let removes: Vec<RemoveFile> = match (&current, mode) {
            (Some(snapshot), WriteMode::Overwrite) => snapshot
                .files()
                .iter()
                .filter(|f| matches_all(&options.partition_filters, &f.partition_values))
                .map(|f| RemoveFile::of(f, timestamp, true))
                .collect(),
            _ => Vec::new(),
        };

        let adds = self.write_groups(&groups, options.max_rows_per_file)?;

        let version = current.as_ref().map(|s| s.version() + 1).unwrap_or(0);
        let info = CommitInfo::new(operation_name(mode, current.is_none()), timestamp)
            .with_parameter("mode", mode)
            .with_parameter("partition_by", metadata.partition_columns.join(","))
            .with_read_version(current.as_ref().map(Snapshot::version))
            .with_metric("num_added_files", adds.len() as u64)
            .with_metric("num_removed_files", removes.len() as u64)
            .with_metric("num_output_rows", records.len() as u64);

        let mut actions = Vec::with_capacity(adds.len() + removes.len() + 2);
        if replace_metadata {
            actions.push(Action::Metadata(metadata));
        }
        actions.extend(removes.iter().cloned().map(Action::Remove));
        actions.extend(adds.iter().cloned().map(Action::Add));
        actions.push(Action::CommitInfo(info));

        if let Err(e) = self.log.commit(version, &actions) {
            for add in &adds {
                data::discard_data_file(&self.dir, &add.path);
            }
            return Err(e);
        }

        tracing::info!(
            table = %self.name,
            version,
            mode = %mode,
            rows = records.len(),
            files_added = adds.len(),
            files_removed = removes.len(),
            "write committed"
        );
        Ok(CommitOutcome {
            version: Some(version),
            rows_written: records.len(),
            files_added: adds.len(),
            files_removed: removes.len(),
        })
    }

    fn mismatch(&self, message: impl Into<String>) -> TableError {
        TableError::SchemaMismatch {
            table: self.name.clone(),
            message: message.into(),
        }
    }

    /// Schema the records are written under: explicit or inferred
    fn incoming_schema(
        &self,
        records: &[Record],
        options: &WriteOptions,
    ) -> Result<Schema, TableError> {
        match &options.schema {
            Some(schema) => {
                schema.validate(records).map_err(|m| self.mismatch(m))?;
                Ok(schema.clone())
            }
            None => Schema::infer(records).map_err(|m| self.mismatch(m)),
        }
    }

    fn check_partition_columns(&self, schema: &Schema, columns: &[String]) -> Result<(), TableError> {
        for column in columns {
            if !schema.contains(column) {
                return Err(self.mismatch(format!(
                    "partition column {:?} is not in the schema",
                    column
                )));
            }
        }
        Ok(())
    }

    fn new_metadata(&self, schema: Schema, options: &WriteOptions) -> Result<Metadata, TableError> {
        self.check_partition_columns(&schema, &options.partition_by)?;
        Ok(Metadata {
            id: uuid::Uuid::new_v4().to_string(),
            name: options.name.clone(),
            description: options.description.clone(),
            schema,
            partition_columns: options.partition_by.clone(),
            configuration: options.configuration.clone(),
            created_time: now_millis(),
        })
    }

    /// Metadata for a write to an existing table, and whether it changed
    fn existing_metadata(
        &self,
        snapshot: &Snapshot,
        incoming: Schema,
        records: &[Record],
        options: &WriteOptions,
    ) -> Result<(Metadata, bool), TableError> {
        let current = snapshot
            .metadata()
            .ok_or_else(|| TableError::Corrupt(format!("{} has no metadata", self.name)))?;

        if options.overwrite_schema {
            let mut metadata = self.new_metadata(incoming, options)?;
            metadata.id = current.id.clone();
            metadata.created_time = current.created_time;
            metadata.name = options.name.clone().or_else(|| current.name.clone());
            metadata.description = options
                .description
                .clone()
                .or_else(|| current.description.clone());
            let mut configuration = current.configuration.clone();
            configuration.extend(options.configuration.clone());
            metadata.configuration = configuration;
            return Ok((metadata, true));
        }

        if !options.partition_by.is_empty() && options.partition_by != current.partition_columns {
            return Err(self.mismatch(format!(
                "table is partitioned by [{}], write asked for [{}]",
                current.partition_columns.join(", "),
                options.partition_by.join(", ")
            )));
        }
        let mut metadata = current.clone();
        if current.schema.is_empty() {
            // Created from zero rows: the first rows written decide the schema
            metadata.schema = incoming;
        } else {
            if options.schema.is_some() {
                current
                    .schema
                    .is_compatible_with(&incoming)
                    .map_err(|m| self.mismatch(m))?;
            }
            current.schema.validate(records).map_err(|m| self.mismatch(m))?;
        }
        if let Some(name) = &options.name {
            metadata.name = Some(name.clone());
        }
        if let Some(description) = &options.description {
            metadata.description = Some(description.clone());
        }
        metadata.configuration.extend(options.configuration.clone());
        let changed = &metadata != current;
        Ok((metadata, changed))
    }

    fn write_groups(
        &self,
        groups: &BTreeMap<PartitionValues, Vec<&Record>>,
        max_rows_per_file: usize,
    ) -> Result<Vec<AddFile>, TableError> {
        let mut adds: Vec<AddFile> = Vec::new();
        for (values, rows) in groups {
            for chunk in rows.chunks(max_rows_per_file) {
                let chunk: Vec<Record> = chunk.iter().map(|r| (*r).clone()).collect();
                match data::write_data_file(&self.dir, values, &chunk, true) {
                    Ok(add) => adds.push(add),
                    Err(e) => {
                        for add in &adds {
                            data::discard_data_file(&self.dir, &add.path);
                        }
                        return Err(e);
                    }
                }
            }
        }
        Ok(adds)
    }

    /// Rewrite small files into larger ones; see [`crate::optimize`]
    pub fn compact(
        &self,
        filters: &[PartitionFilter],
        options: &CompactOptions,
    ) -> Result<CompactMetrics, TableError> {
        crate::optimize::compact(self, filters, options)
    }

    /// Delete expired tombstoned files; see [`crate::vacuum`]
    pub fn vacuum(&self, options: &VacuumOptions) -> Result<VacuumMetrics, TableError> {
        crate::vacuum::vacuum(self, options)
    }
}

fn operation_name(mode: WriteMode, creating: bool) -> &'static str {
    match (mode, creating) {
        (_, true) => "CREATE TABLE",
        (WriteMode::Overwrite, false) => "OVERWRITE",
        _ => "WRITE",
    }
}

fn group_by_partition<'a>(
    records: &'a [Record],
    columns: &[String],
) -> BTreeMap<PartitionValues, Vec<&'a Record>> {
    let mut groups: BTreeMap<PartitionValues, Vec<&Record>> = BTreeMap::new();
    for record in records {
        groups
            .entry(partition_values_of(record, columns))
            .or_default()
            .push(record);
    }
    groups
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
