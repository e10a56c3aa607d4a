// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table store over Delta Lake tables
//!
//! Each table is a Delta table in a subdirectory of the root. Records are
//! converted to Arrow batches against the table's schema before writing.

use async_trait::async_trait;
use deltalake::arrow::array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use deltalake::arrow::compute::{cast_with_options, CastOptions};
use deltalake::arrow::datatypes::{DataType, Field, Schema as ArrowSchema, SchemaRef};
use deltalake::arrow::record_batch::RecordBatch;
use deltalake::delta_datafusion::DataFusionMixins;
use deltalake::operations::write::SchemaMode;
use deltalake::protocol::SaveMode;
use deltalake::{DeltaOps, DeltaTable, DeltaTableError};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tlk_core::{
    Column, ColumnType, CompactMetrics, CompactOptions, FilterValue, PartitionFilter, Record,
    Schema, StorageAdapter, StorageConfig, StorageError, TableName, VacuumMetrics, VacuumOptions,
    Value, WriteMode, WriteOptions, WriteOutcome, WriteRequest,
};
use tlk_storage::data::partition_values_of;

const DELTA_LOG_DIR: &str = "_delta_log";

/// Delta tables stored as subdirectories of one root directory
#[derive(Clone, Debug)]
pub struct DeltaTableStore {
    root: PathBuf,
}

impl DeltaTableStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_dir(&self, name: &TableName) -> PathBuf {
        self.root.join(name.as_str())
    }

    /// Load the latest version of a table
    ///
    /// With `create` unset a missing table is an error and nothing is
    /// created on disk; with it set the directory is made and an
    /// uninitialized table (version -1) is returned.
    pub async fn open(&self, name: &TableName, create: bool) -> Result<DeltaTable, StorageError> {
        let dir = self.table_dir(name);
        if !create && !dir.join(DELTA_LOG_DIR).is_dir() {
            return Err(StorageError::TableNotFound(name.to_string()));
        }
        tokio::fs::create_dir_all(&dir).await?;
        let dir = tokio::fs::canonicalize(&dir).await?;
        let ops = DeltaOps::try_from_uri(dir.to_string_lossy())
            .await
            .map_err(|e| delta_error(name, e))?;
        let table = ops.0;
        if !create && table.version() < 0 {
            return Err(StorageError::TableNotFound(name.to_string()));
        }
        Ok(table)
    }
}

/// Map an engine error onto the storage taxonomy
fn delta_error(name: &TableName, e: DeltaTableError) -> StorageError {
    match e {
        DeltaTableError::NotATable(_) => StorageError::TableNotFound(name.to_string()),
        DeltaTableError::VersionAlreadyExists(version) => StorageError::ConcurrentModification {
            table: name.to_string(),
            version: u64::try_from(version).unwrap_or_default(),
        },
        DeltaTableError::SchemaMismatch { msg } => StorageError::SchemaMismatch {
            table: name.to_string(),
            message: msg,
        },
        DeltaTableError::InvalidPartitionFilter { partition_filter } => {
            StorageError::InvalidFilter(partition_filter)
        }
        DeltaTableError::Io { source } => StorageError::Io(source),
        other => StorageError::Engine(other.to_string()),
    }
}

fn mismatch(name: &TableName, message: impl Into<String>) -> StorageError {
    StorageError::SchemaMismatch {
        table: name.to_string(),
        message: message.into(),
    }
}

fn version_of(table: &DeltaTable) -> u64 {
    u64::try_from(table.version()).unwrap_or_default()
}

fn active_files(name: &TableName, table: &DeltaTable) -> Result<BTreeSet<String>, StorageError> {
    if table.version() < 0 {
        return Ok(BTreeSet::new());
    }
    Ok(table
        .get_files_iter()
        .map_err(|e| delta_error(name, e))?
        .map(|path| path.to_string())
        .collect())
}

fn save_mode(mode: WriteMode) -> SaveMode {
    match mode {
        WriteMode::Error => SaveMode::ErrorIfExists,
        WriteMode::Append => SaveMode::Append,
        WriteMode::Overwrite => SaveMode::Overwrite,
        WriteMode::Ignore => SaveMode::Ignore,
    }
}

fn arrow_type(data_type: ColumnType) -> DataType {
    match data_type {
        ColumnType::Boolean => DataType::Boolean,
        ColumnType::Integer => DataType::Int64,
        ColumnType::Float => DataType::Float64,
        ColumnType::String => DataType::Utf8,
    }
}

fn column_type(data_type: &DataType) -> Option<ColumnType> {
    match data_type {
        DataType::Boolean => Some(ColumnType::Boolean),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => Some(ColumnType::Integer),
        DataType::Float16 | DataType::Float32 | DataType::Float64 => Some(ColumnType::Float),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => Some(ColumnType::String),
        _ => None,
    }
}

fn to_arrow(schema: &Schema) -> SchemaRef {
    Arc::new(ArrowSchema::new(
        schema
            .columns
            .iter()
            .map(|c| Field::new(&c.name, arrow_type(c.data_type), c.nullable))
            .collect::<Vec<_>>(),
    ))
}

/// Record-level view of a table's Arrow schema
fn from_arrow(name: &TableName, arrow: &ArrowSchema) -> Result<Schema, StorageError> {
    let columns = arrow
        .fields()
        .iter()
        .map(|field| {
            let data_type = column_type(field.data_type()).ok_or_else(|| {
                mismatch(
                    name,
                    format!(
                        "column {:?} has unsupported type {}",
                        field.name(),
                        field.data_type()
                    ),
                )
            })?;
            Ok(Column {
                name: field.name().clone(),
                data_type,
                nullable: field.is_nullable(),
            })
        })
        .collect::<Result<Vec<_>, StorageError>>()?;
    Ok(Schema::new(columns))
}

fn column_array(column: &Column, records: &[Record]) -> Result<ArrayRef, String> {
    let values = records
        .iter()
        .map(|r| r.get(&column.name).filter(|v| !v.is_null()));
    let wrong = |v: &Value| format!("column {:?} cannot hold {}", column.name, v);

    let array: ArrayRef = match column.data_type {
        ColumnType::Boolean => Arc::new(BooleanArray::from(
            values
                .map(|v| v.map(|v| v.as_bool().ok_or_else(|| wrong(v))).transpose())
                .collect::<Result<Vec<_>, _>>()?,
        )),
        ColumnType::Integer => Arc::new(Int64Array::from(
            values
                .map(|v| v.map(|v| v.as_i64().ok_or_else(|| wrong(v))).transpose())
                .collect::<Result<Vec<_>, _>>()?,
        )),
        ColumnType::Float => Arc::new(Float64Array::from(
            values
                .map(|v| v.map(|v| v.as_f64().ok_or_else(|| wrong(v))).transpose())
                .collect::<Result<Vec<_>, _>>()?,
        )),
        ColumnType::String => Arc::new(StringArray::from(
            values
                .map(|v| {
                    v.map(|v| v.as_str().map(str::to_string).ok_or_else(|| wrong(v)))
                        .transpose()
                })
                .collect::<Result<Vec<_>, _>>()?,
        )),
    };
    Ok(array)
}

/// Build one Arrow batch per `rows_per_batch` records, typed by `target`
///
/// Always yields at least one batch so a zero-row write still carries the
/// schema.
fn record_batches(
    schema: &Schema,
    target: &SchemaRef,
    records: &[Record],
    rows_per_batch: usize,
) -> Result<Vec<RecordBatch>, String> {
    if records.is_empty() {
        return Ok(vec![RecordBatch::new_empty(target.clone())]);
    }
    let cast = CastOptions {
        safe: false,
        ..CastOptions::default()
    };
    records
        .chunks(rows_per_batch)
        .map(|chunk| {
            let columns = target
                .fields()
                .iter()
                .map(|field| {
                    let column = schema
                        .column(field.name())
                        .ok_or_else(|| format!("column {:?} missing from schema", field.name()))?;
                    let array = column_array(column, chunk)?;
                    if array.data_type() == field.data_type() {
                        return Ok(array);
                    }
                    cast_with_options(&array, field.data_type(), &cast)
                        .map_err(|e| format!("column {:?}: {}", field.name(), e))
                })
                .collect::<Result<Vec<_>, String>>()?;
            RecordBatch::try_new(target.clone(), columns).map_err(|e| e.to_string())
        })
        .collect()
}

fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// SQL predicate selecting the partitions an overwrite replaces
fn replace_predicate(filters: &[PartitionFilter]) -> String {
    filters
        .iter()
        .map(|f| {
            let column = format!("\"{}\"", f.column.replace('"', "\"\""));
            match &f.value {
                FilterValue::Single(v) => format!("{} {} {}", column, f.op, sql_literal(v)),
                FilterValue::List(vs) => format!(
                    "{} {} ({})",
                    column,
                    f.op.to_string().to_ascii_uppercase(),
                    vs.iter().map(|v| sql_literal(v)).collect::<Vec<_>>().join(", ")
                ),
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn engine_filters(
    filters: &[PartitionFilter],
) -> Result<Vec<deltalake::PartitionFilter>, StorageError> {
    filters
        .iter()
        .map(|f| {
            let op = f.op.to_string();
            let converted = match &f.value {
                FilterValue::Single(v) => deltalake::PartitionFilter::try_from((
                    f.column.as_str(),
                    op.as_str(),
                    v.as_str(),
                )),
                FilterValue::List(vs) => {
                    let values: Vec<&str> = vs.iter().map(String::as_str).collect();
                    deltalake::PartitionFilter::try_from((
                        f.column.as_str(),
                        op.as_str(),
                        values.as_slice(),
                    ))
                }
            };
            converted.map_err(|e| StorageError::InvalidFilter(format!("{}: {}", f, e)))
        })
        .collect()
}

/// Partition columns and record schema a write targets
struct WriteTarget {
    schema: Schema,
    arrow: SchemaRef,
    partition_columns: Vec<String>,
}

fn write_target(
    name: &TableName,
    table: &DeltaTable,
    records: &[Record],
    options: &WriteOptions,
) -> Result<WriteTarget, StorageError> {
    if table.version() >= 0 && !options.overwrite_schema {
        let snapshot = table.snapshot().map_err(|e| delta_error(name, e))?;
        let arrow = snapshot.arrow_schema().map_err(|e| delta_error(name, e))?;
        return Ok(WriteTarget {
            schema: from_arrow(name, &arrow)?,
            arrow,
            partition_columns: snapshot.metadata().partition_columns.clone(),
        });
    }

    let schema = match &options.schema {
        Some(schema) => schema.clone(),
        None => Schema::infer(records).map_err(|m| mismatch(name, m))?,
    };
    if schema.is_empty() {
        return Err(StorageError::InvalidConfiguration(format!(
            "cannot create {} from zero rows without a schema",
            name
        )));
    }
    Ok(WriteTarget {
        arrow: to_arrow(&schema),
        schema,
        partition_columns: options.partition_by.clone(),
    })
}

fn check_partitions(
    records: &[Record],
    partition_columns: &[String],
    options: &WriteOptions,
) -> Result<(), StorageError> {
    for filter in &options.partition_filters {
        filter.validate(partition_columns)?;
    }
    let groups: BTreeSet<_> = records
        .iter()
        .map(|r| partition_values_of(r, partition_columns))
        .collect();
    if let Some(max) = options.max_partitions {
        if groups.len() > max {
            return Err(StorageError::InvalidConfiguration(format!(
                "write touches {} partitions, more than max_partitions {}",
                groups.len(),
                max
            )));
        }
    }
    if let Some(outside) = groups
        .iter()
        .find(|values| !options.partition_filters.iter().all(|f| f.matches(values)))
    {
        return Err(StorageError::InvalidFilter(format!(
            "records in partition {:?} fall outside the overwritten partitions",
            outside
        )));
    }
    Ok(())
}

#[async_trait]
impl StorageAdapter for DeltaTableStore {
    async fn write(&self, request: WriteRequest) -> Result<WriteOutcome, StorageError> {
        let (name, records, mode, options) = request.into_parts();
        if options.max_rows_per_file == 0 {
            return Err(StorageError::InvalidConfiguration(
                "max_rows_per_file must be positive".to_string(),
            ));
        }
        if options.overwrite_schema && mode != WriteMode::Overwrite {
            return Err(StorageError::InvalidConfiguration(format!(
                "overwrite_schema applies to overwrite, not {}",
                mode
            )));
        }
        if !options.partition_filters.is_empty() && mode != WriteMode::Overwrite {
            return Err(StorageError::InvalidConfiguration(format!(
                "partition filters apply to overwrite, not {}",
                mode
            )));
        }

        let table = self.open(&name, true).await?;
        if table.version() >= 0 {
            match mode {
                WriteMode::Error => return Err(StorageError::TableAlreadyExists(name.to_string())),
                WriteMode::Ignore => {
                    tracing::debug!(table = %name, "table exists, ignore write skipped");
                    return Ok(WriteOutcome::skipped(name));
                }
                WriteMode::Append | WriteMode::Overwrite => {}
            }
        }

        let target = write_target(&name, &table, &records, &options)?;
        target.schema.validate(&records).map_err(|m| mismatch(&name, m))?;
        check_partitions(&records, &target.partition_columns, &options)?;
        let batches = record_batches(
            &target.schema,
            &target.arrow,
            &records,
            options.max_rows_per_file,
        )
        .map_err(|m| mismatch(&name, m))?;

        let before = active_files(&name, &table)?;
        let mut builder = DeltaOps(table)
            .write(batches)
            .with_save_mode(save_mode(mode))
            .with_write_batch_size(options.max_rows_per_file);
        if !options.partition_by.is_empty() {
            builder = builder.with_partition_columns(options.partition_by.clone());
        }
        if let Some(table_name) = &options.name {
            builder = builder.with_table_name(table_name.clone());
        }
        if let Some(description) = &options.description {
            builder = builder.with_description(description.clone());
        }
        if !options.configuration.is_empty() {
            builder = builder.with_configuration(options.configuration.clone());
        }
        if options.overwrite_schema {
            builder = builder.with_schema_mode(SchemaMode::Overwrite);
        }
        if !options.partition_filters.is_empty() {
            builder = builder.with_replace_where(replace_predicate(&options.partition_filters));
        }
        let table = builder.await.map_err(|e| delta_error(&name, e))?;

        let after = active_files(&name, &table)?;
        let outcome = WriteOutcome {
            version: Some(version_of(&table)),
            rows_written: records.len(),
            files_added: after.difference(&before).count(),
            files_removed: before.difference(&after).count(),
            table: name,
        };
        tracing::debug!(
            table = %outcome.table,
            version = ?outcome.version,
            files_added = outcome.files_added,
            "delta write committed"
        );
        Ok(outcome)
    }

    async fn compact(
        &self,
        name: &TableName,
        filters: &[PartitionFilter],
        options: &CompactOptions,
    ) -> Result<CompactMetrics, StorageError> {
        let table = self.open(name, false).await?;
        let snapshot = table.snapshot().map_err(|e| delta_error(name, e))?;
        for filter in filters {
            filter.validate(&snapshot.metadata().partition_columns)?;
        }
        let filters = engine_filters(filters)?;
        let read_version = version_of(&table);

        let mut builder = DeltaOps(table).optimize().with_filters(&filters);
        if let Some(target) = options.target_size {
            let target = i64::try_from(target).map_err(|_| {
                StorageError::InvalidConfiguration(format!("target_size {} is too large", target))
            })?;
            builder = builder.with_target_size(target);
        }
        if let Some(tasks) = options.max_concurrent_tasks {
            builder = builder.with_max_concurrent_tasks(tasks);
        }
        let (table, metrics) = builder.await.map_err(|e| delta_error(name, e))?;

        let committed = version_of(&table);
        Ok(CompactMetrics {
            read_version,
            committed_version: (committed != read_version).then_some(committed),
            files_added: metrics.num_files_added as usize,
            files_removed: metrics.num_files_removed as usize,
            partitions_optimized: metrics.partitions_optimized as usize,
            total_considered_files: metrics.total_considered_files,
            total_files_skipped: metrics.total_files_skipped,
        })
    }

    async fn vacuum(
        &self,
        name: &TableName,
        options: &VacuumOptions,
    ) -> Result<VacuumMetrics, StorageError> {
        let table = self.open(name, false).await?;
        let snapshot = table.snapshot().map_err(|e| delta_error(name, e))?;
        let minimum = snapshot.table_config().deleted_file_retention_duration();
        if let Some(requested) = options.retention {
            if options.enforce_retention_duration && requested < minimum {
                return Err(StorageError::InvalidRetention { requested, minimum });
            }
        }
        let latest = version_of(&table);
        if let Some(as_of) = options.as_of_version.filter(|v| *v != latest) {
            // Files still referenced by newer versions must survive
            tracing::debug!(table = %name, as_of, latest, "vacuuming latest snapshot instead");
        }

        let mut builder = DeltaOps(table)
            .vacuum()
            .with_dry_run(options.dry_run)
            .with_enforce_retention_duration(options.enforce_retention_duration);
        if let Some(retention) = options.retention {
            let retention = chrono::Duration::from_std(retention).map_err(|_| {
                StorageError::InvalidConfiguration(format!("retention {:?} is too large", retention))
            })?;
            builder = builder.with_retention_period(retention);
        }
        let (_, metrics) = builder.await.map_err(|e| delta_error(name, e))?;

        Ok(VacuumMetrics {
            dry_run: metrics.dry_run,
            files_deleted: metrics.files_deleted,
        })
    }
}

#[cfg(test)]
#[path = "delta_tests.rs"]
mod tests;
