// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data files: one JSON record per line, grouped in `col=value/` directories

use crate::action::{AddFile, PartitionValues};
use crate::error::TableError;
use crate::log::LOG_DIR;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use tlk_core::Record;

pub const DATA_FILE_EXTENSION: &str = "jsonl";
const NULL_PARTITION: &str = "__NULL__";

/// String form of a partition column value
pub fn partition_value(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Partition values of `record` for `columns`
pub fn partition_values_of(record: &Record, columns: &[String]) -> PartitionValues {
    columns
        .iter()
        .map(|c| (c.clone(), partition_value(record.get(c))))
        .collect()
}

fn escape_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// Relative directory for a partition, e.g. `day=mon/region=eu`
pub fn partition_dir(values: &PartitionValues) -> String {
    values
        .iter()
        .map(|(column, value)| {
            let value = match value {
                Some(v) if !v.is_empty() => escape_segment(v),
                _ => NULL_PARTITION.to_string(),
            };
            format!("{}={}", escape_segment(column), value)
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Write `records` as a new data file under `table_dir`
pub fn write_data_file(
    table_dir: &Path,
    partition_values: &PartitionValues,
    records: &[Record],
    data_change: bool,
) -> Result<AddFile, TableError> {
    let mut bytes = Vec::new();
    for record in records {
        serde_json::to_writer(&mut bytes, record)?;
        bytes.push(b'\n');
    }

    let name = format!("part-{}.{}", uuid::Uuid::new_v4(), DATA_FILE_EXTENSION);
    let dir = partition_dir(partition_values);
    let path = if dir.is_empty() {
        name
    } else {
        format!("{}/{}", dir, name)
    };

    let full = table_dir.join(&path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().write(true).create_new(true).open(&full)?;
    file.write_all(&bytes)?;
    file.sync_all()?;

    Ok(AddFile {
        path,
        size: bytes.len() as u64,
        rows: records.len() as u64,
        partition_values: partition_values.clone(),
        modification_time: now_millis(),
        data_change,
        checksum: crc32fast::hash(&bytes),
    })
}

/// Read the records of an active file, verifying size and checksum
pub fn read_data_file(table_dir: &Path, add: &AddFile) -> Result<Vec<Record>, TableError> {
    let bytes = match fs::read(table_dir.join(&add.path)) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(TableError::Corrupt(format!(
                "active data file {} is missing",
                add.path
            )))
        }
        Err(e) => return Err(e.into()),
    };
    if bytes.len() as u64 != add.size || crc32fast::hash(&bytes) != add.checksum {
        return Err(TableError::Corrupt(format!(
            "checksum mismatch for {}",
            add.path
        )));
    }

    let mut records = Vec::with_capacity(add.rows as usize);
    for line in bytes.split(|b| *b == b'\n') {
        if line.is_empty() {
            continue;
        }
        let record: Record = serde_json::from_slice(line)
            .map_err(|e| TableError::Corrupt(format!("{}: {}", add.path, e)))?;
        records.push(record);
    }
    Ok(records)
}

/// Remove a data file written by an aborted commit
pub fn discard_data_file(table_dir: &Path, path: &str) {
    if let Err(e) = fs::remove_file(table_dir.join(path)) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path, error = %e, "failed to discard data file");
        }
    }
}

/// Relative paths of every data file on disk, sorted
pub fn list_data_files(table_dir: &Path) -> Result<Vec<String>, TableError> {
    let mut found = Vec::new();
    walk(table_dir, table_dir, &mut found)?;
    found.sort();
    Ok(found)
}

fn walk(root: &Path, dir: &Path, found: &mut Vec<String>) -> Result<(), TableError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            if dir == root && entry.file_name() == LOG_DIR {
                continue;
            }
            walk(root, &path, found)?;
        } else if path.extension().is_some_and(|e| e == DATA_FILE_EXTENSION) {
            if let Ok(relative) = path.strip_prefix(root) {
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                found.push(relative);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "data_tests.rs"]
mod tests;
