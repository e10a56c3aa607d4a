// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vacuum: delete data files that left the table long enough ago
//!
//! Only files tombstoned in the chosen snapshot are candidates. Active files
//! and files the log never mentioned are never deleted.

use crate::data;
use crate::error::TableError;
use crate::table::{now_millis, Table};
use std::fs;
use std::io;
use std::time::Duration;
use tlk_core::{VacuumMetrics, VacuumOptions};

/// Table configuration key for the minimum vacuum retention (humantime)
pub const RETENTION_KEY: &str = "tlk.deletedFileRetentionDuration";
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(168 * 60 * 60);

/// Retention a table enforces as a minimum
pub fn minimum_retention(table: &Table) -> Result<Duration, TableError> {
    let snapshot = table.snapshot()?;
    match snapshot.metadata().and_then(|m| m.config(RETENTION_KEY)) {
        None => Ok(DEFAULT_RETENTION),
        Some(raw) => humantime::parse_duration(raw.trim()).map_err(|e| {
            TableError::InvalidArgument(format!(
                "table configuration {} = {:?}: {}",
                RETENTION_KEY, raw, e
            ))
        }),
    }
}

/// Files a vacuum with `options` would delete
pub fn plan_vacuum(table: &Table, options: &VacuumOptions) -> Result<Vec<String>, TableError> {
    let minimum = minimum_retention(table)?;
    let retention = options.retention.unwrap_or(minimum);
    if options.enforce_retention_duration && retention < minimum {
        return Err(TableError::InvalidRetention {
            requested: retention,
            minimum,
        });
    }

    let latest = table.snapshot()?;
    let snapshot = match options.as_of_version {
        Some(version) if version != latest.version() => table.snapshot_at(Some(version))?,
        _ => latest.clone(),
    };

    let retention_ms = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
    let cutoff = now_millis().saturating_sub(retention_ms);
    let on_disk = data::list_data_files(table.dir())?;

    let mut expired: Vec<String> = snapshot
        .tombstones()
        .filter(|t| t.deletion_timestamp <= cutoff)
        .filter(|t| !latest.is_active(&t.path))
        .filter(|t| on_disk.binary_search(&t.path).is_ok())
        .map(|t| t.path.clone())
        .collect();
    expired.sort();
    Ok(expired)
}

pub fn vacuum(table: &Table, options: &VacuumOptions) -> Result<VacuumMetrics, TableError> {
    let expired = plan_vacuum(table, options)?;

    if options.dry_run {
        tracing::info!(
            table = %table.name(),
            files = expired.len(),
            "vacuum dry run"
        );
        return Ok(VacuumMetrics {
            dry_run: true,
            files_deleted: expired,
        });
    }

    let mut deleted = Vec::with_capacity(expired.len());
    for path in expired {
        match fs::remove_file(table.dir().join(&path)) {
            Ok(()) => deleted.push(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    tracing::info!(table = %table.name(), files = deleted.len(), "vacuum deleted files");
    Ok(VacuumMetrics {
        dry_run: false,
        files_deleted: deleted,
    })
}

#[cfg(test)]
#[path = "vacuum_tests.rs"]
mod tests;
