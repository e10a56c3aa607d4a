// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compaction: bin-pack small data files into files near a target size
//!
//! Planning groups the active files of each matching partition into bins no
//! larger than the target size. Every bin of two or more files is rewritten
//! as one file; the rewrites run on a bounded set of threads and land in a
//! single commit that does not change table content.

use crate::action::{Action, AddFile, CommitInfo, PartitionValues, RemoveFile};
use crate::data;
use crate::error::{filter_error, TableError};
use crate::snapshot::Snapshot;
use crate::table::{now_millis, Table};
use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tlk_core::request::matches_all;
use tlk_core::{CompactMetrics, CompactOptions, PartitionFilter};

/// Table configuration key for the compaction target size in bytes
pub const TARGET_FILE_SIZE_KEY: &str = "tlk.targetFileSize";
pub const DEFAULT_TARGET_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// Files of one partition to be rewritten together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionTask {
    pub partition_values: PartitionValues,
    pub files: Vec<AddFile>,
}

impl CompactionTask {
    fn size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompactionPlan {
    pub read_version: u64,
    pub target_size: u64,
    pub tasks: Vec<CompactionTask>,
    pub total_considered_files: usize,
    pub total_files_skipped: usize,
}

struct CandidateBin {
    files: Vec<AddFile>,
    size: u64,
}

impl CandidateBin {
    fn new() -> Self {
        Self {
            files: Vec::new(),
            size: 0,
        }
    }

    fn fits(&self, file: &AddFile, target: u64) -> bool {
        self.files.is_empty() || self.size + file.size <= target
    }

    fn push(&mut self, file: AddFile) {
        self.size += file.size;
        self.files.push(file);
    }

    /// A bin of one file gains nothing from a rewrite
    fn is_noop(&self) -> bool {
        self.files.len() < 2
    }
}

fn target_size(snapshot: &Snapshot, requested: Option<u64>) -> Result<u64, TableError> {
    if let Some(size) = requested {
        return Ok(size);
    }
    let configured = snapshot
        .metadata()
        .and_then(|m| m.config(TARGET_FILE_SIZE_KEY));
    match configured {
        None => Ok(DEFAULT_TARGET_FILE_SIZE),
        Some(raw) => raw.trim().parse().map_err(|_| {
            TableError::InvalidArgument(format!(
                "table configuration {} = {:?} is not a byte count",
                TARGET_FILE_SIZE_KEY, raw
            ))
        }),
    }
}

/// Decide which files to rewrite
pub fn plan_compaction(
    table: &Table,
    filters: &[PartitionFilter],
    options: &CompactOptions,
) -> Result<CompactionPlan, TableError> {
    let snapshot = table.snapshot()?;
    for filter in filters {
        filter
            .validate(snapshot.partition_columns())
            .map_err(filter_error)?;
    }
    let target = target_size(&snapshot, options.target_size)?;
    if target == 0 {
        return Err(TableError::InvalidArgument(
            "target_size must be positive".to_string(),
        ));
    }

    let mut partitions: BTreeMap<PartitionValues, Vec<AddFile>> = BTreeMap::new();
    for file in snapshot
        .files()
        .iter()
        .filter(|f| matches_all(filters, &f.partition_values))
    {
        partitions
            .entry(file.partition_values.clone())
            .or_default()
            .push(file.clone());
    }

    let mut plan = CompactionPlan {
        read_version: snapshot.version(),
        target_size: target,
        ..CompactionPlan::default()
    };

    for (values, mut files) in partitions {
        plan.total_considered_files += files.len();
        files.sort_by(|a, b| a.size.cmp(&b.size).then_with(|| a.path.cmp(&b.path)));

        let mut bins = Vec::new();
        let mut current = CandidateBin::new();
        for file in files {
            if file.size >= target {
                plan.total_files_skipped += 1;
                continue;
            }
            if !current.fits(&file, target) {
                bins.push(std::mem::replace(&mut current, CandidateBin::new()));
            }
            current.push(file);
        }
        bins.push(current);

        for bin in bins {
            if bin.is_noop() {
                plan.total_files_skipped += bin.files.len();
            } else {
                plan.tasks.push(CompactionTask {
                    partition_values: values.clone(),
                    files: bin.files,
                });
            }
        }
    }
    Ok(plan)
}

fn rewrite(table: &Table, task: &CompactionTask) -> Result<AddFile, TableError> {
    let mut rows = Vec::new();
    for file in &task.files {
        rows.extend(data::read_data_file(table.dir(), file)?);
    }
    data::write_data_file(table.dir(), &task.partition_values, &rows, false)
}

/// Run every task on at most `threads` threads, preserving task order
fn rewrite_all(
    table: &Table,
    tasks: &[CompactionTask],
    threads: usize,
) -> Vec<Result<AddFile, TableError>> {
    let next = AtomicUsize::new(0);
    let results: Mutex<Vec<Option<Result<AddFile, TableError>>>> =
        Mutex::new((0..tasks.len()).map(|_| None).collect());

    std::thread::scope(|scope| {
        for _ in 0..threads.min(tasks.len()) {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::SeqCst);
                let Some(task) = tasks.get(index) else {
                    break;
                };
                let result = rewrite(table, task);
                let mut results = results.lock().unwrap_or_else(|e| e.into_inner());
                results[index] = Some(result);
            });
        }
    });

    results
        .into_inner()
        .unwrap_or_else(|e| e.into_inner())
        .into_iter()
        .map(|r| {
            r.unwrap_or_else(|| Err(TableError::Corrupt("compaction task did not run".to_string())))
        })
        .collect()
}

/// Plan, rewrite and commit one compaction pass
pub fn compact(
    table: &Table,
    filters: &[PartitionFilter],
    options: &CompactOptions,
) -> Result<CompactMetrics, TableError> {
    let plan = plan_compaction(table, filters, options)?;
    let mut metrics = CompactMetrics {
        read_version: plan.read_version,
        total_considered_files: plan.total_considered_files,
        total_files_skipped: plan.total_files_skipped,
        ..CompactMetrics::default()
    };
    if plan.tasks.is_empty() {
        tracing::debug!(table = %table.name(), version = plan.read_version, "nothing to compact");
        return Ok(metrics);
    }

    let threads = options
        .max_concurrent_tasks
        .or_else(|| std::thread::available_parallelism().ok().map(NonZeroUsize::get))
        .unwrap_or(1)
        .max(1);
    tracing::debug!(
        table = %table.name(),
        tasks = plan.tasks.len(),
        threads,
        target_size = plan.target_size,
        "compacting"
    );

    let results = rewrite_all(table, &plan.tasks, threads);
    let mut adds = Vec::with_capacity(results.len());
    let mut failure = None;
    for result in results {
        match result {
            Ok(add) => adds.push(add),
            Err(e) if failure.is_none() => failure = Some(e),
            Err(_) => {}
        }
    }
    if let Some(e) = failure {
        for add in &adds {
            data::discard_data_file(table.dir(), &add.path);
        }
        return Err(e);
    }

    let timestamp = now_millis();
    let removes: Vec<RemoveFile> = plan
        .tasks
        .iter()
        .flat_map(|t| t.files.iter())
        .map(|f| RemoveFile::of(f, timestamp, false))
        .collect();
    let partitions: BTreeSet<&PartitionValues> =
        plan.tasks.iter().map(|t| &t.partition_values).collect();

    let version = plan.read_version + 1;
    let info = CommitInfo::new("OPTIMIZE", timestamp)
        .with_parameter("target_size", plan.target_size)
        .with_parameter("filters", filters.len())
        .with_read_version(Some(plan.read_version))
        .with_metric("num_added_files", adds.len() as u64)
        .with_metric("num_removed_files", removes.len() as u64)
        .with_metric(
            "num_rewritten_bytes",
            plan.tasks.iter().map(CompactionTask::size).sum(),
        );

    let mut actions: Vec<Action> = removes.iter().cloned().map(Action::Remove).collect();
    actions.extend(adds.iter().cloned().map(Action::Add));
    actions.push(Action::CommitInfo(info));

    if let Err(e) = table.log().commit(version, &actions) {
        for add in &adds {
            data::discard_data_file(table.dir(), &add.path);
        }
        return Err(e);
    }

    metrics.committed_version = Some(version);
    metrics.files_added = adds.len();
    metrics.files_removed = removes.len();
    metrics.partitions_optimized = partitions.len();
    tracing::info!(
        table = %table.name(),
        version,
        files_added = metrics.files_added,
        files_removed = metrics.files_removed,
        "compaction committed"
    );
    Ok(metrics)
}

#[cfg(test)]
#[path = "optimize_tests.rs"]
mod tests;
