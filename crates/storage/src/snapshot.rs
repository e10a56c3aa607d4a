// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table state materialized from log replay

use crate::action::{Action, AddFile, CommitInfo, Metadata, RemoveFile};
use crate::error::TableError;
use crate::log::TransactionLog;
use std::collections::BTreeMap;

/// A commit as listed by table history
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub version: u64,
    pub info: CommitInfo,
}

/// State of a table as of one version
#[derive(Debug, Clone)]
pub struct Snapshot {
    version: u64,
    metadata: Option<Metadata>,
    /// Active files in the order they were added
    files: Vec<AddFile>,
    /// Removed files by path
    tombstones: BTreeMap<String, RemoveFile>,
    history: Vec<HistoryEntry>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            version: 0,
            metadata: None,
            files: Vec::new(),
            tombstones: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    /// Replay the log up to and including `as_of` (latest when None)
    ///
    /// Returns None when the table has no committed versions.
    pub fn load(log: &TransactionLog, as_of: Option<u64>) -> Result<Option<Self>, TableError> {
        let versions = log.versions()?;
        let Some(&latest) = versions.last() else {
            return Ok(None);
        };
        let target = match as_of {
            Some(v) if v > latest => {
                return Err(TableError::InvalidArgument(format!(
                    "version {} does not exist (latest is {})",
                    v, latest
                )))
            }
            Some(v) => v,
            None => latest,
        };

        let mut snapshot = Self::empty();
        for (expected, &version) in versions.iter().enumerate() {
            if version > target {
                break;
            }
            if version != expected as u64 {
                return Err(TableError::Corrupt(format!(
                    "log has a gap before version {}",
                    version
                )));
            }
            for action in log.read(version)? {
                snapshot.apply(version, &action);
            }
            snapshot.version = version;
        }

        if snapshot.metadata.is_none() {
            return Err(TableError::Corrupt(
                "log does not contain table metadata".to_string(),
            ));
        }
        Ok(Some(snapshot))
    }

    /// Apply one action read from `version`
    pub fn apply(&mut self, version: u64, action: &Action) {
        match action {
            Action::Metadata(metadata) => {
                self.metadata = Some(metadata.clone());
            }

            Action::Add(add) => {
                self.tombstones.remove(&add.path);
                self.files.retain(|f| f.path != add.path);
                self.files.push(add.clone());
            }

            Action::Remove(remove) => {
                self.files.retain(|f| f.path != remove.path);
                self.tombstones.insert(remove.path.clone(), remove.clone());
            }

            Action::CommitInfo(info) => {
                self.history.push(HistoryEntry {
                    version,
                    info: info.clone(),
                });
            }
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn partition_columns(&self) -> &[String] {
        self.metadata
            .as_ref()
            .map(|m| m.partition_columns.as_slice())
            .unwrap_or(&[])
    }

    pub fn files(&self) -> &[AddFile] {
        &self.files
    }

    pub fn is_active(&self, path: &str) -> bool {
        self.files.iter().any(|f| f.path == path)
    }

    pub fn tombstones(&self) -> impl Iterator<Item = &RemoveFile> {
        self.tombstones.values()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn row_count(&self) -> u64 {
        self.files.iter().map(|f| f.rows).sum()
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
