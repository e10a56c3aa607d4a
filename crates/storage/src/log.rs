// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Versioned transaction log
//!
//! Version `n` lives in `_tlk_log/{n:020}.json`. A version file is published
//! by hard-linking a fully written temporary file into place, so it appears
//! atomically and only once: the second writer of the same version fails.

use crate::action::Action;
use crate::error::TableError;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

pub const LOG_DIR: &str = "_tlk_log";

/// Transaction log of one table
#[derive(Debug, Clone)]
pub struct TransactionLog {
    dir: PathBuf,
    table: String,
}

impl TransactionLog {
    pub fn new(table_dir: &Path) -> Self {
        let table = table_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| table_dir.display().to_string());
        Self {
            dir: table_dir.join(LOG_DIR),
            table,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn version_path(&self, version: u64) -> PathBuf {
        self.dir.join(format!("{:020}.json", version))
    }

    /// Committed versions in ascending order
    pub fn versions(&self) -> Result<Vec<u64>, TableError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".json") {
                if stem.len() == 20 {
                    if let Ok(version) = stem.parse::<u64>() {
                        versions.push(version);
                    }
                }
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    pub fn latest_version(&self) -> Result<Option<u64>, TableError> {
        Ok(self.versions()?.last().copied())
    }

    /// Read the actions of one version
    pub fn read(&self, version: u64) -> Result<Vec<Action>, TableError> {
        let file = match File::open(self.version_path(version)) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(TableError::Corrupt(format!(
                    "{}: version {} is missing from the log",
                    self.table, version
                )))
            }
            Err(e) => return Err(e.into()),
        };

        let reader = BufReader::new(file);
        let mut actions = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let action: Action = serde_json::from_str(&line).map_err(|e| {
                TableError::Corrupt(format!(
                    "{}: version {} line {}: {}",
                    self.table,
                    version,
                    line_no + 1,
                    e
                ))
            })?;
            actions.push(action);
        }
        Ok(actions)
    }

    /// Publish `actions` as `version`
    ///
    /// Fails with [`TableError::ConcurrentModification`] if the version
    /// already exists.
    pub fn commit(&self, version: u64, actions: &[Action]) -> Result<(), TableError> {
        fs::create_dir_all(&self.dir)?;

        let tmp = self
            .dir
            .join(format!(".{:020}.{}.tmp", version, uuid::Uuid::new_v4()));
        let written = self.write_tmp(&tmp, actions);
        let published = written.and_then(|()| match fs::hard_link(&tmp, self.version_path(version)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(TableError::ConcurrentModification {
                    table: self.table.clone(),
                    version,
                })
            }
            Err(e) => Err(e.into()),
        });

        if let Err(e) = fs::remove_file(&tmp) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %tmp.display(), error = %e, "failed to remove temporary commit file");
            }
        }
        published?;

        tracing::debug!(table = %self.table, version, actions = actions.len(), "committed");
        Ok(())
    }

    fn write_tmp(&self, path: &Path, actions: &[Action]) -> Result<(), TableError> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        for action in actions {
            let line = serde_json::to_string(action)?;
            writeln!(file, "{}", line)?;
        }
        file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
