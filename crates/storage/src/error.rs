// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table store errors

use std::io;
use std::time::Duration;
use thiserror::Error;
use tlk_core::StorageError;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("table not found: {0}")]
    NotFound(String),
    #[error("table already exists: {0}")]
    AlreadyExists(String),
    #[error("schema mismatch for {table}: {message}")]
    SchemaMismatch { table: String, message: String },
    #[error("version {version} of {table} was committed by another writer")]
    ConcurrentModification { table: String, version: u64 },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid partition filter: {0}")]
    InvalidFilter(String),
    #[error("retention {requested:?} is below the table minimum of {minimum:?}")]
    InvalidRetention {
        requested: Duration,
        minimum: Duration,
    },
    #[error("corrupt table data: {0}")]
    Corrupt(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<TableError> for StorageError {
    fn from(e: TableError) -> Self {
        match e {
            TableError::NotFound(table) => StorageError::TableNotFound(table),
            TableError::AlreadyExists(table) => StorageError::TableAlreadyExists(table),
            TableError::SchemaMismatch { table, message } => {
                StorageError::SchemaMismatch { table, message }
            }
            TableError::ConcurrentModification { table, version } => {
                StorageError::ConcurrentModification { table, version }
            }
            TableError::InvalidArgument(msg) => StorageError::InvalidConfiguration(msg),
            TableError::InvalidFilter(msg) => StorageError::InvalidFilter(msg),
            TableError::InvalidRetention { requested, minimum } => {
                StorageError::InvalidRetention { requested, minimum }
            }
            TableError::Corrupt(msg) => StorageError::Corrupt(msg),
            TableError::Io(e) => StorageError::Io(e),
            TableError::Json(e) => StorageError::Serialization(e.to_string()),
        }
    }
}

/// Map a filter validation failure from the shared request types
pub(crate) fn filter_error(e: StorageError) -> TableError {
    match e {
        StorageError::InvalidFilter(msg) => TableError::InvalidFilter(msg),
        other => TableError::InvalidArgument(other.to_string()),
    }
}
