// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for lock-guarded critical sections
//!
//! Two independent failure domains meet here: the lock service ([`LockError`])
//! and the table store ([`StorageError`]). [`GuardError`] composes them into the
//! single result a caller of a critical section sees.

use crate::key::LockKey;
use std::time::Duration;
use thiserror::Error;

/// A table name failed validation
#[derive(Debug, Clone, Error)]
#[error("invalid table name {name:?}: {reason}")]
pub struct InvalidName {
    pub name: String,
    pub reason: &'static str,
}

/// Errors raised by a lock service
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock {key} is not held")]
    NotHeld { key: String },
    #[error("lock {key} is no longer owned by this handle")]
    NotOwned { key: String },
    #[error("invalid lock key: {0:?}")]
    InvalidKey(String),
    #[error("lock service error: {0}")]
    Transport(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the table store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("table not found: {0}")]
    TableNotFound(String),
    #[error("table already exists: {0}")]
    TableAlreadyExists(String),
    #[error("schema mismatch for {table}: {message}")]
    SchemaMismatch { table: String, message: String },
    #[error("concurrent modification of {table}: version {version} was committed by another writer")]
    ConcurrentModification { table: String, version: u64 },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("invalid partition filter: {0}")]
    InvalidFilter(String),
    #[error("retention {requested:?} is below the table minimum of {minimum:?}")]
    InvalidRetention {
        requested: Duration,
        minimum: Duration,
    },
    #[error("corrupt table data: {0}")]
    Corrupt(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("table engine error: {0}")]
    Engine(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a lock-guarded critical section that did not succeed
///
/// Each variant is a distinct result kind: contention, a lock service fault,
/// the section's own failure, and a failed release after a successful section
/// can all be told apart by the caller.
#[derive(Debug, Error)]
pub enum GuardError<E> {
    /// The lock was not granted; the critical section never ran
    #[error("lock unavailable: {0} is held by another process")]
    Unavailable(LockKey),
    /// The lock service failed while acquiring
    #[error("lock service failed: {0}")]
    Lock(#[source] LockError),
    /// The critical section ran and failed; the lock was released
    #[error("critical section failed: {0}")]
    Operation(#[source] E),
    /// The critical section succeeded but the lock may still be held
    #[error("critical section on {key} succeeded but releasing the lock failed: {source}")]
    Release {
        key: LockKey,
        #[source]
        source: LockError,
    },
}

impl<E> GuardError<E> {
    /// True when the lock was contended and nothing ran
    pub fn is_unavailable(&self) -> bool {
        matches!(self, GuardError::Unavailable(_))
    }

    /// True when the critical section completed before the error
    pub fn work_completed(&self) -> bool {
        matches!(self, GuardError::Release { .. })
    }

    pub fn operation_error(&self) -> Option<&E> {
        match self {
            GuardError::Operation(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_operation_error(self) -> Option<E> {
        match self {
            GuardError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// Error returned by [`crate::CoordinatedWriter::write`]
pub type WriteError = GuardError<StorageError>;

/// Error returned by [`crate::CoordinatedMaintainer::maintain`]
pub type MaintenanceError = GuardError<StorageError>;
