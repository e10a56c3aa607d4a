// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock service adapter trait

use crate::error::LockError;
use crate::key::{LockKey, LockToken};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

/// How long an acquisition may wait for a held lock
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AcquireMode {
    /// Wait according to the lock service's policy
    Blocking,
    /// Return immediately if the lock is held
    NonBlocking,
}

impl AcquireMode {
    pub fn is_blocking(self) -> bool {
        matches!(self, AcquireMode::Blocking)
    }
}

impl From<bool> for AcquireMode {
    fn from(blocking: bool) -> Self {
        if blocking {
            AcquireMode::Blocking
        } else {
            AcquireMode::NonBlocking
        }
    }
}

impl fmt::Display for AcquireMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquireMode::Blocking => f.write_str("blocking"),
            AcquireMode::NonBlocking => f.write_str("non-blocking"),
        }
    }
}

/// Proof of a successful acquisition
///
/// Handles are not `Clone`: releasing consumes the handle, so a released lock
/// cannot be released again through the same handle.
#[derive(Debug)]
#[must_use = "a lock handle must be released"]
pub struct LockHandle {
    key: LockKey,
    token: LockToken,
    acquired_at: DateTime<Utc>,
}

impl LockHandle {
    pub fn new(key: LockKey, token: LockToken) -> Self {
        Self {
            key,
            token,
            acquired_at: Utc::now(),
        }
    }

    pub fn key(&self) -> &LockKey {
        &self.key
    }

    pub fn token(&self) -> &LockToken {
        &self.token
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }
}

/// Adapter for an external mutual-exclusion service
///
/// Implementations must grant a key to at most one handle at a time.
#[async_trait]
pub trait LockClient: Clone + Send + Sync + 'static {
    /// Request exclusive ownership of `key`
    ///
    /// Returns `Ok(None)` when the lock was not granted: immediately for
    /// [`AcquireMode::NonBlocking`], or when the service gives up waiting for
    /// [`AcquireMode::Blocking`].
    async fn acquire(
        &self,
        key: &LockKey,
        mode: AcquireMode,
    ) -> Result<Option<LockHandle>, LockError>;

    /// Give up ownership
    ///
    /// Fails if the handle is unknown, was already released, or ownership
    /// passed to someone else (e.g. after lease expiry).
    async fn release(&self, handle: LockHandle) -> Result<(), LockError>;
}
