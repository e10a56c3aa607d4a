// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock-guarded critical sections
//!
//! [`LockGuard::run`] acquires a lock, runs one operation while holding it,
//! and releases the lock on every exit path: success, error, panic, and
//! cancellation of the calling task.

use crate::error::{GuardError, LockError};
use crate::key::LockKey;
use crate::lock::{AcquireMode, LockClient, LockHandle};
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::Instrument;

/// Runs critical sections under locks from one lock service
#[derive(Clone, Debug)]
pub struct LockGuard<L: LockClient> {
    client: L,
}

impl<L: LockClient> LockGuard<L> {
    pub fn new(client: L) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &L {
        &self.client
    }

    /// Run `operation` while holding the lock on `key`
    ///
    /// The operation is invoked at most once, and only after the lock is
    /// granted. If the lock is not granted the operation never runs and
    /// [`GuardError::Unavailable`] is returned. A panic inside the operation
    /// is re-raised after the lock has been released.
    pub async fn run<T, E, F, Fut>(
        &self,
        key: &LockKey,
        mode: AcquireMode,
        operation: F,
    ) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let span = tracing::info_span!("critical_section", key = %key, mode = %mode);
        async move {
            let start = Instant::now();
            tracing::debug!("acquiring lock");

            let handle = match self.client.acquire(key, mode).await {
                Ok(Some(handle)) => handle,
                Ok(None) => {
                    tracing::warn!("lock unavailable, critical section not run");
                    return Err(GuardError::Unavailable(key.clone()));
                }
                Err(e) => {
                    tracing::error!(error = %e, "lock acquisition failed");
                    return Err(GuardError::Lock(e));
                }
            };
            tracing::debug!(
                token = %handle.token(),
                wait_ms = start.elapsed().as_millis() as u64,
                "lock acquired"
            );

            let held = HeldLock::new(self.client.clone(), handle);
            let outcome = AssertUnwindSafe(async move { operation().await })
                .catch_unwind()
                .await;
            let released = held.release().await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match (outcome, released) {
                (Err(panic), released) => {
                    if let Err(e) = released {
                        tracing::error!(error = %e, "releasing lock after panic failed");
                    }
                    tracing::error!(elapsed_ms, "critical section panicked");
                    std::panic::resume_unwind(panic)
                }
                (Ok(Err(e)), Ok(())) => {
                    tracing::warn!(error = %e, elapsed_ms, "critical section failed");
                    Err(GuardError::Operation(e))
                }
                (Ok(Err(e)), Err(release_error)) => {
                    tracing::error!(
                        error = %e,
                        release_error = %release_error,
                        elapsed_ms,
                        "critical section failed and releasing the lock failed"
                    );
                    Err(GuardError::Operation(e))
                }
                (Ok(Ok(value)), Ok(())) => {
                    tracing::info!(elapsed_ms, "critical section complete");
                    Ok(value)
                }
                (Ok(Ok(_)), Err(release_error)) => {
                    tracing::error!(
                        error = %release_error,
                        elapsed_ms,
                        "critical section complete but releasing the lock failed"
                    );
                    Err(GuardError::Release {
                        key: key.clone(),
                        source: release_error,
                    })
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Ownership of an acquired lock for the length of one critical section
///
/// Call [`HeldLock::release`] to give the lock back. A `HeldLock` dropped
/// without release (the owning task was cancelled) schedules the release on
/// the current tokio runtime.
pub struct HeldLock<L: LockClient> {
    client: L,
    handle: Option<LockHandle>,
}

impl<L: LockClient> HeldLock<L> {
    pub fn new(client: L, handle: LockHandle) -> Self {
        Self {
            client,
            handle: Some(handle),
        }
    }

    pub fn key(&self) -> Option<&LockKey> {
        self.handle.as_ref().map(LockHandle::key)
    }

    /// Give the lock back
    ///
    /// Inside a tokio runtime the release runs as its own task, so it
    /// completes even if the caller is cancelled while waiting for it.
    pub async fn release(mut self) -> Result<(), LockError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        let client = self.client.clone();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return client.release(handle).await;
        };

        match runtime.spawn(async move { client.release(handle).await }).await {
            Ok(result) => result,
            Err(e) => match e.try_into_panic() {
                Ok(payload) => std::panic::resume_unwind(payload),
                Err(e) => Err(LockError::Transport(format!("lock release task failed: {}", e))),
            },
        }
    }
}

impl<L: LockClient> fmt::Debug for HeldLock<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeldLock")
            .field("handle", &self.handle)
            .finish()
    }
}

impl<L: LockClient> Drop for HeldLock<L> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let key = handle.key().clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::warn!(key = %key, "critical section abandoned, releasing lock in background");
                let client = self.client.clone();
                runtime.spawn(async move {
                    if let Err(e) = client.release(handle).await {
                        tracing::error!(key = %key, error = %e, "background lock release failed");
                    }
                });
            }
            Err(_) => {
                tracing::error!(
                    key = %key,
                    "critical section abandoned outside a tokio runtime, lock not released"
                );
            }
        }
    }
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
