// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake lock service for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tlk_core::{
    AcquireMode, LockClient, LockError, LockHandle, LockKey, LockToken, SequentialTokens,
    TokenSource,
};
use tokio::sync::Notify;

/// Recorded lock call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockCall {
    Acquire { key: String, mode: AcquireMode },
    Release { key: String, token: String },
}

#[derive(Default)]
struct FakeLockState {
    held: HashMap<LockKey, LockToken>,
    released: HashSet<LockToken>,
    unavailable: HashSet<LockKey>,
    acquire_errors: VecDeque<LockError>,
    release_errors: VecDeque<LockError>,
    double_releases: usize,
    calls: Vec<LockCall>,
}

/// Fake lock service for testing
///
/// Behaves like a correct in-process lock service unless told otherwise:
/// blocking acquisitions wait for release, non-blocking ones report a held
/// key as unavailable.
#[derive(Clone)]
pub struct FakeLockClient {
    state: Arc<Mutex<FakeLockState>>,
    released: Arc<Notify>,
    tokens: SequentialTokens,
}

impl Default for FakeLockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeLockClient {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeLockState::default())),
            released: Arc::new(Notify::new()),
            tokens: SequentialTokens::new("fake"),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FakeLockState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// Every acquisition of `key` is refused, as if another process held it
    pub fn set_unavailable(&self, key: &LockKey) {
        self.with_state(|s| s.unavailable.insert(key.clone()));
    }

    pub fn set_available(&self, key: &LockKey) {
        self.with_state(|s| s.unavailable.remove(key));
        self.released.notify_waiters();
    }

    /// The next acquisition fails with `error`
    pub fn fail_next_acquire(&self, error: LockError) {
        self.with_state(|s| s.acquire_errors.push_back(error));
    }

    /// The next release fails with `error`; the key is still freed
    pub fn fail_next_release(&self, error: LockError) {
        self.with_state(|s| s.release_errors.push_back(error));
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<LockCall> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn acquisitions(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, LockCall::Acquire { .. }))
            .count()
    }

    pub fn releases(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, LockCall::Release { .. }))
            .count()
    }

    /// Releases of a token that had already been released
    pub fn double_releases(&self) -> usize {
        self.with_state(|s| s.double_releases)
    }

    pub fn is_held(&self, key: &LockKey) -> bool {
        self.with_state(|s| s.held.contains_key(key))
    }
}

#[async_trait]
impl LockClient for FakeLockClient {
    async fn acquire(
        &self,
        key: &LockKey,
        mode: AcquireMode,
    ) -> Result<Option<LockHandle>, LockError> {
        let token = self.tokens.next_token();
        let injected = self.with_state(|s| {
            s.calls.push(LockCall::Acquire {
                key: key.to_string(),
                mode,
            });
            s.acquire_errors.pop_front()
        });
        if let Some(error) = injected {
            return Err(error);
        }

        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            let granted = self.with_state(|s| {
                if s.unavailable.contains(key) || s.held.contains_key(key) {
                    return false;
                }
                s.held.insert(key.clone(), token.clone());
                true
            });
            if granted {
                return Ok(Some(LockHandle::new(key.clone(), token)));
            }
            if !mode.is_blocking() {
                return Ok(None);
            }
            released.await;
        }
    }

    async fn release(&self, handle: LockHandle) -> Result<(), LockError> {
        let result = self.with_state(|s| {
            s.calls.push(LockCall::Release {
                key: handle.key().to_string(),
                token: handle.token().to_string(),
            });
            if s.released.contains(handle.token()) {
                s.double_releases += 1;
                return Err(LockError::NotHeld {
                    key: handle.key().to_string(),
                });
            }
            let owned = s.held.get(handle.key()) == Some(handle.token());
            if !owned {
                return Err(LockError::NotOwned {
                    key: handle.key().to_string(),
                });
            }
            s.held.remove(handle.key());
            s.released.insert(handle.token().clone());
            match s.release_errors.pop_front() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        });
        self.released.notify_waiters();
        result
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
