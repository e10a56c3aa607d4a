// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process lock service over the lease state machine

use super::check_key;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tlk_core::{
    AcquireMode, Clock, Lease, LeaseEvent, LeaseInput, LockClient, LockError, LockHandle, LockKey,
    LockToken, RandomTokens, ReleaseRejection, SystemClock, TokenSource,
};
use tokio::sync::Notify;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Shared<C> {
    leases: Mutex<HashMap<LockKey, Lease>>,
    released: Notify,
    clock: C,
}

/// Lock service for callers in one process
///
/// Clones share the lease table. Blocking waiters wake when a lease is
/// released and re-check at least every poll interval so an expired lease is
/// reclaimed.
#[derive(Clone)]
pub struct MemoryLockClient<C: Clock = SystemClock, T: TokenSource = RandomTokens> {
    shared: Arc<Shared<C>>,
    tokens: T,
    lease_ttl: Option<Duration>,
    poll_interval: Duration,
    blocking_timeout: Option<Duration>,
}

impl MemoryLockClient {
    pub fn new() -> Self {
        Self::with_parts(SystemClock, RandomTokens)
    }
}

impl Default for MemoryLockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock, T: TokenSource> fmt::Debug for MemoryLockClient<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLockClient")
            .field("lease_ttl", &self.lease_ttl)
            .field("poll_interval", &self.poll_interval)
            .field("blocking_timeout", &self.blocking_timeout)
            .finish_non_exhaustive()
    }
}

impl<C: Clock, T: TokenSource> MemoryLockClient<C, T> {
    pub fn with_parts(clock: C, tokens: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                leases: Mutex::new(HashMap::new()),
                released: Notify::new(),
                clock,
            }),
            tokens,
            lease_ttl: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            blocking_timeout: None,
        }
    }

    /// Leases granted from now on lapse after `ttl`
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = Some(ttl);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Blocking acquisitions give up after `timeout`
    pub fn with_blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_timeout = Some(timeout);
        self
    }

    /// Token currently holding `key`, if any
    pub fn holder(&self, key: &LockKey) -> Option<LockToken> {
        let leases = self.shared.leases.lock().unwrap_or_else(|e| e.into_inner());
        leases.get(key).and_then(|l| l.holder().cloned())
    }

    /// Free every lapsed lease, returning the keys that expired
    pub fn tick(&self) -> Vec<LockKey> {
        let mut expired = Vec::new();
        {
            let mut leases = self.shared.leases.lock().unwrap_or_else(|e| e.into_inner());
            leases.retain(|key, lease| {
                let (next, events) = lease.transition(LeaseInput::Tick, &self.shared.clock);
                log_events(&events);
                if events.iter().any(|e| matches!(e, LeaseEvent::Expired { .. })) {
                    expired.push(key.clone());
                }
                *lease = next;
                !lease.is_free()
            });
        }
        if !expired.is_empty() {
            self.shared.released.notify_waiters();
        }
        expired
    }

    fn try_acquire(&self, key: &LockKey, token: &LockToken) -> bool {
        let mut leases = self.shared.leases.lock().unwrap_or_else(|e| e.into_inner());
        let lease = leases
            .entry(key.clone())
            .or_insert_with(|| Lease::new(key.clone(), self.lease_ttl));
        let (next, events) = lease.transition(
            LeaseInput::Acquire {
                token: token.clone(),
            },
            &self.shared.clock,
        );
        log_events(&events);
        *lease = next;
        lease.is_held_by(token)
    }

    /// How long to sleep before re-checking a held key
    fn wait_for(&self, key: &LockKey) -> Duration {
        let leases = self.shared.leases.lock().unwrap_or_else(|e| e.into_inner());
        leases
            .get(key)
            .and_then(|l| l.remaining(&self.shared.clock))
            .map_or(self.poll_interval, |remaining| {
                remaining.min(self.poll_interval)
            })
    }
}

fn log_events(events: &[LeaseEvent]) {
    for event in events {
        match event {
            LeaseEvent::Expired { key, previous } => {
                tracing::warn!(%key, token = %previous, "lease expired")
            }
            LeaseEvent::Denied { key, holder, .. } => {
                tracing::trace!(%key, %holder, "lease held")
            }
            LeaseEvent::ReleaseRejected { key, token, reason } => {
                tracing::debug!(%key, %token, ?reason, "release rejected")
            }
            LeaseEvent::Acquired { .. } | LeaseEvent::Released { .. } => {}
        }
    }
}

#[async_trait]
impl<C: Clock, T: TokenSource> LockClient for MemoryLockClient<C, T> {
    async fn acquire(
        &self,
        key: &LockKey,
        mode: AcquireMode,
    ) -> Result<Option<LockHandle>, LockError> {
        check_key(key)?;
        let token = self.tokens.next_token();
        let deadline = self
            .blocking_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);

        loop {
            // Register for wakeups before checking so a release in between is seen
            let released = self.shared.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if self.try_acquire(key, &token) {
                return Ok(Some(LockHandle::new(key.clone(), token)));
            }
            if !mode.is_blocking() {
                return Ok(None);
            }

            let mut wait = self.wait_for(key);
            if let Some(deadline) = deadline {
                let now = tokio::time::Instant::now();
                if now >= deadline {
                    tracing::debug!(%key, "blocking acquisition timed out");
                    return Ok(None);
                }
                wait = wait.min(deadline - now);
            }
            let _ = tokio::time::timeout(wait, released).await;
        }
    }

    async fn release(&self, handle: LockHandle) -> Result<(), LockError> {
        let key = handle.key().clone();
        let outcome = {
            let mut leases = self.shared.leases.lock().unwrap_or_else(|e| e.into_inner());
            let Some(lease) = leases.get(&key) else {
                return Err(LockError::NotHeld {
                    key: key.to_string(),
                });
            };
            let (next, events) = lease.transition(
                LeaseInput::Release {
                    token: handle.token().clone(),
                },
                &self.shared.clock,
            );
            log_events(&events);
            if next.is_free() {
                leases.remove(&key);
            } else {
                leases.insert(key.clone(), next);
            }
            events.into_iter().find_map(|event| match event {
                LeaseEvent::Released { .. } => Some(Ok(())),
                LeaseEvent::ReleaseRejected { reason, .. } => Some(Err(reason)),
                _ => None,
            })
        };

        match outcome {
            Some(Ok(())) => {
                self.shared.released.notify_waiters();
                Ok(())
            }
            Some(Err(ReleaseRejection::NotHeld)) | None => Err(LockError::NotHeld {
                key: key.to_string(),
            }),
            Some(Err(ReleaseRejection::NotOwned)) => Err(LockError::NotOwned {
                key: key.to_string(),
            }),
            Some(Err(ReleaseRejection::Expired)) => {
                self.shared.released.notify_waiters();
                Err(LockError::NotOwned {
                    key: key.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
