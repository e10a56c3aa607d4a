// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease state machine for exclusive key ownership
//!
//! A lock service keeps one lease per key. A lease may carry a time-to-live;
//! once it lapses, the next acquirer reclaims it and the previous owner's
//! release is rejected.

use crate::clock::Clock;
use crate::key::{LockKey, LockToken};
use std::time::{Duration, Instant};

/// Lease state
#[derive(Clone, Debug)]
pub enum LeaseState {
    /// Nobody owns the key
    Free,
    /// Owned by the acquisition identified by `token`
    Held {
        token: LockToken,
        acquired_at: Instant,
        /// None when the lease never expires
        expires_at: Option<Instant>,
    },
}

/// Inputs that drive lease transitions
#[derive(Clone, Debug)]
pub enum LeaseInput {
    Acquire { token: LockToken },
    Release { token: LockToken },
    /// Expire a lapsed lease (called periodically)
    Tick,
}

/// Why a release was refused
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseRejection {
    /// The lease was free
    NotHeld,
    /// Another token owns the lease
    NotOwned,
    /// The releasing token owned the lease but it had lapsed
    Expired,
}

/// What a transition did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaseEvent {
    Acquired {
        key: LockKey,
        token: LockToken,
    },
    Denied {
        key: LockKey,
        token: LockToken,
        holder: LockToken,
    },
    Expired {
        key: LockKey,
        previous: LockToken,
    },
    Released {
        key: LockKey,
        token: LockToken,
    },
    ReleaseRejected {
        key: LockKey,
        token: LockToken,
        reason: ReleaseRejection,
    },
}

/// Ownership record for one key
#[derive(Clone, Debug)]
pub struct Lease {
    key: LockKey,
    ttl: Option<Duration>,
    state: LeaseState,
}

impl Lease {
    pub fn new(key: LockKey, ttl: Option<Duration>) -> Self {
        Self {
            key,
            ttl,
            state: LeaseState::Free,
        }
    }

    pub fn key(&self) -> &LockKey {
        &self.key
    }

    pub fn state(&self) -> &LeaseState {
        &self.state
    }

    pub fn is_free(&self) -> bool {
        matches!(self.state, LeaseState::Free)
    }

    pub fn is_held_by(&self, token: &LockToken) -> bool {
        matches!(&self.state, LeaseState::Held { token: t, .. } if t == token)
    }

    pub fn holder(&self) -> Option<&LockToken> {
        match &self.state {
            LeaseState::Free => None,
            LeaseState::Held { token, .. } => Some(token),
        }
    }

    /// True when the lease is held past its expiry
    pub fn is_expired(&self, clock: &impl Clock) -> bool {
        match &self.state {
            LeaseState::Held {
                expires_at: Some(at),
                ..
            } => clock.now() >= *at,
            _ => false,
        }
    }

    /// Time until the current lease lapses, if it can lapse
    pub fn remaining(&self, clock: &impl Clock) -> Option<Duration> {
        match &self.state {
            LeaseState::Held {
                expires_at: Some(at),
                ..
            } => Some(at.saturating_duration_since(clock.now())),
            _ => None,
        }
    }

    fn granted(&self, token: LockToken, clock: &impl Clock) -> LeaseState {
        let now = clock.now();
        LeaseState::Held {
            token,
            acquired_at: now,
            expires_at: self.ttl.map(|ttl| now + ttl),
        }
    }

    /// Pure state transition function
    pub fn transition(&self, input: LeaseInput, clock: &impl Clock) -> (Lease, Vec<LeaseEvent>) {
        let mut next = self.clone();
        let mut events = Vec::new();

        match input {
            LeaseInput::Acquire { token } => match &self.state {
                LeaseState::Free => {
                    next.state = self.granted(token.clone(), clock);
                    events.push(LeaseEvent::Acquired {
                        key: self.key.clone(),
                        token,
                    });
                }
                LeaseState::Held { token: current, .. } if self.is_expired(clock) => {
                    events.push(LeaseEvent::Expired {
                        key: self.key.clone(),
                        previous: current.clone(),
                    });
                    next.state = self.granted(token.clone(), clock);
                    events.push(LeaseEvent::Acquired {
                        key: self.key.clone(),
                        token,
                    });
                }
                LeaseState::Held { token: current, .. } => {
                    events.push(LeaseEvent::Denied {
                        key: self.key.clone(),
                        token,
                        holder: current.clone(),
                    });
                }
            },

            LeaseInput::Release { token } => {
                let rejection = match &self.state {
                    LeaseState::Free => Some(ReleaseRejection::NotHeld),
                    LeaseState::Held { token: current, .. } if current != &token => {
                        Some(ReleaseRejection::NotOwned)
                    }
                    LeaseState::Held { .. } if self.is_expired(clock) => {
                        Some(ReleaseRejection::Expired)
                    }
                    LeaseState::Held { .. } => None,
                };

                match rejection {
                    None => {
                        next.state = LeaseState::Free;
                        events.push(LeaseEvent::Released {
                            key: self.key.clone(),
                            token,
                        });
                    }
                    Some(reason) => {
                        // A lapsed lease is ownerless either way
                        if reason == ReleaseRejection::Expired {
                            next.state = LeaseState::Free;
                        }
                        events.push(LeaseEvent::ReleaseRejected {
                            key: self.key.clone(),
                            token,
                            reason,
                        });
                    }
                }
            }

            LeaseInput::Tick => {
                if self.is_expired(clock) {
                    if let LeaseState::Held { token, .. } = &self.state {
                        events.push(LeaseEvent::Expired {
                            key: self.key.clone(),
                            previous: token.clone(),
                        });
                        next.state = LeaseState::Free;
                    }
                }
            }
        }

        (next, events)
    }
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
