// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock service adapters

mod file;
mod memory;
mod redis;

pub use self::file::FileLockClient;
pub use self::memory::MemoryLockClient;
pub use self::redis::RedisLockClient;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeLockClient, LockCall};

use async_trait::async_trait;
use tlk_core::{AcquireMode, LockBackend, LockClient, LockConfig, LockError, LockHandle, LockKey};

/// The lock service selected by configuration
#[derive(Clone, Debug)]
pub enum ConfiguredLockClient {
    Memory(MemoryLockClient),
    File(FileLockClient),
    Redis(RedisLockClient),
}

impl ConfiguredLockClient {
    pub fn from_config(config: &LockConfig) -> Result<Self, LockError> {
        let client = match config.backend {
            LockBackend::Memory => {
                let mut client = MemoryLockClient::new();
                if let Some(ttl) = config.lease_ttl {
                    client = client.with_lease_ttl(ttl);
                }
                ConfiguredLockClient::Memory(client)
            }
            LockBackend::File => ConfiguredLockClient::File(
                FileLockClient::new(&config.file.dir)?
                    .with_poll_interval(config.file.poll_interval),
            ),
            LockBackend::Redis => ConfiguredLockClient::Redis(RedisLockClient::from_config(
                &config.redis,
                config.namespace.as_deref(),
            )?),
        };
        tracing::debug!(backend = %config.backend, "lock client configured");
        Ok(client)
    }

    pub fn backend(&self) -> LockBackend {
        match self {
            ConfiguredLockClient::Memory(_) => LockBackend::Memory,
            ConfiguredLockClient::File(_) => LockBackend::File,
            ConfiguredLockClient::Redis(_) => LockBackend::Redis,
        }
    }
}

#[async_trait]
impl LockClient for ConfiguredLockClient {
    async fn acquire(
        &self,
        key: &LockKey,
        mode: AcquireMode,
    ) -> Result<Option<LockHandle>, LockError> {
        match self {
            ConfiguredLockClient::Memory(client) => client.acquire(key, mode).await,
            ConfiguredLockClient::File(client) => client.acquire(key, mode).await,
            ConfiguredLockClient::Redis(client) => client.acquire(key, mode).await,
        }
    }

    async fn release(&self, handle: LockHandle) -> Result<(), LockError> {
        match self {
            ConfiguredLockClient::Memory(client) => client.release(handle).await,
            ConfiguredLockClient::File(client) => client.release(handle).await,
            ConfiguredLockClient::Redis(client) => client.release(handle).await,
        }
    }
}

/// Reject keys no lock service can store
fn check_key(key: &LockKey) -> Result<(), LockError> {
    if key.is_empty() {
        return Err(LockError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
