// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis lock service
//!
//! Acquisition is `SET key token NX [PX ttl]`; release deletes the key only if
//! it still holds the caller's token.

use super::check_key;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::sync::Arc;
use std::time::Duration;
use tlk_core::{
    AcquireMode, LockClient, LockError, LockHandle, LockKey, RandomTokens, RedisConfig,
    TokenSource,
};
use tokio::sync::OnceCell;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Returns 1 when deleted, 0 when another token holds the key, -1 when unset
const RELEASE_SCRIPT: &str = r#"
local current = redis.call("get", KEYS[1])
if not current then
    return -1
end
if current == ARGV[1] then
    return redis.call("del", KEYS[1])
end
return 0
"#;

/// Lock service backed by a Redis server
#[derive(Clone)]
pub struct RedisLockClient {
    client: redis::Client,
    connection: Arc<OnceCell<MultiplexedConnection>>,
    namespace: Option<String>,
    tokens: RandomTokens,
    lease_ttl: Option<Duration>,
    poll_interval: Duration,
    blocking_timeout: Option<Duration>,
}

impl std::fmt::Debug for RedisLockClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLockClient")
            .field("namespace", &self.namespace)
            .field("lease_ttl", &self.lease_ttl)
            .field("poll_interval", &self.poll_interval)
            .field("blocking_timeout", &self.blocking_timeout)
            .finish_non_exhaustive()
    }
}

fn transport(e: redis::RedisError) -> LockError {
    LockError::Transport(e.to_string())
}

impl RedisLockClient {
    /// Build a client; no connection is made until the first call
    pub fn from_config(config: &RedisConfig, namespace: Option<&str>) -> Result<Self, LockError> {
        let client = Self::from_url(&config.url(), namespace)?;
        Ok(Self {
            lease_ttl: config.lease_ttl,
            poll_interval: config.poll_interval,
            blocking_timeout: config.blocking_timeout,
            ..client
        })
    }

    /// Build a client for a `redis://` URL with default timings
    pub fn from_url(url: &str, namespace: Option<&str>) -> Result<Self, LockError> {
        let client = redis::Client::open(url).map_err(transport)?;
        Ok(Self {
            client,
            connection: Arc::new(OnceCell::new()),
            namespace: namespace.map(str::to_string),
            tokens: RandomTokens,
            lease_ttl: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            blocking_timeout: None,
        })
    }

    /// Keys set from now on expire after `ttl`
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

    /// Name of the Redis key holding `key`
    pub fn redis_key(&self, key: &LockKey) -> String {
        key.namespaced(self.namespace.as_deref())
    }

    async fn connection(&self) -> Result<MultiplexedConnection, LockError> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                tracing::debug!("connecting to redis");
                self.client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(transport)
            })
            .await?;
        Ok(connection.clone())
    }

    async fn try_set(
        &self,
        connection: &mut MultiplexedConnection,
        name: &str,
        token: &str,
    ) -> Result<bool, LockError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(name).arg(token).arg("NX");
        if let Some(ttl) = self.lease_ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        let reply: Option<String> = cmd.query_async(connection).await.map_err(transport)?;
        Ok(reply.is_some())
    }
}

/// Map the release script's reply to a result
pub(crate) fn release_outcome(reply: i64, key: &LockKey) -> Result<(), LockError> {
    match reply {
        1 => Ok(()),
        0 => Err(LockError::NotOwned {
            key: key.to_string(),
        }),
        -1 => Err(LockError::NotHeld {
            key: key.to_string(),
        }),
        other => Err(LockError::Transport(format!(
            "unexpected release reply {}",
            other
        ))),
    }
}

#[async_trait]
impl LockClient for RedisLockClient {
    async fn acquire(
        &self,
        key: &LockKey,
        mode: AcquireMode,
    ) -> Result<Option<LockHandle>, LockError> {
        check_key(key)?;
        let name = self.redis_key(key);
        let token = self.tokens.next_token();
        let mut connection = self.connection().await?;
        let deadline = self
            .blocking_timeout
            .map(|timeout| tokio::time::Instant::now() + timeout);

        loop {
            if self.try_set(&mut connection, &name, token.as_str()).await? {
                tracing::debug!(key = %name, "redis lock acquired");
                return Ok(Some(LockHandle::new(key.clone(), token)));
            }
            if !mode.is_blocking() {
                return Ok(None);
            }
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    tracing::debug!(key = %name, "blocking acquisition timed out");
                    return Ok(None);
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn release(&self, handle: LockHandle) -> Result<(), LockError> {
        let name = self.redis_key(handle.key());
        let mut connection = self.connection().await?;
        let reply: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&name)
            .arg(handle.token().as_str())
            .invoke_async(&mut connection)
            .await
            .map_err(transport)?;
        release_outcome(reply, handle.key())?;
        tracing::debug!(key = %name, "redis lock released");
        Ok(())
    }
}

#[cfg(test)]
#[path = "redis_tests.rs"]
mod tests;
