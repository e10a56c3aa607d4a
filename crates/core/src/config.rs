// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock service and storage configuration
//!
//! Loaded from TOML. The Redis connection triple and the storage root can be
//! overridden from the environment (`REDIS_HOST`, `REDIS_PORT`, `REDIS_DB`,
//! `TLK_STORAGE_ROOT`, `TLK_STORAGE_BACKEND`, `TLK_LOCK_BACKEND`).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const ENV_REDIS_HOST: &str = "REDIS_HOST";
pub const ENV_REDIS_PORT: &str = "REDIS_PORT";
pub const ENV_REDIS_DB: &str = "REDIS_DB";
pub const ENV_STORAGE_ROOT: &str = "TLK_STORAGE_ROOT";
pub const ENV_LOCK_BACKEND: &str = "TLK_LOCK_BACKEND";
pub const ENV_STORAGE_BACKEND: &str = "TLK_STORAGE_BACKEND";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid value {value:?} for {name}: {reason}")]
    Env {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which lock service to use
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockBackend {
    Memory,
    File,
    #[default]
    Redis,
}

impl fmt::Display for LockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockBackend::Memory => f.write_str("memory"),
            LockBackend::File => f.write_str("file"),
            LockBackend::Redis => f.write_str("redis"),
        }
    }
}

impl FromStr for LockBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(LockBackend::Memory),
            "file" => Ok(LockBackend::File),
            "redis" => Ok(LockBackend::Redis),
            other => Err(ConfigError::Invalid(format!(
                "unknown lock backend {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    /// Lease expiry; locks never expire when absent
    #[serde(with = "humantime_serde::option")]
    pub lease_ttl: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Give up a blocking acquisition after this long; wait forever when absent
    #[serde(with = "humantime_serde::option")]
    pub blocking_timeout: Option<Duration>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            lease_ttl: None,
            poll_interval: Duration::from_millis(100),
            blocking_timeout: None,
        }
    }
}

impl RedisConfig {
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLockConfig {
    pub dir: PathBuf,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for FileLockConfig {
    fn default() -> Self {
        let base = dirs::runtime_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            dir: base.join("tlk-locks"),
            poll_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub backend: LockBackend,
    /// Prefix for every lock key
    pub namespace: Option<String>,
    /// Lease expiry for the in-memory service
    #[serde(with = "humantime_serde::option")]
    pub lease_ttl: Option<Duration>,
    pub redis: RedisConfig,
    pub file: FileLockConfig,
}

/// Which table format to store tables in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Delta Lake tables
    #[default]
    Delta,
    /// The built-in JSON-lines table format
    Local,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Delta => f.write_str("delta"),
            StorageBackend::Local => f.write_str("local"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delta" => Ok(StorageBackend::Delta),
            "local" => Ok(StorageBackend::Local),
            other => Err(ConfigError::Invalid(format!(
                "unknown storage backend {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory holding one subdirectory per table
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: PathBuf::from("tables"),
        }
    }
}

/// Defaults for maintenance requests that leave a knob unset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    #[serde(with = "humantime_serde::option")]
    pub retention: Option<Duration>,
    pub target_size: Option<u64>,
    pub max_concurrent_tasks: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub lock: LockConfig,
    pub storage: StorageConfig,
    pub maintenance: MaintenanceConfig,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_REDIS_HOST) {
            self.lock.redis.host = host;
        }
        if let Some(port) = lookup(ENV_REDIS_PORT) {
            self.lock.redis.port = parse_env(ENV_REDIS_PORT, port)?;
        }
        if let Some(db) = lookup(ENV_REDIS_DB) {
            self.lock.redis.db = parse_env(ENV_REDIS_DB, db)?;
        }
        if let Some(root) = lookup(ENV_STORAGE_ROOT) {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(backend) = lookup(ENV_STORAGE_BACKEND) {
            self.storage.backend = backend.parse().map_err(|e: ConfigError| ConfigError::Env {
                name: ENV_STORAGE_BACKEND,
                value: backend.clone(),
                reason: e.to_string(),
            })?;
        }
        if let Some(backend) = lookup(ENV_LOCK_BACKEND) {
            self.lock.backend = backend.parse().map_err(|e: ConfigError| ConfigError::Env {
                name: ENV_LOCK_BACKEND,
                value: backend.clone(),
                reason: e.to_string(),
            })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock.redis.host.trim().is_empty() {
            return Err(ConfigError::Invalid("lock.redis.host is empty".to_string()));
        }
        if self.lock.redis.db < 0 {
            return Err(ConfigError::Invalid(format!(
                "lock.redis.db must not be negative, got {}",
                self.lock.redis.db
            )));
        }
        if self.lock.redis.poll_interval.is_zero() || self.lock.file.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "lock poll_interval must be positive".to_string(),
            ));
        }
        if matches!(self.lock.redis.lease_ttl, Some(ttl) if ttl < Duration::from_millis(1))
            || matches!(self.lock.lease_ttl, Some(ttl) if ttl.is_zero())
        {
            return Err(ConfigError::Invalid(
                "lease_ttl must be at least 1ms".to_string(),
            ));
        }
        if matches!(self.lock.namespace.as_deref(), Some(ns) if ns.contains(char::is_whitespace)) {
            return Err(ConfigError::Invalid(
                "lock.namespace must not contain whitespace".to_string(),
            ));
        }
        if self.storage.root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage.root is empty".to_string()));
        }
        if self.maintenance.target_size == Some(0) {
            return Err(ConfigError::Invalid(
                "maintenance.target_size must be positive".to_string(),
            ));
        }
        if self.maintenance.max_concurrent_tasks == Some(0) {
            return Err(ConfigError::Invalid(
                "maintenance.max_concurrent_tasks must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        name,
        reason: e.to_string(),
        value,
    })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
