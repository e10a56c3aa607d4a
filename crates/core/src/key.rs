// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table names, lock keys, and acquisition tokens

use crate::error::InvalidName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const MAX_TABLE_NAME_LEN: usize = 255;

/// Validated identity of a table in the store
///
/// Names are restricted to ASCII letters, digits, `_`, `-` and `.` so they can
/// be used verbatim as directory names and lock keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidName> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("name is empty")
        } else if name.len() > MAX_TABLE_NAME_LEN {
            Some("name is longer than 255 bytes")
        } else if name == "." || name == ".." {
            Some("name is a relative path component")
        } else if !name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
        {
            Some("only ASCII letters, digits, '_', '-' and '.' are allowed")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(InvalidName { name, reason }),
            None => Ok(Self(name)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TableName {
    type Err = InvalidName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TableName {
    type Error = InvalidName;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<TableName> for String {
    fn from(name: TableName) -> Self {
        name.0
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Name of a resource protected by a lock
///
/// Every critical section touching the same table must use the same key.
/// Derive keys with [`LockKey::for_table`] rather than building them by hand.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey(String);

impl LockKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The lock key guarding writes and maintenance of `table`
    pub fn for_table(table: &TableName) -> Self {
        Self(table.as_str().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Key as seen by a lock service that prefixes keys with a namespace
    pub fn namespaced(&self, namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) if !ns.is_empty() => format!("{}:{}", ns, self.0),
            _ => self.0.clone(),
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one successful acquisition of a lock
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Produces fresh lock tokens
pub trait TokenSource: Clone + Send + Sync + 'static {
    fn next_token(&self) -> LockToken;
}

/// Random UUID tokens, unique across processes and hosts
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomTokens;

impl TokenSource for RandomTokens {
    fn next_token(&self) -> LockToken {
        LockToken(uuid::Uuid::new_v4().to_string())
    }
}

/// Predictable tokens (`prefix-1`, `prefix-2`, ...) for tests
///
/// Clones share the counter.
#[derive(Clone, Debug)]
pub struct SequentialTokens {
    prefix: String,
    counter: Arc<AtomicU64>,
}

impl SequentialTokens {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl Default for SequentialTokens {
    fn default() -> Self {
        Self::new("token")
    }
}

impl TokenSource for SequentialTokens {
    fn next_token(&self) -> LockToken {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        LockToken(format!("{}-{}", self.prefix, n))
    }
}

#[cfg(test)]
#[path = "key_tests.rs"]
mod tests;
