// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process lock service over OS advisory file locks
//!
//! Each key maps to one lock file under a shared directory. Holding the lock
//! means holding an exclusive `flock` on that file; the holder writes its pid
//! and token into it for diagnosis. Lock files are never deleted, since
//! removing a file another process is waiting on would split the lock.

use super::check_key;
use async_trait::async_trait;
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tlk_core::{
    AcquireMode, LockClient, LockError, LockHandle, LockKey, LockToken, RandomTokens, TokenSource,
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
const PREFIX_LEN: usize = 32;

struct HeldFile {
    key: LockKey,
    file: File,
}

/// Lock service for processes sharing a filesystem
#[derive(Clone)]
pub struct FileLockClient {
    dir: PathBuf,
    held: Arc<Mutex<HashMap<LockToken, HeldFile>>>,
    tokens: RandomTokens,
    poll_interval: Duration,
    blocking_timeout: Option<Duration>,
}

impl std::fmt::Debug for FileLockClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLockClient")
            .field("dir", &self.dir)
            .field("poll_interval", &self.poll_interval)
            .field("blocking_timeout", &self.blocking_timeout)
            .finish_non_exhaustive()
    }
}

/// File name for `key`: a readable prefix plus a digest of the whole key
pub(crate) fn lock_file_name(key: &LockKey) -> String {
    let prefix: String = key
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(PREFIX_LEN)
        .collect();
    let digest = Sha256::digest(key.as_str().as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}.lock", prefix, hex)
}

impl FileLockClient {
    /// Create a client storing lock files in `dir`, creating it if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, LockError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            held: Arc::new(Mutex::new(HashMap::new())),
            tokens: RandomTokens,
            poll_interval: DEFAULT_POLL_INTERVAL,
            blocking_timeout: None,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_timeout = Some(timeout);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lock_path(&self, key: &LockKey) -> PathBuf {
        self.dir.join(lock_file_name(key))
    }

    /// One non-blocking attempt, run on the blocking pool
    async fn try_lock(&self, key: &LockKey, token: &LockToken) -> Result<Option<File>, LockError> {
        let path = self.lock_path(key);
        let token = token.clone();
        let attempt = tokio::task::spawn_blocking(move || try_lock_file(&path, &token))
            .await
            .map_err(|e| LockError::Transport(format!("lock task failed: {}", e)))?;
        Ok(attempt?)
    }
}

fn try_lock_file(path: &Path, token: &LockToken) -> io::Result<Option<File>> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    match file.try_lock_exclusive() {
        Ok(()) => {}
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => return Ok(None),
        Err(e) => return Err(e),
    }
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{} {}", std::process::id(), token)?;
    file.sync_data()?;
    Ok(Some(file))
}

fn unlock_file(file: File) -> io::Result<()> {
    file.set_len(0)?;
    FileExt::unlock(&file)
}

#[async_trait]
impl LockClient for FileLockClient {
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
            if let Some(file) = self.try_lock(key, &token).await? {
                let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
                held.insert(
                    token.clone(),
                    HeldFile {
                        key: key.clone(),
                        file,
                    },
                );
                tracing::debug!(%key, path = %self.lock_path(key).display(), "file lock acquired");
                return Ok(Some(LockHandle::new(key.clone(), token)));
            }
            if !mode.is_blocking() {
                return Ok(None);
            }
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    tracing::debug!(%key, "blocking acquisition timed out");
                    return Ok(None);
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn release(&self, handle: LockHandle) -> Result<(), LockError> {
        let entry = {
            let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
            let owner = held.get(handle.token()).map(|entry| entry.key.clone());
            match owner {
                None => {
                    return Err(LockError::NotHeld {
                        key: handle.key().to_string(),
                    })
                }
                Some(owner) if &owner != handle.key() => {
                    return Err(LockError::NotOwned {
                        key: handle.key().to_string(),
                    })
                }
                Some(_) => held.remove(handle.token()),
            }
        };
        let Some(entry) = entry else {
            return Err(LockError::NotHeld {
                key: handle.key().to_string(),
            });
        };

        tokio::task::spawn_blocking(move || unlock_file(entry.file))
            .await
            .map_err(|e| LockError::Transport(format!("unlock task failed: {}", e)))??;
        tracing::debug!(key = %handle.key(), "file lock released");
        Ok(())
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
