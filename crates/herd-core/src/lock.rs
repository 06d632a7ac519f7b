//! Device-local sync lock: at most one active sync per device.
//!
//! A pidfile guards the cycle. A lock held by a live process means this
//! cycle is skipped; a stale holder (dead pid) is evicted. The lock is
//! released on drop, which covers every error path of the cycle.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// RAII guard for the device sync lock.
#[derive(Debug)]
pub struct SyncLock {
    path: PathBuf,
}

impl SyncLock {
    /// Try to take the lock.
    ///
    /// Returns `Ok(None)` when another live process holds it; the caller
    /// skips this cycle.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Option<Self>> {
        let path = path.into();
        if let Some(holder) = read_holder(&path)? {
            if pid_alive(holder) {
                tracing::debug!(pid = holder, "sync lock held, skipping cycle");
                return Ok(None);
            }
            tracing::warn!(pid = holder, "removing stale sync lock");
            fs::remove_file(&path)?;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, std::process::id().to_string())
            .map_err(|error| Error::Lock(format!("cannot write {}: {error}", path.display())))?;
        Ok(Some(Self { path }))
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), %error, "failed to remove sync lock");
        }
    }
}

fn read_holder(path: &Path) -> Result<Option<u32>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)?;
    match contents.trim().parse::<u32>() {
        Ok(pid) => Ok(Some(pid)),
        // Unreadable pidfile: treat as stale rather than wedging syncs.
        Err(_) => {
            fs::remove_file(path)?;
            Ok(None)
        }
    }
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    // Signal 0 probes for existence without delivering anything.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}
