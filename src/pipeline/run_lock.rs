//! Advisory file-based run lock with TTL reclaim
//!
//! Best-effort, single-machine only.

use crate::error::{JobScoutError, Result};
use crate::state::clock::{now_iso, parse_ts};
use chrono::{Duration, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct LockPayload {
    pid: u32,
    started_at: String,
    ttl_min: i64,
}

#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    released: bool,
}

impl RunLock {
    /// Try to take the lock. `Ok(None)` means another run holds a live lock.
    /// A lock older than `ttl_min` minutes, or with an unreadable payload,
    /// is considered abandoned and reclaimed.
    pub fn acquire(path: &Path, ttl_min: i64) -> Result<Option<RunLock>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if path.exists() {
            if !is_stale(path, ttl_min) {
                return Ok(None);
            }
            let _ = std::fs::remove_file(path);
            info!("Removed stale run lock: {}", path.display());
        }

        let payload = LockPayload {
            pid: std::process::id(),
            started_at: now_iso(),
            ttl_min,
        };

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                file.write_all(serde_json::to_string(&payload)?.as_bytes())?;
                Ok(Some(RunLock {
                    path: path.to_path_buf(),
                    released: false,
                }))
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(err) => Err(JobScoutError::RunLock(format!(
                "Could not create run lock {}: {}",
                path.display(),
                err
            ))),
        }
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not release run lock {}: {}", self.path.display(), err);
            }
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

fn is_stale(path: &Path, ttl_min: i64) -> bool {
    if ttl_min <= 0 {
        return true;
    }
    let payload: LockPayload = match std::fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str(&raw).ok())
    {
        Some(payload) => payload,
        None => return true,
    };
    let started = match parse_ts(&payload.started_at) {
        Some(started) => started,
        None => return true,
    };
    Utc::now() - started > Duration::minutes(ttl_min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("locks/run.lock");

        let lock = RunLock::acquire(&path, 120).unwrap().unwrap();
        assert!(path.exists());

        lock.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_second_acquire_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.lock");

        let _lock = RunLock::acquire(&path, 120).unwrap().unwrap();
        assert!(RunLock::acquire(&path, 120).unwrap().is_none());
    }

    #[test]
    fn test_stale_lock_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.lock");

        let old = (Utc::now() - Duration::minutes(500))
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let payload = format!(
            r#"{{"pid": 1, "started_at": "{}", "ttl_min": 120}}"#,
            old
        );
        std::fs::write(&path, payload).unwrap();

        let lock = RunLock::acquire(&path, 120).unwrap();
        assert!(lock.is_some());
    }

    #[test]
    fn test_unreadable_lock_counts_as_stale() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.lock");
        std::fs::write(&path, "garbage").unwrap();

        assert!(RunLock::acquire(&path, 120).unwrap().is_some());
    }

    #[test]
    fn test_drop_releases_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.lock");
        {
            let _lock = RunLock::acquire(&path, 120).unwrap().unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
