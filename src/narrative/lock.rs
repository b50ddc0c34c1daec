//! Cross-process narrative lock
//!
//! A lock file guards the story against concurrent writers from separate
//! agent processes. A fresh lock means skip this cycle; a lock older than
//! the staleness window belongs to a dead process and is stolen with a
//! warning. Release happens on guard drop so every exit path unlocks.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{MemoryError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct LockBody {
    pid: u32,
    started_at: DateTime<Utc>,
}

/// Filesystem mutex with age-based stale detection
#[derive(Debug, Clone)]
pub struct NarrativeLock {
    path: PathBuf,
    stale_secs: i64,
}

/// Held lock; the file is removed when this drops
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("narrative lock release failed: {err}");
            }
        }
    }
}

impl NarrativeLock {
    pub fn new(path: impl Into<PathBuf>, stale_secs: i64) -> Self {
        Self {
            path: path.into(),
            stale_secs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock, or report `LockHeld` when a live process owns it
    pub fn acquire(&self) -> Result<LockGuard> {
        if let Some(age_secs) = self.current_age_secs() {
            if age_secs < self.stale_secs {
                return Err(MemoryError::LockHeld { age_secs });
            }
            warn!(
                age_secs,
                path = %self.path.display(),
                "stale narrative lock reclaimed"
            );
        }

        let body = LockBody {
            pid: std::process::id(),
            started_at: Utc::now(),
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string(&body)?)?;
        debug!(path = %self.path.display(), "narrative lock acquired");

        Ok(LockGuard {
            path: self.path.clone(),
        })
    }

    /// Age of the existing lock, or None when no lock exists
    ///
    /// A lock whose body is unreadable falls back to file mtime; no age at
    /// all means an abandoned artifact, reported as maximally stale.
    fn current_age_secs(&self) -> Option<i64> {
        if !self.path.exists() {
            return None;
        }

        let from_body = fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str::<LockBody>(&raw).ok())
            .map(|body| Utc::now().signed_duration_since(body.started_at).num_seconds());

        let from_mtime = fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok()
            .map(|mtime| {
                Utc::now()
                    .signed_duration_since(DateTime::<Utc>::from(mtime))
                    .num_seconds()
            });

        Some(from_body.or(from_mtime).unwrap_or(i64::MAX))
    }
}
