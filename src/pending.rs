//! Pending-episode audit log with threshold accounting
//!
//! Every non-heartbeat turn is appended to `pending-episodes.log` and
//! mirrored into `.pending-consolidation-status` as running message/token
//! counts. The consolidation engine reads the counts to decide when a
//! batch is worth narrating, reads the transcript for the batch body, and
//! resets both afterwards.
//!
//! The two writes are not atomic with respect to each other; the status
//! file alone is written via tmp + rename so a crash between them leaves a
//! re-readable state (worst case: slightly stale counts, which the next
//! append corrects upward).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::text::{estimate_tokens, is_heartbeat};

/// Running totals for the pending batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingStatus {
    pub messages: usize,
    pub tokens: usize,
}

impl PendingStatus {
    pub fn is_empty(&self) -> bool {
        self.messages == 0 && self.tokens == 0
    }
}

/// Append-only transcript of turns awaiting narrativization
#[derive(Debug, Clone)]
pub struct PendingEpisodeLog {
    log_path: PathBuf,
    status_path: PathBuf,
}

impl PendingEpisodeLog {
    /// Standard file names inside a memory directory
    pub fn new(memory_dir: &Path) -> Self {
        Self {
            log_path: memory_dir.join("pending-episodes.log"),
            status_path: memory_dir.join(".pending-consolidation-status"),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Record one turn; heartbeats are dropped without touching disk
    pub fn track(&self, text: &str) -> Result<()> {
        if is_heartbeat(text) {
            debug!("pending log: heartbeat filtered");
            return Ok(());
        }

        if let Some(parent) = self.log_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entry = format!("[{}] {}\n---\n", Utc::now().to_rfc3339(), text);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        file.write_all(entry.as_bytes())?;

        let mut status = self.status();
        status.messages += 1;
        status.tokens += estimate_tokens(text);
        self.write_status(status)?;

        debug!(
            messages = status.messages,
            tokens = status.tokens,
            "pending log: tracked turn"
        );
        Ok(())
    }

    /// Current counts; `{0,0}` when the status file is missing or malformed
    pub fn status(&self) -> PendingStatus {
        match fs::read_to_string(&self.status_path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                warn!("pending status malformed, treating as empty: {err}");
                PendingStatus::default()
            }),
            Err(_) => PendingStatus::default(),
        }
    }

    /// Zero the counts, then best-effort remove the transcript
    pub fn reset(&self) -> Result<()> {
        self.write_status(PendingStatus::default())?;
        if let Err(err) = fs::remove_file(&self.log_path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("pending log unlink failed: {err}");
            }
        }
        Ok(())
    }

    /// Full transcript, or the empty string when the log is missing
    pub fn read_transcript(&self) -> String {
        fs::read_to_string(&self.log_path).unwrap_or_default()
    }

    fn write_status(&self, status: PendingStatus) -> Result<()> {
        if let Some(parent) = self.status_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.status_path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string(&status)?)?;
        fs::rename(&tmp, &self.status_path)?;
        Ok(())
    }
}
