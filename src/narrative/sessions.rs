//! Session transcript recovery for cross-session narrative sync
//!
//! Prior agent sessions leave NDJSON transcripts (`*.jsonl`). On startup
//! the engine scans the most recent few for messages the story has not
//! absorbed yet. Unparseable lines are skipped; a transcript is data to
//! recover, never something to fail on.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::constants::SESSION_SCAN_LIMIT;
use crate::text::is_heartbeat;
use crate::timeline::parse_flexible;

/// A recovered session message awaiting narrativization
#[derive(Debug, Clone)]
pub struct SessionMessage {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptLine {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    content: Option<serde_json::Value>,
}

impl TranscriptLine {
    /// Textual content, if this line carries any
    fn text(&self) -> Option<String> {
        match &self.content {
            Some(serde_json::Value::String(text)) => Some(text.clone()),
            Some(serde_json::Value::Object(map)) => map
                .get("text")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            _ => None,
        }
    }
}

/// Collect un-narrated messages from recent session transcripts
///
/// Scans the `SESSION_SCAN_LIMIT` most-recently-modified `*.jsonl` files
/// under `session_dir` (minus an optional current-session path), keeping
/// `type == "message"` entries newer than `since` with non-heartbeat
/// textual content, sorted chronologically.
pub fn collect_recent_messages(
    session_dir: &Path,
    since: DateTime<Utc>,
    exclude: Option<&Path>,
) -> Vec<SessionMessage> {
    let mut transcripts = list_transcripts(session_dir, exclude);
    transcripts.truncate(SESSION_SCAN_LIMIT);

    let mut messages: Vec<SessionMessage> = transcripts
        .iter()
        .flat_map(|path| parse_transcript(path, since))
        .collect();

    messages.sort_by_key(|m| m.timestamp);
    messages
}

/// `*.jsonl` files under the directory, newest first by mtime
fn list_transcripts(session_dir: &Path, exclude: Option<&Path>) -> Vec<PathBuf> {
    let entries = match fs::read_dir(session_dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(dir = %session_dir.display(), "session dir unreadable: {err}");
            return Vec::new();
        }
    };

    let mut transcripts: Vec<(PathBuf, SystemTime)> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                return None;
            }
            if exclude.is_some_and(|excluded| excluded == path) {
                return None;
            }
            let mtime = entry.metadata().and_then(|m| m.modified()).ok()?;
            Some((path, mtime))
        })
        .collect();

    transcripts.sort_by(|a, b| b.1.cmp(&a.1));
    transcripts.into_iter().map(|(path, _)| path).collect()
}

fn parse_transcript(path: &Path, since: DateTime<Utc>) -> Vec<SessionMessage> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(file = %path.display(), "transcript unreadable, skipping: {err}");
            return Vec::new();
        }
    };

    raw.lines()
        .filter_map(|line| serde_json::from_str::<TranscriptLine>(line).ok())
        .filter(|line| line.kind.as_deref() == Some("message"))
        .filter_map(|line| {
            let timestamp = line.timestamp.as_deref().and_then(parse_flexible)?;
            let text = line.text()?;
            (timestamp > since && !is_heartbeat(&text))
                .then_some(SessionMessage { timestamp, text })
        })
        .collect()
}
