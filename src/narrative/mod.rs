//! Consolidation engine: keeping the story in sync with lived turns
//!
//! Batches of non-heartbeat turns are synthesized into the first-person
//! story once they cross the token threshold, with compression when the
//! story outgrows its word budget, chunked bootstrap from historical daily
//! logs, and cross-session recovery guarded by the narrative lock.
//!
//! Every external call here is best-effort: a failed synthesis leaves the
//! previous story intact and the pending batch untouched; no partial story
//! is ever observable on disk.

pub mod lock;
pub mod prompts;
pub mod sessions;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::completion::{CompletionGateway, CompletionRequest};
use crate::config::MemoryConfig;
use crate::constants::STORY_WORD_LIMIT;
use crate::errors::{MemoryError, Result};
use crate::graph::GraphAdapter;
use crate::pending::PendingEpisodeLog;
use crate::story::{Story, StoryFile};
use crate::text::{estimate_tokens, is_heartbeat, word_count};
use crate::timeline::parse_flexible;
use crate::types::IdentityBundle;
use lock::NarrativeLock;
use sessions::SessionMessage;

lazy_static! {
    /// `[<iso>]` stamps at the start of transcript entries
    static ref ENTRY_STAMP: Regex = Regex::new(r"(?m)^\[([^\]]+)\]").expect("entry stamp regex");

    /// Historical daily log file names
    static ref HISTORY_FILE: Regex =
        Regex::new(r"^(\d{4}-\d{2}-\d{2}).*\.md$").expect("history file regex");
}

/// Batched narrative synthesis over the pending episode backlog
pub struct ConsolidationEngine {
    graph: Arc<dyn GraphAdapter>,
    completion: Arc<dyn CompletionGateway>,
    pending: PendingEpisodeLog,
    story: StoryFile,
    lock: NarrativeLock,
    scope: String,
    model: String,
    token_threshold: usize,
    safe_token_limit: usize,
    auto_bootstrap_history: bool,
    history_dir: PathBuf,
}

impl ConsolidationEngine {
    pub fn new(
        graph: Arc<dyn GraphAdapter>,
        completion: Arc<dyn CompletionGateway>,
        config: &MemoryConfig,
        model: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            completion,
            pending: PendingEpisodeLog::new(&config.memory_dir),
            story: StoryFile::new(config.story_path()),
            lock: NarrativeLock::new(
                config.narrative.lock_path.clone(),
                config.narrative.lock_stale_secs,
            ),
            scope: config.identity_scope.clone(),
            model: model.into(),
            token_threshold: config.narrative.token_threshold,
            safe_token_limit: config.narrative.safe_token_limit,
            auto_bootstrap_history: config.narrative.auto_bootstrap_history,
            history_dir: config.history_dir(),
        }
    }

    pub fn pending(&self) -> &PendingEpisodeLog {
        &self.pending
    }

    pub fn story_file(&self) -> &StoryFile {
        &self.story
    }

    // =========================================================================
    // BATCH TRIGGER
    // =========================================================================

    /// Consolidate the pending backlog if it crossed the token threshold
    ///
    /// Returns without touching the story when there is nothing pending or
    /// the batch is still accumulating. The pending pair is reset only
    /// after a successful story write.
    pub async fn check_and_consolidate(&self, identity: &IdentityBundle) -> Result<()> {
        let story = self.story.load();
        if story.is_new() {
            return self.bootstrap_branch(identity).await;
        }

        let status = self.pending.status();
        if status.is_empty() {
            return Ok(());
        }
        if status.tokens < self.token_threshold {
            debug!(
                tokens = status.tokens,
                threshold = self.token_threshold,
                "consolidation deferred, still accumulating"
            );
            return Ok(());
        }

        let mut transcript = self.pending.read_transcript();
        if transcript.trim().is_empty() {
            warn!(
                "{}; falling back to graph backlog",
                MemoryError::PendingLogMissing.message()
            );
            transcript = self.transcript_from_graph(story.anchor()).await;
            if transcript.trim().is_empty() {
                debug!("no recoverable transcript, deferring consolidation");
                return Ok(());
            }
        }

        let anchor = latest_entry_timestamp(&transcript).unwrap_or_else(Utc::now);
        self.update_narrative_story(&transcript, &story, identity, anchor)
            .await?;
        self.pending.reset()?;
        Ok(())
    }

    async fn transcript_from_graph(&self, since: DateTime<Utc>) -> String {
        match self.graph.episodes_since(&self.scope, since, None).await {
            Ok(episodes) => episodes
                .iter()
                .map(|e| format!("[{}] {}", e.timestamp.to_rfc3339(), e.body))
                .collect::<Vec<_>>()
                .join("\n---\n"),
            Err(err) => {
                warn!("graph backlog unavailable: {err}");
                String::new()
            }
        }
    }

    // =========================================================================
    // NARRATIVE SYNTHESIS
    // =========================================================================

    /// Evolve the story with one transcript batch, anchored at `anchor`
    pub async fn update_narrative_story(
        &self,
        transcript: &str,
        current: &Story,
        identity: &IdentityBundle,
        anchor: DateTime<Utc>,
    ) -> Result<()> {
        let prompt = prompts::synthesis_prompt(transcript, &current.body, identity);
        let response = self
            .completion
            .complete(CompletionRequest::subconscious(prompt, &self.model))
            .await;

        if !response.has_text() {
            warn!(kind = ?response.error, "narrative synthesis returned nothing");
            return Err(MemoryError::CompletionEmpty);
        }

        let mut new_story = response.text.trim().to_string();
        let words = word_count(&new_story);
        if words > STORY_WORD_LIMIT {
            info!(words, limit = STORY_WORD_LIMIT, "story over budget, compressing");
            match self.compress(&new_story).await {
                Some(compressed) => new_story = compressed,
                None => warn!(
                    "{}; keeping uncompressed text",
                    MemoryError::StoryTooLong {
                        words,
                        limit: STORY_WORD_LIMIT,
                    }
                    .message()
                ),
            }
        }

        self.story.write(&new_story, anchor)?;
        info!(anchor = %anchor.to_rfc3339(), "story consolidated");
        Ok(())
    }

    async fn compress(&self, story_text: &str) -> Option<String> {
        let prompt = prompts::compression_prompt(story_text, STORY_WORD_LIMIT);
        let response = self
            .completion
            .complete(CompletionRequest::subconscious(prompt, &self.model))
            .await;
        response
            .has_text()
            .then(|| response.text.trim().to_string())
    }

    // =========================================================================
    // COLD-START BOOTSTRAP
    // =========================================================================

    async fn bootstrap_branch(&self, identity: &IdentityBundle) -> Result<()> {
        let files = history_files(&self.history_dir);
        if self.auto_bootstrap_history && !files.is_empty() {
            info!(files = files.len(), "bootstrapping story from historical logs");
            return self.bootstrap_from_history(&files, identity).await;
        }

        // Skeleton with an epoch anchor so the new-story branch is not
        // re-taken on every turn.
        self.story.write(
            "My story has not begun yet; everything from here on is new to me.",
            DateTime::<Utc>::UNIX_EPOCH,
        )?;
        debug!("skeleton story written");
        Ok(())
    }

    async fn bootstrap_from_history(
        &self,
        files: &[(NaiveDate, PathBuf)],
        identity: &IdentityBundle,
    ) -> Result<()> {
        let mut batch = String::new();
        let mut batch_tokens = 0usize;
        let mut latest_date: Option<NaiveDate> = None;

        for (date, path) in files {
            let content = match fs::read_to_string(path) {
                Ok(content) => content,
                Err(err) => {
                    warn!(
                        "{}",
                        MemoryError::HistoricalIngest {
                            file: path.display().to_string(),
                            reason: err.to_string(),
                        }
                        .message()
                    );
                    continue;
                }
            };

            let entry = format!("FECHA: {date}\n{content}\n---\n");
            let entry_tokens = estimate_tokens(&entry);

            if batch_tokens + entry_tokens > self.safe_token_limit && !batch.is_empty() {
                self.flush_history_batch(&batch, latest_date, identity).await?;
                batch.clear();
                batch_tokens = 0;
            }

            batch.push_str(&entry);
            batch_tokens += entry_tokens;
            latest_date = Some(latest_date.map_or(*date, |d| d.max(*date)));
        }

        if !batch.trim().is_empty() {
            self.flush_history_batch(&batch, latest_date, identity).await?;
        }
        Ok(())
    }

    async fn flush_history_batch(
        &self,
        batch: &str,
        latest_date: Option<NaiveDate>,
        identity: &IdentityBundle,
    ) -> Result<()> {
        let story = self.story.load();
        let anchor = latest_date
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
            .unwrap_or_else(Utc::now);
        self.update_narrative_story(batch, &story, identity, anchor)
            .await
    }

    // =========================================================================
    // CROSS-SESSION SYNC
    // =========================================================================

    /// Recover un-narrated messages from prior sessions on startup
    ///
    /// Skips cleanly when another process holds a fresh lock; steals a
    /// stale one. The lock is released on every exit path.
    pub async fn sync_global_narrative(
        &self,
        session_dir: &Path,
        current_session: Option<&Path>,
        identity: &IdentityBundle,
    ) -> Result<()> {
        let guard = match self.lock.acquire() {
            Ok(guard) => guard,
            Err(MemoryError::LockHeld { age_secs }) => {
                info!(age_secs, "narrative sync skipped, lock held");
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let story = self.story.load();
        let messages =
            sessions::collect_recent_messages(session_dir, story.anchor(), current_session);
        if messages.is_empty() {
            debug!("no un-narrated session messages");
            drop(guard);
            return Ok(());
        }

        info!(count = messages.len(), "recovering un-narrated session messages");
        let outcome = self.narrate_in_batches(&messages, identity).await;
        drop(guard);
        outcome
    }

    /// Absorb the caller's live message list after a context compaction
    ///
    /// Fire-and-forget from the caller's perspective: failures are logged
    /// and never propagate.
    pub async fn sync_story_with_session(
        &self,
        messages: &[SessionMessage],
        identity: &IdentityBundle,
    ) {
        let anchor = self.story.load().anchor();
        let fresh: Vec<SessionMessage> = messages
            .iter()
            .filter(|m| m.timestamp > anchor && !is_heartbeat(&m.text))
            .cloned()
            .collect();
        if fresh.is_empty() {
            return;
        }

        if let Err(err) = self.narrate_in_batches(&fresh, identity).await {
            warn!(code = err.code(), "post-compaction sync failed: {err}");
        }
    }

    /// Chunk messages by the safe token limit, flushing each batch through
    /// the synthesizer anchored at its last message
    async fn narrate_in_batches(
        &self,
        messages: &[SessionMessage],
        identity: &IdentityBundle,
    ) -> Result<()> {
        let mut batch = String::new();
        let mut batch_tokens = 0usize;
        let mut batch_last: Option<DateTime<Utc>> = None;

        for message in messages {
            let entry = format!("[{}] {}\n---\n", message.timestamp.to_rfc3339(), message.text);
            let entry_tokens = estimate_tokens(&entry);

            if batch_tokens + entry_tokens > self.safe_token_limit && !batch.is_empty() {
                self.flush_session_batch(&batch, batch_last, identity).await?;
                batch.clear();
                batch_tokens = 0;
                batch_last = None;
            }

            batch.push_str(&entry);
            batch_tokens += entry_tokens;
            batch_last = Some(message.timestamp);
        }

        if !batch.trim().is_empty() {
            self.flush_session_batch(&batch, batch_last, identity).await?;
        }
        Ok(())
    }

    async fn flush_session_batch(
        &self,
        batch: &str,
        batch_last: Option<DateTime<Utc>>,
        identity: &IdentityBundle,
    ) -> Result<()> {
        let story = self.story.load();
        let anchor = batch_last.unwrap_or_else(Utc::now);
        self.update_narrative_story(batch, &story, identity, anchor)
            .await
    }
}

/// Historical daily logs (`YYYY-MM-DD*.md`) in filename order
pub(crate) fn history_files(history_dir: &Path) -> Vec<(NaiveDate, PathBuf)> {
    let entries = match fs::read_dir(history_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut files: Vec<(NaiveDate, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_name()?.to_str()?;
            let caps = HISTORY_FILE.captures(name)?;
            let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()?;
            Some((date, path))
        })
        .collect();

    files.sort_by(|a, b| a.1.file_name().cmp(&b.1.file_name()));
    files
}

/// Latest parseable `[<iso>]` stamp in a transcript
fn latest_entry_timestamp(transcript: &str) -> Option<DateTime<Utc>> {
    ENTRY_STAMP
        .captures_iter(transcript)
        .filter_map(|caps| parse_flexible(caps[1].trim()))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_entry_timestamp() {
        let transcript = "[2026-02-01T10:00:00Z] first\n---\n[2026-02-03T09:00:00Z] last\n---\n[2026-02-02T12:00:00Z] middle\n---\n";
        let latest = latest_entry_timestamp(transcript).unwrap();
        assert_eq!(latest.to_rfc3339(), "2026-02-03T09:00:00+00:00");
    }

    #[test]
    fn test_latest_entry_timestamp_ignores_garbage() {
        assert_eq!(latest_entry_timestamp("[not a date] text\n---\n"), None);
        assert_eq!(latest_entry_timestamp(""), None);
    }
}
