//! Subsystem facade: the per-turn surface the agent runtime calls
//!
//! Ties the two memory tracks together: `augment_turn` hands back the
//! story plus the flashback block for system-prompt assembly, and
//! `record_exchange` files the finished turn into the graph and the
//! pending log, opportunistically triggering consolidation.
//!
//! No error escapes any method here. Internal failures are contained and
//! logged; the user-visible failure mode is an absent flashback or a
//! stale story, never a crash or a corrupt file.

use std::path::Path;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tracing::{debug, info, warn};

use crate::completion::http::SseCompletionClient;
use crate::completion::{CompletionGateway, FailoverGateway};
use crate::config::MemoryConfig;
use crate::errors::Result;
use crate::graph::http::GraphitiClient;
use crate::graph::{EpisodeRole, GraphAdapter, NewEpisode};
use crate::narrative::sessions::SessionMessage;
use crate::narrative::{self, ConsolidationEngine};
use crate::pending::PendingEpisodeLog;
use crate::resonance::{ResonancePipeline, TurnContext};
use crate::story::StoryFile;
use crate::text::is_heartbeat;
use crate::types::IdentityBundle;

/// System-prompt augmentation returned to the caller each turn
#[derive(Debug, Clone, Default)]
pub struct TurnMemory {
    /// Current story body, when one exists; assembly is the caller's job
    pub story: Option<String>,

    /// Flashback block, or the empty string when nothing resonated
    pub resonance_block: String,
}

/// The long-term memory subsystem
pub struct MindMemory {
    config: MemoryConfig,
    graph: Arc<dyn GraphAdapter>,
    pipeline: ResonancePipeline,
    engine: Option<Arc<ConsolidationEngine>>,
    pending: PendingEpisodeLog,
    story: StoryFile,
}

impl MindMemory {
    /// Wire the subsystem over explicit capability handles
    pub fn new(
        config: MemoryConfig,
        graph: Arc<dyn GraphAdapter>,
        completion: Option<Arc<dyn CompletionGateway>>,
    ) -> Self {
        let pipeline = ResonancePipeline::new(
            Arc::clone(&graph),
            completion.clone(),
            config.identity_scope.clone(),
            config.completion.model.clone(),
        );

        let engine = match (&completion, config.narrative.enabled) {
            (Some(gateway), true) => Some(Arc::new(ConsolidationEngine::new(
                Arc::clone(&graph),
                Arc::clone(gateway),
                &config,
                config.completion.model.clone(),
            ))),
            _ => None,
        };

        Self {
            pending: PendingEpisodeLog::new(&config.memory_dir),
            story: StoryFile::new(config.story_path()),
            pipeline,
            engine,
            graph,
            config,
        }
    }

    /// Wire the subsystem from configuration: Graphiti graph adapter plus
    /// an SSE completion client with the configured failover policy
    pub fn from_config(config: MemoryConfig) -> Result<Self> {
        let graph: Arc<dyn GraphAdapter> =
            Arc::new(GraphitiClient::new(&config.graphiti_base_url)?);

        let client = SseCompletionClient::new(
            &config.completion.base_url,
            config.completion.api_key.clone(),
        );
        let completion: Arc<dyn CompletionGateway> = match &config.completion.fallback_model {
            Some(fallback) => Arc::new(FailoverGateway::new(client, fallback.clone())),
            None => Arc::new(client),
        };

        Ok(Self::new(config, graph, Some(completion)))
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    // =========================================================================
    // PER-TURN FLOW
    // =========================================================================

    /// Produce the system-prompt augmentation for the coming turn
    pub async fn augment_turn(&self, turn: &TurnContext) -> TurnMemory {
        self.ensure_history_ingested().await;

        let story = self.story.load();
        let story_text = (!story.is_new()).then(|| story.body.clone());

        let resonance_block = if self.config.skip_resonance {
            debug!("resonance bypassed by configuration");
            String::new()
        } else {
            self.pipeline.resonate(turn).await
        };

        TurnMemory {
            story: story_text,
            resonance_block,
        }
    }

    /// File a finished user/assistant exchange into long-term memory
    ///
    /// Episode appends are at-least-once: a failed write is warn-logged
    /// and dropped. Consolidation runs fire-and-forget when armed.
    pub async fn record_exchange(
        &self,
        user_text: &str,
        assistant_text: &str,
        identity: &IdentityBundle,
    ) {
        let turns = [
            (EpisodeRole::Human, user_text),
            (EpisodeRole::Assistant, assistant_text),
        ];

        for (role, text) in turns {
            if text.trim().is_empty() || is_heartbeat(text) {
                continue;
            }

            if let Err(err) = self
                .graph
                .add_episode(
                    &self.config.identity_scope,
                    NewEpisode::now(role, text),
                )
                .await
            {
                warn!(role = role.as_str(), "episode ingest dropped: {err}");
            }

            if let Err(err) = self.pending.track(text) {
                warn!(role = role.as_str(), "pending log append failed: {err}");
            }
        }

        if let Some(engine) = &self.engine {
            let engine = Arc::clone(engine);
            let identity = identity.clone();
            tokio::spawn(async move {
                if let Err(err) = engine.check_and_consolidate(&identity).await {
                    warn!(code = err.code(), "consolidation pass failed: {err}");
                }
            });
        }
    }

    /// Recover narrative state from prior sessions; call once on startup
    pub async fn sync_on_startup(
        &self,
        session_dir: &Path,
        current_session: Option<&Path>,
        identity: &IdentityBundle,
    ) {
        let Some(engine) = &self.engine else {
            return;
        };
        if let Err(err) = engine
            .sync_global_narrative(session_dir, current_session, identity)
            .await
        {
            warn!(code = err.code(), "global narrative sync failed: {err}");
        }
    }

    /// Absorb the live message list after the runtime compacted its context
    pub fn handle_compaction(&self, messages: Vec<SessionMessage>, identity: IdentityBundle) {
        let Some(engine) = &self.engine else {
            return;
        };
        let engine = Arc::clone(engine);
        tokio::spawn(async move {
            engine.sync_story_with_session(&messages, &identity).await;
        });
    }

    // =========================================================================
    // COLD-START GRAPH INGEST
    // =========================================================================

    /// One-shot ingest of historical daily logs into the graph
    ///
    /// Each `memory/YYYY-MM-DD*.md` file becomes a `historical-file`
    /// episode with a `FECHA:` anchor, backdated to the file's date. A
    /// flag file marks completion; per-file failures skip the flag so the
    /// next turn retries.
    async fn ensure_history_ingested(&self) {
        let flag = self.config.bootstrap_flag_path();
        if flag.exists() {
            return;
        }

        let files = narrative::history_files(&self.config.history_dir());
        if files.is_empty() {
            return;
        }

        info!(files = files.len(), "ingesting historical logs into the graph");
        let mut all_ok = true;
        for (date, path) in &files {
            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(err) => {
                    warn!(file = %path.display(), "historical file unreadable, skipped: {err}");
                    all_ok = false;
                    continue;
                }
            };

            let timestamp = date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
            let episode = NewEpisode {
                role: EpisodeRole::HistoricalFile,
                body: format!("FECHA: {date}\n{content}"),
                timestamp,
                source: path.file_name().map(|n| n.to_string_lossy().into_owned()),
            };

            if let Err(err) = self
                .graph
                .add_episode(&self.config.identity_scope, episode)
                .await
            {
                warn!(file = %path.display(), "historical ingest dropped: {err}");
                all_ok = false;
            }
        }

        if all_ok {
            if let Err(err) = std::fs::write(&flag, Utc::now().to_rfc3339()) {
                warn!("bootstrap flag write failed: {err}");
            }
        }
    }
}
