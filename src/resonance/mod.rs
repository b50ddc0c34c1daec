//! Resonance pipeline: per-turn retrieval of topically relevant memories
//!
//! Before a non-trivial user turn, the pipeline extracts seed queries from
//! the conversation, fans them out against the knowledge graph, filters
//! what the live context already covers, and rewrites the survivors into
//! first-person flashbacks injected next to the story.
//!
//! Phases: seed extraction → graph retrieval → filtering → temporal
//! labeling → re-narrativization → injection. Any phase may short-circuit
//! to the empty block; that is a normal, non-error outcome.

pub mod echo;
pub mod prompts;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};

use crate::completion::{CompletionGateway, CompletionRequest};
use crate::constants::{
    MAX_BULLETS_PER_GROUP, MAX_RESONANT_MEMORIES, MAX_SEED_QUERIES, RECENT_CONTEXT_TURNS,
    SEED_FALLBACK_CHARS,
};
use crate::graph::{GraphAdapter, MemoryResult};
use crate::text::{
    clean_seed_line, dedup_key, is_json_only, sanitize_query, strip_metadata_block,
    strip_timestamp_tags, truncate_repetitive,
};
use crate::timeline::{effective_timestamp, relative_time_label};
use crate::types::{ChatMessage, ChatRole, IdentityBundle};
use echo::EchoBuffer;

/// Everything the pipeline needs to know about the current turn
#[derive(Debug, Clone)]
pub struct TurnContext {
    /// Raw user prompt (metadata blocks are stripped internally)
    pub prompt: String,

    /// Recent live transcript, newest last
    pub recent_messages: Vec<ChatMessage>,

    /// Persona and story, passed through to the rewrite prompts
    pub identity: IdentityBundle,

    /// Earliest timestamp still visible in the live context window
    pub oldest_context_timestamp: Option<DateTime<Utc>>,
}

/// A retrieval result that survived filtering, with its effective timestamp
#[derive(Debug, Clone)]
struct Candidate {
    result: MemoryResult,
    effective: Option<DateTime<Utc>>,
}

/// Per-turn flashback producer
pub struct ResonancePipeline {
    graph: Arc<dyn GraphAdapter>,
    completion: Option<Arc<dyn CompletionGateway>>,
    scope: String,
    model: String,
    rewrite_enabled: bool,
    echo: Mutex<EchoBuffer>,
}

impl ResonancePipeline {
    pub fn new(
        graph: Arc<dyn GraphAdapter>,
        completion: Option<Arc<dyn CompletionGateway>>,
        scope: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            completion,
            scope: scope.into(),
            model: model.into(),
            rewrite_enabled: true,
            echo: Mutex::new(EchoBuffer::default()),
        }
    }

    /// Disable the rewrite phase; groups fall back to raw bullets
    pub fn with_rewrite_disabled(mut self) -> Self {
        self.rewrite_enabled = false;
        self
    }

    /// Produce the flashback block for this turn, or the empty string
    pub async fn resonate(&self, turn: &TurnContext) -> String {
        let cleaned_prompt = strip_metadata_block(&turn.prompt);
        if cleaned_prompt.trim().is_empty() {
            return String::new();
        }

        let queries = self.extract_seed_queries(&cleaned_prompt, turn).await;
        if queries.is_empty() {
            debug!("resonance: no seed queries, skipping");
            return String::new();
        }

        let results = self.search_graph(&queries).await;
        if results.is_empty() {
            debug!("resonance: graph returned nothing");
            return String::new();
        }

        let accepted = self.filter_results(results, turn.oldest_context_timestamp);
        if accepted.is_empty() {
            debug!("resonance: all results filtered out");
            return String::new();
        }

        let groups = group_by_query(accepted, &queries);
        let blocks = self.render_groups(groups, turn).await;
        if blocks.is_empty() {
            return String::new();
        }

        format!(
            "\n---\n[SUBCONSCIOUS RESONANCE]\n{}\n---\n",
            blocks.join("\n\n")
        )
    }

    // =========================================================================
    // PHASE 1: SEED EXTRACTION
    // =========================================================================

    async fn extract_seed_queries(&self, cleaned_prompt: &str, turn: &TurnContext) -> Vec<String> {
        let Some(gateway) = &self.completion else {
            return fallback_seed(cleaned_prompt);
        };

        let recent = recent_context(&turn.recent_messages);
        let story = (!turn.identity.story.trim().is_empty()).then_some(turn.identity.story.as_str());
        let prompt = prompts::seed_extraction_prompt(cleaned_prompt, &recent, story);

        let response = gateway
            .complete(CompletionRequest::subconscious(prompt, &self.model))
            .await;

        if !response.has_text() {
            warn!(kind = ?response.error, "seed extraction failed, using prompt prefix");
            return fallback_seed(cleaned_prompt);
        }

        let stabilized = truncate_repetitive(&response.text);
        let mut seen = HashSet::new();
        let queries: Vec<String> = stabilized
            .lines()
            .map(clean_seed_line)
            .filter(|q| !q.is_empty())
            .filter(|q| seen.insert(q.to_lowercase()))
            .take(MAX_SEED_QUERIES)
            .collect();

        if queries.is_empty() {
            fallback_seed(cleaned_prompt)
        } else {
            queries
        }
    }

    // =========================================================================
    // PHASE 2: GRAPH RETRIEVAL
    // =========================================================================

    async fn search_graph(&self, queries: &[String]) -> Vec<MemoryResult> {
        let searches = queries.iter().map(|query| {
            let graph = Arc::clone(&self.graph);
            let scope = self.scope.clone();
            async move {
                let sanitized = sanitize_query(query);
                if sanitized.is_empty() {
                    return Vec::new();
                }

                let (nodes, facts) = tokio::join!(
                    graph.search_nodes(&scope, &sanitized),
                    graph.search_facts(&scope, &sanitized),
                );

                let mut found = Vec::new();
                match nodes {
                    Ok(mut results) => found.append(&mut results),
                    Err(err) => warn!(query = %sanitized, "node search failed: {err}"),
                }
                match facts {
                    Ok(mut results) => found.append(&mut results),
                    Err(err) => warn!(query = %sanitized, "fact search failed: {err}"),
                }

                // Tag with the original seed query: it names the group header
                for result in &mut found {
                    result.source_query = query.clone();
                }
                found
            }
        });

        let mut seen = HashSet::new();
        join_all(searches)
            .await
            .into_iter()
            .flatten()
            .filter(|result| seen.insert(result.identity()))
            .collect()
    }

    // =========================================================================
    // PHASE 3: FILTERING
    // =========================================================================

    fn filter_results(
        &self,
        results: Vec<MemoryResult>,
        oldest_context: Option<DateTime<Utc>>,
    ) -> Vec<Candidate> {
        // Memory horizon: anything the live window already covers is out;
        // unknown timestamps fail open.
        let mut candidates: Vec<Candidate> = results
            .into_iter()
            .map(|result| {
                let effective = effective_timestamp(&result.content, result.timestamp);
                Candidate { result, effective }
            })
            .filter(|c| match (c.effective, oldest_context) {
                (Some(ts), Some(horizon)) => ts < horizon,
                _ => true,
            })
            .collect();

        // Echo filter: skip what recent turns already surfaced, boosted
        // results excepted, then remember the survivors.
        {
            let mut echo = self.echo.lock();
            candidates.retain(|c| c.result.boosted || !echo.contains(&c.result.identity()));
            for candidate in &candidates {
                echo.remember(candidate.result.identity());
            }
        }

        // Priority sort with a randomized temporal direction so flashbacks
        // mix old and new across turns.
        let newest_first = rand::thread_rng().gen_bool(0.5);
        candidates.sort_by(|a, b| {
            b.result
                .boosted
                .cmp(&a.result.boosted)
                .then_with(|| b.result.is_fact().cmp(&a.result.is_fact()))
                .then_with(|| match (a.effective, b.effective) {
                    (Some(ta), Some(tb)) => {
                        if newest_first {
                            tb.cmp(&ta)
                        } else {
                            ta.cmp(&tb)
                        }
                    }
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
        });

        candidates.truncate(MAX_RESONANT_MEMORIES);
        candidates
    }

    // =========================================================================
    // PHASES 4-6: LABELING, REWRITE, INJECTION
    // =========================================================================

    async fn render_groups(
        &self,
        groups: Vec<(String, Vec<Candidate>)>,
        turn: &TurnContext,
    ) -> Vec<String> {
        let now = Utc::now();
        let mut emitted_keys = HashSet::new();

        let mut prepared: Vec<(String, String)> = Vec::new();
        for (query, mut members) in groups {
            // Chronological bullets, oldest first, with relative-time labels
            members.sort_by_key(|c| c.effective.unwrap_or(now));

            let mut bullets = Vec::new();
            for candidate in members {
                let content = strip_timestamp_tags(&candidate.result.content);
                if content.is_empty() || is_json_only(&content) {
                    continue;
                }
                if !emitted_keys.insert(dedup_key(&content)) {
                    continue;
                }
                let bullet = match candidate.effective {
                    Some(ts) => format!("- {}: {}", relative_time_label(ts, now), content),
                    None => format!("- {content}"),
                };
                bullets.push(bullet);
                if bullets.len() >= MAX_BULLETS_PER_GROUP {
                    break;
                }
            }

            if !bullets.is_empty() {
                prepared.push((query, bullets.join("\n")));
            }
        }

        if prepared.is_empty() {
            return Vec::new();
        }

        match &self.completion {
            Some(gateway) if self.rewrite_enabled => {
                let rewrites = prepared.iter().map(|(query, bullets)| {
                    let gateway = Arc::clone(gateway);
                    let prompt = prompts::rewrite_prompt(
                        query,
                        bullets,
                        &turn.identity,
                        &turn.prompt,
                    );
                    let model = self.model.clone();
                    async move {
                        let response = gateway
                            .complete(CompletionRequest::subconscious(prompt, model))
                            .await;
                        if response.has_text() {
                            let kept = filter_rewrite_output(&response.text);
                            if !kept.is_empty() {
                                return Some(kept);
                            }
                        }
                        None
                    }
                });

                join_all(rewrites)
                    .await
                    .into_iter()
                    .zip(prepared)
                    .map(|(rewritten, (query, bullets))| {
                        rewritten.unwrap_or_else(|| raw_group_block(&query, &bullets))
                    })
                    .collect()
            }
            _ => prepared
                .into_iter()
                .map(|(query, bullets)| raw_group_block(&query, &bullets))
                .collect(),
        }
    }
}

/// Group accepted candidates by their seed query, in seed order
fn group_by_query(accepted: Vec<Candidate>, queries: &[String]) -> Vec<(String, Vec<Candidate>)> {
    queries
        .iter()
        .filter_map(|query| {
            let members: Vec<Candidate> = accepted
                .iter()
                .filter(|c| &c.result.source_query == query)
                .cloned()
                .collect();
            (!members.is_empty()).then(|| (query.clone(), members))
        })
        .collect()
}

/// Last resort when extraction fails: a prefix of the cleaned prompt
fn fallback_seed(cleaned_prompt: &str) -> Vec<String> {
    let prefix: String = cleaned_prompt.chars().take(SEED_FALLBACK_CHARS).collect();
    let prefix = prefix.trim().to_string();
    if prefix.is_empty() {
        Vec::new()
    } else {
        vec![prefix]
    }
}

/// Recent non-system turns, oldest first, for the extraction prompt
fn recent_context(messages: &[ChatMessage]) -> String {
    let recent: Vec<&ChatMessage> = messages
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .collect();
    let start = recent.len().saturating_sub(RECENT_CONTEXT_TURNS);
    recent[start..]
        .iter()
        .map(|m| {
            let speaker = match m.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
                ChatRole::System => "system",
            };
            format!("{speaker}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keep only list-shaped or recollection-shaped lines of a rewrite
fn filter_rewrite_output(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .filter(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with('-')
                || trimmed.starts_with('*')
                || trimmed.starts_with('•')
            {
                return true;
            }
            let lower = line.to_lowercase();
            lower.contains("reminds me") || lower.contains("recuerda que")
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Raw-bullets fallback block with a programmatic transition
fn raw_group_block(query: &str, bullets: &str) -> String {
    format!("{}\n{}", prompts::fallback_transition(query), bullets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_seed_prefix() {
        let seeds = fallback_seed("a rather long prompt that keeps going well past the fifty character mark");
        assert_eq!(seeds.len(), 1);
        assert!(seeds[0].chars().count() <= SEED_FALLBACK_CHARS);

        assert!(fallback_seed("   ").is_empty());
    }

    #[test]
    fn test_recent_context_skips_system_and_caps() {
        let mut messages = vec![ChatMessage::new(ChatRole::System, "system rules")];
        for i in 0..30 {
            messages.push(ChatMessage::new(ChatRole::User, format!("turn {i}")));
        }
        let context = recent_context(&messages);
        assert!(!context.contains("system rules"));
        assert!(!context.contains("turn 9\n"));
        assert!(context.contains("turn 29"));
        assert_eq!(context.lines().count(), RECENT_CONTEXT_TURNS);
    }

    #[test]
    fn test_filter_rewrite_output() {
        let raw = "Sure! Here are the memories:\n- I remember the sea\nIt reminds me that we sang\nrandom trailing prose";
        let kept = filter_rewrite_output(raw);
        assert!(kept.contains("- I remember the sea"));
        assert!(kept.contains("reminds me that we sang"));
        assert!(!kept.contains("Sure!"));
        assert!(!kept.contains("random trailing"));
    }

    #[test]
    fn test_raw_group_block_shape() {
        let block = raw_group_block("the old house", "- a bullet");
        assert!(block.starts_with("Thinking about \"the old house\""));
        assert!(block.ends_with("- a bullet"));
    }
}
