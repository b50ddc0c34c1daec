//! In-memory fake for the graph adapter (testing and offline runs)
//!
//! Satisfies the `GraphAdapter` contract without a backend: episodes are
//! kept in insertion order and searches are word-overlap matches, which is
//! enough to drive the resonance and consolidation paths in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{Episode, GraphAdapter, MemoryKind, MemoryResult, NewEpisode};
use crate::errors::{MemoryError, Result};

/// Seeded retrieval entry
#[derive(Debug, Clone)]
struct Seeded {
    result: MemoryResult,
}

/// In-memory graph: ordered episodes plus seeded node/fact projections
#[derive(Default)]
pub struct InMemoryGraph {
    episodes: Mutex<Vec<Episode>>,
    nodes: Mutex<Vec<Seeded>>,
    facts: Mutex<Vec<Seeded>>,
    /// When set, every call fails with `GraphUnavailable`
    offline: Mutex<bool>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entity-style result returned by matching node searches
    pub fn seed_node(&self, content: &str, timestamp: Option<DateTime<Utc>>, boosted: bool) {
        self.nodes.lock().push(Seeded {
            result: MemoryResult {
                content: content.to_string(),
                timestamp,
                uuid: Some(Uuid::new_v4().to_string()),
                kind: MemoryKind::Node,
                boosted,
                source_query: String::new(),
            },
        });
    }

    /// Seed a relation-style result returned by matching fact searches
    pub fn seed_fact(&self, content: &str, timestamp: Option<DateTime<Utc>>, boosted: bool) {
        self.facts.lock().push(Seeded {
            result: MemoryResult {
                content: content.to_string(),
                timestamp,
                uuid: Some(Uuid::new_v4().to_string()),
                kind: MemoryKind::Fact,
                boosted,
                source_query: String::new(),
            },
        });
    }

    /// Simulate an unreachable backend
    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock() = offline;
    }

    pub fn episode_count(&self) -> usize {
        self.episodes.lock().len()
    }

    pub fn episode_bodies(&self) -> Vec<String> {
        self.episodes.lock().iter().map(|e| e.body.clone()).collect()
    }

    fn check_online(&self) -> Result<()> {
        if *self.offline.lock() {
            Err(MemoryError::GraphUnavailable("fake is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn matches(query: &str, content: &str) -> bool {
        let content_lower = content.to_lowercase();
        query
            .split_whitespace()
            .filter(|w| w.chars().count() >= 3)
            .any(|w| content_lower.contains(&w.to_lowercase()))
    }

    fn search(pool: &Mutex<Vec<Seeded>>, query: &str) -> Vec<MemoryResult> {
        pool.lock()
            .iter()
            .filter(|s| Self::matches(query, &s.result.content))
            .map(|s| {
                let mut result = s.result.clone();
                result.source_query = query.to_string();
                result
            })
            .collect()
    }
}

#[async_trait]
impl GraphAdapter for InMemoryGraph {
    async fn add_episode(&self, _scope: &str, episode: NewEpisode) -> Result<()> {
        self.check_online()?;
        let mut episodes = self.episodes.lock();
        episodes.push(Episode {
            id: Uuid::new_v4().to_string(),
            role: episode.role,
            body: episode.body,
            timestamp: episode.timestamp.unwrap_or_else(Utc::now),
            source: episode.source,
        });
        Ok(())
    }

    async fn search_nodes(&self, _scope: &str, query: &str) -> Result<Vec<MemoryResult>> {
        self.check_online()?;
        Ok(Self::search(&self.nodes, query))
    }

    async fn search_facts(&self, _scope: &str, query: &str) -> Result<Vec<MemoryResult>> {
        self.check_online()?;
        Ok(Self::search(&self.facts, query))
    }

    async fn episodes_since(
        &self,
        _scope: &str,
        since: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Episode>> {
        self.check_online()?;
        let episodes = self.episodes.lock();
        let mut selected: Vec<Episode> = episodes
            .iter()
            .filter(|e| e.timestamp > since)
            .cloned()
            .collect();
        if let Some(limit) = limit {
            selected.truncate(limit);
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EpisodeRole;

    #[tokio::test]
    async fn test_search_matches_on_word_overlap() {
        let graph = InMemoryGraph::new();
        graph.seed_node("Julio's mother lives in Miguelturra", None, false);

        let hits = graph.search_nodes("scope", "mother hometown").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_query, "mother hometown");

        let misses = graph.search_nodes("scope", "quantum physics").await.unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn test_episodes_since_filters_and_orders() {
        let graph = InMemoryGraph::new();
        let old = Utc::now() - chrono::Duration::days(2);
        graph
            .add_episode(
                "scope",
                NewEpisode {
                    role: EpisodeRole::Human,
                    body: "old turn".to_string(),
                    timestamp: Some(old),
                    source: None,
                },
            )
            .await
            .unwrap();
        graph
            .add_episode("scope", NewEpisode::now(EpisodeRole::Assistant, "new turn"))
            .await
            .unwrap();

        let since = Utc::now() - chrono::Duration::days(1);
        let recent = graph.episodes_since("scope", since, None).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].body, "new turn");
    }

    #[tokio::test]
    async fn test_offline_mode_errors() {
        let graph = InMemoryGraph::new();
        graph.set_offline(true);
        let err = graph.search_nodes("scope", "anything").await.unwrap_err();
        assert_eq!(err.code(), "GRAPH_UNAVAILABLE");
    }
}
