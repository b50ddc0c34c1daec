//! Graph adapter contract and memory projections
//!
//! The episodic knowledge graph lives behind this trait: the core appends
//! episodes and runs entity (node) and relation (fact) searches, and never
//! sees the backing store. Retrieval results come back as a single tagged
//! `MemoryResult` type so ranking never has to sniff shapes at runtime.
//!
//! Implementations: [`http::GraphitiClient`] binds to a Graphiti-style
//! REST service; [`fakes::InMemoryGraph`] satisfies the contract for tests
//! and offline runs.

pub mod fakes;
pub mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::Result;

/// Which retrieval call produced a memory projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Entity-centric projection
    Node,
    /// Relation-centric projection
    Fact,
}

/// Read-only retrieval result from the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryResult {
    /// Content text as stored in the graph
    pub content: String,

    /// The record's own timestamp, when the backend tracks one
    pub timestamp: Option<DateTime<Utc>>,

    /// Backend identifier, when available
    pub uuid: Option<String>,

    /// Node or Fact, by the call that produced it
    pub kind: MemoryKind,

    /// Priority flag honored during ranking and echo filtering
    #[serde(default)]
    pub boosted: bool,

    /// The seed query that surfaced this result
    #[serde(default)]
    pub source_query: String,
}

impl MemoryResult {
    /// Stable identity for deduplication: uuid if present, else a content hash
    pub fn identity(&self) -> String {
        match &self.uuid {
            Some(uuid) if !uuid.is_empty() => uuid.clone(),
            _ => {
                let mut hasher = Sha256::new();
                hasher.update(self.content.as_bytes());
                format!("{:x}", hasher.finalize())
            }
        }
    }

    pub fn is_fact(&self) -> bool {
        self.kind == MemoryKind::Fact
    }
}

/// Author role of an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EpisodeRole {
    Human,
    Assistant,
    System,
    HistoricalFile,
}

impl EpisodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::HistoricalFile => "historical-file",
        }
    }
}

/// Episode to append; the timestamp may predate wall clock for backfill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEpisode {
    pub role: EpisodeRole,
    pub body: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub source: Option<String>,
}

impl NewEpisode {
    pub fn now(role: EpisodeRole, body: impl Into<String>) -> Self {
        Self {
            role,
            body: body.into(),
            timestamp: None,
            source: None,
        }
    }
}

/// Stored episode as returned by backlog reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub role: EpisodeRole,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub source: Option<String>,
}

/// Capability contract for the episodic knowledge graph
///
/// `add_episode` returns when the write is queued, not when it is indexed;
/// appender discipline is at-least-once with duplicates tolerated.
#[async_trait]
pub trait GraphAdapter: Send + Sync {
    /// Append an episode under the identity scope
    async fn add_episode(&self, scope: &str, episode: NewEpisode) -> Result<()>;

    /// Entity-oriented semantic search; results carry `kind = Node`
    async fn search_nodes(&self, scope: &str, query: &str) -> Result<Vec<MemoryResult>>;

    /// Relation-oriented semantic search; results carry `kind = Fact`
    async fn search_facts(&self, scope: &str, query: &str) -> Result<Vec<MemoryResult>>;

    /// Chronological backlog since a point in time
    async fn episodes_since(
        &self,
        scope: &str,
        since: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Episode>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_prefers_uuid() {
        let result = MemoryResult {
            content: "anything".to_string(),
            timestamp: None,
            uuid: Some("abc-123".to_string()),
            kind: MemoryKind::Node,
            boosted: false,
            source_query: String::new(),
        };
        assert_eq!(result.identity(), "abc-123");
    }

    #[test]
    fn test_identity_content_hash_is_stable() {
        let make = |content: &str| MemoryResult {
            content: content.to_string(),
            timestamp: None,
            uuid: None,
            kind: MemoryKind::Fact,
            boosted: false,
            source_query: String::new(),
        };
        assert_eq!(make("same text").identity(), make("same text").identity());
        assert_ne!(make("same text").identity(), make("other text").identity());
    }

    #[test]
    fn test_role_strings() {
        assert_eq!(EpisodeRole::HistoricalFile.as_str(), "historical-file");
        assert_eq!(EpisodeRole::Human.as_str(), "human");
    }
}
