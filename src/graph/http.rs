//! Graphiti REST binding for the graph adapter
//!
//! Talks to a Graphiti-style knowledge-graph service over HTTP. Transport
//! failures and non-success statuses are mapped onto the subsystem error
//! taxonomy; callers treat both as "the graph contributed nothing" and
//! keep going.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Episode, EpisodeRole, GraphAdapter, MemoryKind, MemoryResult, NewEpisode};
use crate::errors::{MemoryError, Result};

/// Default request timeout against the graph service
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Results requested per search call
const SEARCH_LIMIT: usize = 20;

/// HTTP client for a Graphiti-style graph service
pub struct GraphitiClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct AddMessagesRequest<'a> {
    group_id: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    content: &'a str,
    role_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_description: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    group_id: &'a str,
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct NodeSearchResponse {
    #[serde(default)]
    nodes: Vec<WireNode>,
}

#[derive(Debug, Deserialize)]
struct WireNode {
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct FactSearchResponse {
    #[serde(default)]
    facts: Vec<WireFact>,
}

#[derive(Debug, Deserialize)]
struct WireFact {
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    fact: String,
    #[serde(default)]
    valid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct EpisodesResponse {
    #[serde(default)]
    episodes: Vec<WireEpisode>,
}

#[derive(Debug, Deserialize)]
struct WireEpisode {
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    role_type: Option<String>,
    #[serde(default)]
    content: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    source_description: Option<String>,
}

impl GraphitiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| MemoryError::GraphUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json<T: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| MemoryError::GraphUnavailable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            let detail = response.text().await.unwrap_or_default();
            return Err(MemoryError::GraphSyntax(detail));
        }
        if !status.is_success() {
            return Err(MemoryError::GraphUnavailable(format!(
                "{url} returned {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MemoryError::GraphUnavailable(format!("decode failed: {e}")))
    }
}

#[async_trait]
impl GraphAdapter for GraphitiClient {
    async fn add_episode(&self, scope: &str, episode: NewEpisode) -> Result<()> {
        let request = AddMessagesRequest {
            group_id: scope,
            messages: vec![WireMessage {
                content: &episode.body,
                role_type: episode.role.as_str(),
                timestamp: episode.timestamp.map(|ts| ts.to_rfc3339()),
                source_description: episode.source.as_deref(),
            }],
        };

        // The service queues the write; indexing completes asynchronously.
        let url = format!("{}/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| MemoryError::GraphUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MemoryError::GraphUnavailable(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn search_nodes(&self, scope: &str, query: &str) -> Result<Vec<MemoryResult>> {
        let request = SearchRequest {
            group_id: scope,
            query,
            max_results: SEARCH_LIMIT,
        };
        let response: NodeSearchResponse = self.post_json("/search/nodes", &request).await?;

        Ok(response
            .nodes
            .into_iter()
            .map(|node| {
                let content = match (&node.name, &node.summary) {
                    (Some(name), Some(summary)) if !summary.is_empty() => {
                        format!("{name}: {summary}")
                    }
                    (Some(name), _) => name.clone(),
                    (None, Some(summary)) => summary.clone(),
                    (None, None) => String::new(),
                };
                MemoryResult {
                    content,
                    timestamp: node.created_at,
                    uuid: node.uuid,
                    kind: MemoryKind::Node,
                    boosted: false,
                    source_query: query.to_string(),
                }
            })
            .filter(|r| !r.content.is_empty())
            .collect())
    }

    async fn search_facts(&self, scope: &str, query: &str) -> Result<Vec<MemoryResult>> {
        let request = SearchRequest {
            group_id: scope,
            query,
            max_results: SEARCH_LIMIT,
        };
        let response: FactSearchResponse = self.post_json("/search/facts", &request).await?;

        Ok(response
            .facts
            .into_iter()
            .filter(|f| !f.fact.is_empty())
            .map(|f| MemoryResult {
                content: f.fact,
                timestamp: f.valid_at.or(f.created_at),
                uuid: f.uuid,
                kind: MemoryKind::Fact,
                boosted: false,
                source_query: query.to_string(),
            })
            .collect())
    }

    async fn episodes_since(
        &self,
        scope: &str,
        since: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<Episode>> {
        let mut url = format!(
            "{}/episodes/{}?since={}",
            self.base_url,
            scope,
            since.to_rfc3339()
        );
        if let Some(limit) = limit {
            url.push_str(&format!("&limit={limit}"));
        }

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MemoryError::GraphUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MemoryError::GraphUnavailable(format!(
                "{url} returned {}",
                response.status()
            )));
        }

        let decoded: EpisodesResponse = response
            .json()
            .await
            .map_err(|e| MemoryError::GraphUnavailable(format!("decode failed: {e}")))?;

        Ok(decoded
            .episodes
            .into_iter()
            .map(|e| Episode {
                id: e.uuid.unwrap_or_default(),
                role: parse_role(e.role_type.as_deref()),
                body: e.content,
                timestamp: e.created_at,
                source: e.source_description,
            })
            .collect())
    }
}

fn parse_role(raw: Option<&str>) -> EpisodeRole {
    match raw {
        Some("human") => EpisodeRole::Human,
        Some("assistant") => EpisodeRole::Assistant,
        Some("historical-file") => EpisodeRole::HistoricalFile,
        _ => EpisodeRole::System,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = GraphitiClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url, "http://localhost:8000");
    }

    #[test]
    fn test_parse_role() {
        assert_eq!(parse_role(Some("human")), EpisodeRole::Human);
        assert_eq!(parse_role(Some("weird")), EpisodeRole::System);
        assert_eq!(parse_role(None), EpisodeRole::System);
    }
}
