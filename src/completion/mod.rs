//! Completion gateway: single-prompt streaming text capability
//!
//! The subsystem's LLM calls (seed extraction, flashback rewrite,
//! narrative synthesis, compression) go through this contract. Stream
//! errors surface as *events* on the response, never as panics or thrown
//! errors; failover is a policy wrapped around any gateway rather than
//! woven into the call sites.

pub mod fakes;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Temperature used for subconscious (retrieval-side) calls
pub const SUBCONSCIOUS_TEMPERATURE: f32 = 0.0;

/// Temperature used for the single failover retry
pub const FAILOVER_TEMPERATURE: f32 = 0.3;

/// Classified stream error events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionErrorKind {
    RateLimited,
    Billing,
    Auth,
    Overloaded,
    Network,
    Stream,
}

/// One completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn subconscious(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            temperature: SUBCONSCIOUS_TEMPERATURE,
            max_tokens: None,
        }
    }
}

/// Completion outcome: collected text plus an optional error event
///
/// Both can be present: a stream that emitted text before erroring keeps
/// the partial text, and only empty-text errors trigger failover.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub error: Option<CompletionErrorKind>,
}

impl Completion {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error: None,
        }
    }

    pub fn failed(kind: CompletionErrorKind) -> Self {
        Self {
            text: String::new(),
            error: Some(kind),
        }
    }

    /// Usable output: non-empty text, error event or not
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Capability contract for single-prompt streaming completion
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Completion;
}

/// Retry-once failover policy over any gateway
///
/// When the primary call ends with an error event and no collected text,
/// the request is retried exactly once against the fallback model at
/// temperature 0.3. Anything beyond that is the embedding host's problem.
pub struct FailoverGateway<G> {
    inner: G,
    fallback_model: String,
}

impl<G: CompletionGateway> FailoverGateway<G> {
    pub fn new(inner: G, fallback_model: impl Into<String>) -> Self {
        Self {
            inner,
            fallback_model: fallback_model.into(),
        }
    }
}

#[async_trait]
impl<G: CompletionGateway> CompletionGateway for FailoverGateway<G> {
    async fn complete(&self, request: CompletionRequest) -> Completion {
        let primary = self.inner.complete(request.clone()).await;

        let should_failover = primary.error.is_some() && primary.text.is_empty();
        if !should_failover {
            return primary;
        }

        tracing::warn!(
            model = %request.model,
            fallback = %self.fallback_model,
            kind = ?primary.error,
            "completion error event with empty text, failing over"
        );

        let retry = CompletionRequest {
            model: self.fallback_model.clone(),
            temperature: FAILOVER_TEMPERATURE,
            ..request
        };
        self.inner.complete(retry).await
    }
}
