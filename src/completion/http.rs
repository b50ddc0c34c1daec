//! SSE streaming client for OpenAI-compatible completion endpoints
//!
//! Streams `/v1/chat/completions` chunks, accumulating `delta.content`
//! text. Error chunks and transport failures become error *events* on the
//! returned `Completion`; the stream is closed either way and nothing is
//! thrown past this module.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest_eventsource::{Error as SseError, Event, EventSource};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Completion, CompletionErrorKind, CompletionGateway, CompletionRequest};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(rename = "type", default)]
    chunk_type: Option<String>,
    #[serde(default)]
    error: Option<StreamError>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Streaming completion client for OpenAI-compatible servers
pub struct SseCompletionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl SseCompletionClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl CompletionGateway for SseCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Completion {
        let body = ChatRequest {
            model: &request.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            stream: true,
            max_tokens: request.max_tokens,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let mut source = match EventSource::new(builder) {
            Ok(source) => source,
            Err(err) => {
                warn!("completion request not streamable: {err}");
                return Completion::failed(CompletionErrorKind::Network);
            }
        };

        let mut text = String::new();
        let mut error = None;

        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => {
                    if message.data.trim() == "[DONE]" {
                        break;
                    }
                    match serde_json::from_str::<StreamChunk>(&message.data) {
                        Ok(chunk) => {
                            if chunk.chunk_type.as_deref() == Some("error")
                                || chunk.error.is_some()
                            {
                                let detail = chunk
                                    .error
                                    .map(|e| e.message)
                                    .unwrap_or_else(|| message.data.clone());
                                error = Some(classify_error_message(&detail));
                                warn!("completion stream error event: {detail}");
                                break;
                            }
                            for choice in chunk.choices {
                                if let Some(content) = choice.delta.content {
                                    text.push_str(&content);
                                }
                            }
                        }
                        Err(err) => {
                            debug!("unparseable stream chunk skipped: {err}");
                        }
                    }
                }
                Err(SseError::StreamEnded) => break,
                Err(err) => {
                    if text.is_empty() {
                        error = Some(classify_transport(&err));
                    }
                    warn!("completion stream terminated: {err}");
                    break;
                }
            }
        }
        source.close();

        Completion { text, error }
    }
}

/// Map an in-band error message onto the provider taxonomy
fn classify_error_message(message: &str) -> CompletionErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("rate limit") || lower.contains("429") {
        CompletionErrorKind::RateLimited
    } else if lower.contains("billing") || lower.contains("quota") || lower.contains("payment") {
        CompletionErrorKind::Billing
    } else if lower.contains("auth") || lower.contains("api key") || lower.contains("401") {
        CompletionErrorKind::Auth
    } else if lower.contains("overload") || lower.contains("capacity") {
        CompletionErrorKind::Overloaded
    } else {
        CompletionErrorKind::Stream
    }
}

/// Map transport-layer failures onto the provider taxonomy
fn classify_transport(err: &SseError) -> CompletionErrorKind {
    match err {
        SseError::InvalidStatusCode(status, _) => match status.as_u16() {
            401 | 403 => CompletionErrorKind::Auth,
            402 => CompletionErrorKind::Billing,
            429 => CompletionErrorKind::RateLimited,
            500..=599 => CompletionErrorKind::Overloaded,
            _ => CompletionErrorKind::Stream,
        },
        SseError::Transport(_) => CompletionErrorKind::Network,
        _ => CompletionErrorKind::Stream,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_error_message() {
        assert_eq!(
            classify_error_message("Rate limit exceeded, retry later"),
            CompletionErrorKind::RateLimited
        );
        assert_eq!(
            classify_error_message("billing hard limit reached"),
            CompletionErrorKind::Billing
        );
        assert_eq!(
            classify_error_message("invalid api key"),
            CompletionErrorKind::Auth
        );
        assert_eq!(
            classify_error_message("something odd"),
            CompletionErrorKind::Stream
        );
    }

    #[test]
    fn test_chunk_decoding() {
        let data = r#"{"choices":[{"delta":{"content":"hola"}}]}"#;
        let chunk: StreamChunk = serde_json::from_str(data).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("hola"));

        let data = r#"{"type":"error","error":{"message":"rate limit"}}"#;
        let chunk: StreamChunk = serde_json::from_str(data).unwrap();
        assert_eq!(chunk.chunk_type.as_deref(), Some("error"));
    }
}
