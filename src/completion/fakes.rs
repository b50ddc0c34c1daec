//! Scripted completion gateway for tests
//!
//! Returns canned responses in order and records every request so tests
//! can assert on models, temperatures, and prompt contents. An exhausted
//! script returns the empty completion, which downstream code treats as
//! `CompletionEmpty`.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Completion, CompletionGateway, CompletionRequest};

#[derive(Default)]
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<Completion>>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response
    pub fn push(&self, completion: Completion) {
        self.responses.lock().push_back(completion);
    }

    /// Queue a plain-text response
    pub fn push_text(&self, text: &str) {
        self.push(Completion::ok(text));
    }

    /// Requests seen so far, in order
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl CompletionGateway for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Completion {
        self.calls.lock().push(request);
        self.responses.lock().pop_front().unwrap_or_default()
    }
}
