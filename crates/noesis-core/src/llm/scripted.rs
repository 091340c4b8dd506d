//! Scripted gateway - deterministic test double
//!
//! Replays a queue of canned completions and records every prompt it was
//! handed, so tests can assert on both sides of the exchange.

use crate::error::{LlmError, Result};
use crate::llm::{LlmGateway, LlmRequest, LlmResponse};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Canned-response gateway for tests and offline runs
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<LlmRequest>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one canned completion.
    pub fn push_response(&self, text: impl Into<String>) {
        self.responses.lock().push_back(text.into());
    }

    /// Every request seen so far, in order.
    pub fn recorded_prompts(&self) -> Vec<LlmRequest> {
        self.prompts.lock().clone()
    }

    /// How many requests were served.
    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl LlmGateway for ScriptedGateway {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse> {
        self.prompts.lock().push(request);
        match self.responses.lock().pop_front() {
            Some(text) => Ok(LlmResponse { text, tokens: None }),
            None => Err(LlmError::RequestFailed("script exhausted".to_string()).into()),
        }
    }
}
