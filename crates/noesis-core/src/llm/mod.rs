//! LLM gateway contract
//!
//! Text generation is an external collaborator reached through
//! [`LlmGateway`]. Requests carry a priority class (the gateway queues by
//! it) and an explicit deadline; the core never blocks without one.

pub mod http;
pub mod scripted;

pub use http::HttpLlmGateway;
pub use scripted::ScriptedGateway;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Shared handle to a gateway implementation
pub type SharedLlm = Arc<dyn LlmGateway>;

/// Queue class for a generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmPriority {
    /// Background capability refreshes
    Low,
    /// Hypothesis generation and routine synthesis
    Normal,
    /// Hypothesis-testing workflows
    High,
}

/// One generation request
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Instructions fixed for the whole exchange
    pub system: String,

    /// The task-specific prompt
    pub prompt: String,

    pub priority: LlmPriority,

    /// Hard wall-clock deadline for the round trip
    pub deadline: Duration,
}

impl LlmRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            priority: LlmPriority::Normal,
            deadline: Duration::from_secs(60),
        }
    }

    pub fn with_priority(mut self, priority: LlmPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// One generation response
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The completion text
    pub text: String,

    /// Token cost reported by the gateway, when available
    pub tokens: Option<u32>,
}

/// Request/response text generation with priorities and deadlines
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse>;
}
