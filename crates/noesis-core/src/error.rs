//! Error types for Noesis Core
//!
//! This module defines all error types used throughout the Noesis core engine.
//! We use `thiserror` for ergonomic error definitions with automatic Display/Error implementations.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for Noesis operations
pub type Result<T> = std::result::Result<T, NoesisError>;

/// Main error type for Noesis operations
#[derive(Error, Debug)]
pub enum NoesisError {
    /// State store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Event bus errors
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// Goal-related errors
    #[error("Goal error: {0}")]
    Goal(#[from] GoalError),

    /// Hypothesis-related errors
    #[error("Hypothesis error: {0}")]
    Hypothesis(#[from] HypothesisError),

    /// Workflow-related errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// LLM gateway errors
    #[error("LLM gateway error: {0}")]
    Llm(#[from] LlmError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        source: Box<NoesisError>,
    },
}

/// Errors from the state store contract
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Wrong value shape at key {key}: expected {expected}")]
    WrongShape { key: String, expected: &'static str },

    #[error("Conditional write lost at key {0}")]
    ClaimLost(String),

    #[error("Store unreachable: {0}")]
    Unreachable(String),
}

/// Errors from the event bus contract
#[derive(Error, Debug, Clone)]
pub enum BusError {
    #[error("Publish failed on subject {subject}: {reason}")]
    PublishFailed { subject: String, reason: String },

    #[error("Subscription closed for subject {0}")]
    SubscriptionClosed(String),

    #[error("Malformed payload on subject {0}")]
    MalformedPayload(String),
}

/// Errors related to goal operations
#[derive(Error, Debug, Clone)]
pub enum GoalError {
    #[error("Goal not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid goal state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Goal of type {goal_type} is missing required link: {missing}")]
    MissingLink {
        goal_type: &'static str,
        missing: &'static str,
    },

    #[error("Stale update for goal {id}: incoming {incoming} not after stored {stored}")]
    StaleUpdate {
        id: Uuid,
        incoming: String,
        stored: String,
    },

    #[error("Workflow id already set for goal {0}")]
    WorkflowIdImmutable(Uuid),
}

/// Errors related to hypothesis operations
#[derive(Error, Debug, Clone)]
pub enum HypothesisError {
    #[error("Hypothesis not found: {0}")]
    NotFound(Uuid),

    #[error("Confidence must be in [0.0, 1.0], got {0}")]
    InvalidConfidence(f64),

    #[error("Testable hypothesis {0} has no intervention goals")]
    MissingInterventions(Uuid),
}

/// Errors related to workflow execution
#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid workflow state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Duplicate workflow for fingerprint {fingerprint}, original {original}")]
    Duplicate {
        fingerprint: String,
        original: String,
    },

    #[error("Code rejected by safety policy: {0}")]
    SafetyRejected(String),

    #[error("Synthesis exhausted after {0} attempts")]
    SynthesisExhausted(u32),

    #[error("Validation exhausted after {0} attempts")]
    ValidationExhausted(u32),

    #[error("Workflow exceeded its wall-clock budget of {0}s")]
    Timeout(u64),

    #[error("Artifact pair-write failed and was rolled back: {0}")]
    ArtifactRollback(String),
}

/// Errors from the LLM gateway contract
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("Gateway request failed: {0}")]
    RequestFailed(String),

    #[error("Gateway returned empty completion")]
    EmptyCompletion,

    #[error("Gateway deadline of {0}ms exceeded")]
    DeadlineExceeded(u64),
}

impl NoesisError {
    /// Add context to an error
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to a Result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add lazy context to a Result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.context(f()))
    }
}
