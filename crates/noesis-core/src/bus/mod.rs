//! Event Bus contract
//!
//! Subject-addressed publish/subscribe with at-least-once delivery. Every
//! envelope carries a unique event id so consumers can deduplicate
//! re-deliveries; per-subject ordering is not guaranteed across publishers,
//! so consumers must be commutative or reject stale writes by `updated_at`.

pub mod memory;

pub use memory::MemoryBus;

use crate::error::Result;
use crate::types::{now, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Shared handle to an event bus implementation
pub type SharedBus = Arc<dyn EventBus>;

/// Well-known subjects
pub mod subjects {
    pub const INPUT_RECEIVED: &str = "input.received";
    pub const GOAL_CREATED: &str = "goal.created";
    pub const GOAL_UPDATED: &str = "goal.updated";
    pub const GOAL_ACHIEVED: &str = "goal.achieved";
    pub const GOAL_FAILED: &str = "goal.failed";
    pub const GOAL_ARCHIVED: &str = "goal.archived";
    pub const HYPOTHESIS_UPDATED: &str = "hypothesis.updated";
    pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
    pub const WORKFLOW_FAILED: &str = "workflow.failed";
    pub const EXPLANATION_LEARNING_UPDATED: &str = "explanation_learning.updated";
    pub const COHERENCE_INCONSISTENCY_DETECTED: &str = "coherence.inconsistency_detected";
    pub const COHERENCE_RESOLVED: &str = "coherence.resolved";
}

/// A published message with its delivery metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique per publication; consumers deduplicate on this
    pub event_id: Uuid,

    /// Subject the envelope was published on
    pub subject: String,

    /// JSON payload with the subject's fixed schema
    pub payload: serde_json::Value,

    /// When the publisher handed the envelope to the bus
    pub published_at: Timestamp,
}

impl Envelope {
    pub fn new(subject: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            subject: subject.into(),
            payload,
            published_at: now(),
        }
    }

    /// Decode the payload into a typed event.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// A live subscription feeding envelopes from one or more subjects
#[derive(Debug)]
pub struct BusSubscription {
    rx: mpsc::Receiver<Envelope>,
}

impl BusSubscription {
    pub fn new(rx: mpsc::Receiver<Envelope>) -> Self {
        Self { rx }
    }

    /// Next envelope, or `None` once the bus side has shut down.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Non-blocking poll used by drain-style consumers in tests.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}

/// Subject-addressed publish/subscribe
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a payload on a subject. Delivery is at-least-once.
    async fn publish(&self, subject: &str, payload: serde_json::Value) -> Result<()>;

    /// Subscribe to a set of subjects, merged into one stream.
    async fn subscribe(&self, subs: &[&str]) -> Result<BusSubscription>;
}

/// Serialize and publish a typed event.
pub async fn publish_event<T: Serialize + Sync>(
    bus: &dyn EventBus,
    subject: &str,
    event: &T,
) -> Result<()> {
    bus.publish(subject, serde_json::to_value(event)?).await
}
