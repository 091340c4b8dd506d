//! Fixed payload schemas for bus subjects
//!
//! Each subject carries exactly one payload shape; handlers decode through
//! [`crate::bus::Envelope::decode`] and drop malformed payloads after
//! logging once.

use crate::goal::GoalContext;
use crate::types::{GoalStatus, GoalType, Severity, Timestamp};
use crate::uncertainty::UncertaintySignals;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `input.received`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputReceived {
    pub session_id: String,
    pub text: String,
    pub timestamp: Timestamp,
}

/// `goal.created | updated | achieved | failed | archived`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalLifecycle {
    pub goal_id: Uuid,
    #[serde(rename = "type")]
    pub goal_type: GoalType,
    pub context: GoalContext,
    pub status: GoalStatus,
    pub updated_at: Timestamp,
}

/// `hypothesis.updated`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypothesisUpdated {
    pub hypothesis_id: Uuid,
    pub domain: String,
    pub confidence: f64,
    pub uncertainty: UncertaintySignals,
}

/// `workflow.completed | failed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowFinished {
    pub workflow_id: Uuid,
    pub goal_id: Option<Uuid>,
    pub status: crate::types::WorkflowStatus,
    pub artifact_ids: Vec<Uuid>,
}

/// `explanation_learning.updated`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplanationLearningUpdated {
    pub domain: String,
    pub goal_id: Uuid,
    pub hypothesis_id: Option<Uuid>,
    pub delta: f64,
    pub stats_snapshot: crate::learning::LearningStats,
}

/// `coherence.inconsistency_detected | resolved`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoherenceEvent {
    pub inconsistency_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub involved_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<Uuid>,
}
