//! Core types shared across the Noesis runtime
//!
//! This module defines the fundamental vocabulary used everywhere:
//! - Goal status, type and priority
//! - Hypothesis status and causal classification
//! - Workflow status
//! - Timestamps

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type alias
pub type Timestamp = DateTime<Utc>;

/// Create a timestamp for the current moment
pub fn now() -> Timestamp {
    Utc::now()
}

/// Goal lifecycle status
///
/// Transitions are linear: `Pending → Active → {Achieved, Failed} → Archived`.
/// Terminal work states (`Achieved`, `Failed`) may only move to `Archived`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Pending,
    Active,
    Achieved,
    Failed,
    Archived,
}

impl GoalStatus {
    pub fn can_transition_to(self, next: GoalStatus) -> bool {
        use GoalStatus::*;
        match (self, next) {
            (Pending, Active) => true,
            (Active, Achieved) | (Active, Failed) => true,
            (Achieved, Archived) | (Failed, Archived) => true,
            (Archived, _) => false,
            (s1, s2) if s1 == s2 => true,
            _ => false,
        }
    }

    /// Terminal means no further work happens; archived goals are also terminal.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GoalStatus::Achieved | GoalStatus::Failed | GoalStatus::Archived
        )
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GoalStatus::Pending => "pending",
            GoalStatus::Active => "active",
            GoalStatus::Achieved => "achieved",
            GoalStatus::Failed => "failed",
            GoalStatus::Archived => "archived",
        };
        write!(f, "{}", s)
    }
}

/// Why a goal exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    /// Explore a high-uncertainty concept
    Curiosity,
    /// Gather targeted evidence for an uncertain belief or hypothesis
    ActiveLearning,
    /// Experimentally probe a causal hypothesis
    InterventionTesting,
    /// Resolve a detected cross-system inconsistency
    CoherenceResolution,
    /// Submitted directly through the HTTP surface
    User,
}

impl GoalType {
    /// Stable wire name, used in deterministic seed ids and payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            GoalType::Curiosity => "curiosity",
            GoalType::ActiveLearning => "active_learning",
            GoalType::InterventionTesting => "intervention_testing",
            GoalType::CoherenceResolution => "coherence_resolution",
            GoalType::User => "user",
        }
    }
}

impl fmt::Display for GoalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Goal priority
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        };
        write!(f, "{}", s)
    }
}

/// Hypothesis lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisStatus {
    #[default]
    Proposed,
    UnderTest,
    Supported,
    Refuted,
}

impl fmt::Display for HypothesisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HypothesisStatus::Proposed => "proposed",
            HypothesisStatus::UnderTest => "under_test",
            HypothesisStatus::Supported => "supported",
            HypothesisStatus::Refuted => "refuted",
        };
        write!(f, "{}", s)
    }
}

/// Causal classification of a hypothesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CausalType {
    #[default]
    None,
    ObservationalRelation,
    InferredCausalCandidate,
    ExperimentallyTestableRelation,
}

impl CausalType {
    /// Whether the hypothesis claims any causal structure at all.
    pub fn is_causal(self) -> bool {
        !matches!(self, CausalType::None)
    }
}

/// Workflow lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Created,
    Running,
    Completed,
    Failed,
    RejectedDuplicate,
}

impl WorkflowStatus {
    pub fn can_transition_to(self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::*;
        match (self, next) {
            (Created, Running) | (Created, RejectedDuplicate) => true,
            (Running, Completed) | (Running, Failed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::RejectedDuplicate
        )
    }

    /// Active workflows hold the fingerprint claim.
    pub fn is_active(self) -> bool {
        matches!(self, WorkflowStatus::Created | WorkflowStatus::Running)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Created => "created",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::RejectedDuplicate => "rejected_duplicate",
        };
        write!(f, "{}", s)
    }
}

/// Severity of a detected inconsistency
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        write!(f, "{}", s)
    }
}
