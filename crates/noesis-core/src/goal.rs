//! Goal data structures
//!
//! Two representations exist on purpose:
//!
//! - [`GoalSeed`] is what the Goal Synthesiser emits into the per-domain
//!   lists. Its id is deterministic over (source entity, goal type) so
//!   re-emission inside the cooling window collapses onto the same seed.
//! - [`Goal`] is the Goal Manager's authoritative record with an opaque
//!   UUID and an enforced lifecycle.

use crate::error::{GoalError, Result};
use crate::types::{now, GoalStatus, GoalType, Priority, Timestamp};
use crate::uncertainty::UncertaintySignals;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Domain and entity links carried by a goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GoalContext {
    /// Knowledge domain the goal belongs to
    pub domain: String,

    /// Hypothesis under test, when the goal probes one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hypothesis_id: Option<Uuid>,

    /// Inconsistency being resolved, when the goal was opened by coherence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inconsistency_id: Option<String>,

    /// Free-form key/value context injected into executions
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl GoalContext {
    pub fn for_domain(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }

    pub fn with_hypothesis(mut self, hypothesis_id: Uuid) -> Self {
        self.hypothesis_id = Some(hypothesis_id);
        self
    }

    pub fn with_inconsistency(mut self, inconsistency_id: impl Into<String>) -> Self {
        self.inconsistency_id = Some(inconsistency_id.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// A synthesised goal candidate, prior to Goal Manager adoption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalSeed {
    /// Deterministic: blake3 over (source_entity_id, goal_type)
    pub id: String,

    pub description: String,
    pub goal_type: GoalType,
    pub priority: Priority,
    pub context: GoalContext,

    /// Entity whose uncertainty or candidates produced this seed
    pub source_entity_id: String,

    /// Confidence inherited from the source entity
    pub confidence: f64,

    /// Uncertainty block inherited from the source entity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<UncertaintySignals>,

    /// Epistemic level at emission time, used for tie-breaking and promotion
    pub epistemic: f64,

    pub created_at: Timestamp,
}

impl GoalSeed {
    /// Deterministic seed id for a (source entity, goal type) pair.
    pub fn deterministic_id(source_entity_id: &str, goal_type: GoalType) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(source_entity_id.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(goal_type.as_str().as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

/// A unit of intent with an authoritative lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Unique identifier
    pub id: Uuid,

    /// Human-readable description
    pub description: String,

    pub priority: Priority,
    pub status: GoalStatus,

    /// Where the goal came from (seed id, "http", converter name)
    pub origin: String,

    #[serde(rename = "type")]
    pub goal_type: GoalType,

    pub context: GoalContext,

    /// Confidence inherited from the source entity, if any
    pub confidence: f64,

    /// Uncertainty inherited from the source entity, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<UncertaintySignals>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,

    /// Workflow that is executing (or executed) this goal; immutable once set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<Uuid>,

    /// Terminal result payload, populated on achieve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Failure reason, populated on fail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl Goal {
    /// Create a goal in `Pending` state.
    pub fn new(
        description: impl Into<String>,
        goal_type: GoalType,
        context: GoalContext,
        origin: impl Into<String>,
    ) -> Self {
        let t = now();
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            priority: Priority::Medium,
            status: GoalStatus::Pending,
            origin: origin.into(),
            goal_type,
            context,
            confidence: 0.0,
            uncertainty: None,
            created_at: t,
            updated_at: t,
            workflow_id: None,
            result: None,
            failure_reason: None,
        }
    }

    /// Build a goal from an adopted seed, entering directly in `Active`.
    pub fn from_seed(seed: &GoalSeed) -> Self {
        let t = now();
        Self {
            id: Uuid::new_v4(),
            description: seed.description.clone(),
            priority: seed.priority,
            status: GoalStatus::Active,
            origin: seed.id.clone(),
            goal_type: seed.goal_type,
            context: seed.context.clone(),
            confidence: seed.confidence,
            uncertainty: seed.uncertainty,
            created_at: t,
            updated_at: t,
            workflow_id: None,
            result: None,
            failure_reason: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Validate the goal's structural invariants.
    pub fn validate(&self) -> Result<()> {
        match self.goal_type {
            GoalType::InterventionTesting if self.context.hypothesis_id.is_none() => {
                Err(GoalError::MissingLink {
                    goal_type: "intervention_testing",
                    missing: "hypothesis_id",
                }
                .into())
            }
            GoalType::CoherenceResolution if self.context.inconsistency_id.is_none() => {
                Err(GoalError::MissingLink {
                    goal_type: "coherence_resolution",
                    missing: "inconsistency_id",
                }
                .into())
            }
            _ => Ok(()),
        }
    }

    /// Transition to a new status, enforcing lifecycle order.
    pub fn transition_to(&mut self, next: GoalStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(GoalError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        self.status = next;
        self.updated_at = now();
        Ok(())
    }

    /// Attach the executing workflow. The link is write-once.
    pub fn attach_workflow(&mut self, workflow_id: Uuid) -> Result<()> {
        if let Some(existing) = self.workflow_id {
            if existing != workflow_id {
                return Err(GoalError::WorkflowIdImmutable(self.id).into());
            }
            return Ok(());
        }
        self.workflow_id = Some(workflow_id);
        self.updated_at = now();
        Ok(())
    }
}
