//! Workflow records
//!
//! A workflow is one attempt by the Intelligent Executor to satisfy a goal
//! by synthesising, validating and running code. Records live at
//! `workflow:{id}`; the fingerprint claim key enforces the
//! duplicate-suppression window.

use crate::error::{Result, WorkflowError};
use crate::types::{now, Timestamp, WorkflowStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One validation attempt inside a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStep {
    /// 1-based attempt number
    pub attempt: u32,

    pub passed: bool,

    /// Exit code observed, when the code actually ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Why the attempt failed, when it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Produced by the executor when it accepts a goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    /// Unique identifier
    pub id: Uuid,

    /// Goal this workflow is executing, if goal-triggered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    pub status: WorkflowStatus,

    /// Stable hash over normalised description + canonical context
    pub fingerprint: String,

    pub task_name: String,
    pub description: String,
    pub language: String,

    pub started_at: Timestamp,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<Timestamp>,

    /// Terminal failure reason (`static_safety_check`, `timeout`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Workflow that owns the fingerprint, for rejected duplicates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,

    pub generated_artifact_ids: Vec<Uuid>,

    pub validation_steps: Vec<ValidationStep>,

    /// Whether a cached capability supplied the code
    pub used_cached_code: bool,
}

impl WorkflowRecord {
    pub fn new(
        task_name: impl Into<String>,
        description: impl Into<String>,
        language: impl Into<String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            goal_id: None,
            project_id: None,
            status: WorkflowStatus::Created,
            fingerprint: fingerprint.into(),
            task_name: task_name.into(),
            description: description.into(),
            language: language.into(),
            started_at: now(),
            ended_at: None,
            failure_reason: None,
            duplicate_of: None,
            generated_artifact_ids: Vec::new(),
            validation_steps: Vec::new(),
            used_cached_code: false,
        }
    }

    /// Transition to a new status, enforcing the state machine.
    pub fn transition_to(&mut self, next: WorkflowStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(WorkflowError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        self.status = next;
        if next.is_terminal() {
            self.ended_at = Some(now());
        }
        Ok(())
    }

    /// Terminal failure with a machine-readable reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition_to(WorkflowStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    /// Terminal duplicate rejection pointing at the claim owner.
    pub fn reject_duplicate(&mut self, original: impl Into<String>) -> Result<()> {
        self.transition_to(WorkflowStatus::RejectedDuplicate)?;
        self.duplicate_of = Some(original.into());
        Ok(())
    }
}
