//! Goal-triggered dispatch
//!
//! Subscribes to `goal.created` and turns freshly activated reasoning
//! goals into workflow requests. The goal document is re-read from the
//! store on receipt; the event payload is only a notification.

use crate::executor::{ExecuteRequest, IntelligentExecutor, EXPECTED_PATTERN_KEY};
use noesis_core::bus::{subjects, EventBus, SharedBus};
use noesis_core::error::Result;
use noesis_core::events::GoalLifecycle;
use noesis_core::goal::Goal;
use noesis_core::types::{GoalStatus, GoalType};
use noesis_goals::manager::GoalManager;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Converts lifecycle events into executor work
pub struct GoalDispatcher {
    bus: SharedBus,
    goals: Arc<GoalManager>,
    executor: Arc<IntelligentExecutor>,
}

impl GoalDispatcher {
    pub fn new(
        bus: SharedBus,
        goals: Arc<GoalManager>,
        executor: Arc<IntelligentExecutor>,
    ) -> Self {
        Self {
            bus,
            goals,
            executor,
        }
    }

    /// Consume `goal.created` until the bus shuts down.
    pub async fn run(&self) -> Result<()> {
        let mut sub = self.bus.subscribe(&[subjects::GOAL_CREATED]).await?;
        while let Some(envelope) = sub.recv().await {
            let event: GoalLifecycle = match envelope.decode() {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed goal event");
                    continue;
                }
            };
            if let Err(e) = self.dispatch(&event).await {
                tracing::warn!(goal_id = %event.goal_id, error = %e, "goal dispatch failed");
            }
        }
        Ok(())
    }

    /// Dispatch one event if it names an active reasoning goal.
    pub async fn dispatch(&self, event: &GoalLifecycle) -> Result<bool> {
        if event.status != GoalStatus::Active || !Self::is_dispatchable(event.goal_type) {
            return Ok(false);
        }
        let Some(goal) = self.goals.get(event.goal_id).await? else {
            tracing::warn!(goal_id = %event.goal_id, "goal vanished before dispatch");
            return Ok(false);
        };
        if goal.status != GoalStatus::Active || goal.workflow_id.is_some() {
            return Ok(false);
        }

        let request = Self::request_for(&goal);
        let executor = self.executor.clone();
        let goal_id = goal.id;
        tokio::spawn(async move {
            match executor.execute(request).await {
                Ok(response) => tracing::debug!(
                    goal_id = %goal_id,
                    workflow_id = %response.workflow_id,
                    success = response.success,
                    "goal workflow finished"
                ),
                Err(e) => tracing::warn!(goal_id = %goal_id, error = %e, "goal workflow errored"),
            }
        });
        Ok(true)
    }

    fn is_dispatchable(goal_type: GoalType) -> bool {
        matches!(
            goal_type,
            GoalType::Curiosity
                | GoalType::ActiveLearning
                | GoalType::InterventionTesting
                | GoalType::CoherenceResolution
        )
    }

    /// Build the workflow request for a goal. The task name is stable per
    /// (goal type, domain) so repeated probes reuse the cached capability.
    fn request_for(goal: &Goal) -> ExecuteRequest {
        let mut context: BTreeMap<String, String> = goal.context.extra.clone();
        context.insert("domain".to_string(), goal.context.domain.clone());
        if let Some(hypothesis_id) = goal.context.hypothesis_id {
            context.insert("hypothesis_id".to_string(), hypothesis_id.to_string());
        }
        if let Some(inconsistency_id) = &goal.context.inconsistency_id {
            context.insert("inconsistency_id".to_string(), inconsistency_id.clone());
        }
        context
            .entry(EXPECTED_PATTERN_KEY.to_string())
            .or_insert_with(|| r"(?s).+".to_string());

        ExecuteRequest {
            task_name: format!("{}_{}", goal.goal_type, goal.context.domain),
            description: goal.description.clone(),
            context,
            language: None,
            project_id: None,
            force_regenerate: false,
            max_retries: None,
            timeout: None,
            goal_id: Some(goal.id),
        }
    }
}
