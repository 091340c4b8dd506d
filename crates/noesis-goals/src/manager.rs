//! Goal Manager
//!
//! Authoritative lifecycle store for goals. Every transition writes the
//! store first and publishes the lifecycle event second, so a consumer
//! observing `goal.achieved` finds status=achieved on its first read.
//! Stale transitions (based on an outdated `updated_at`) are rejected.

use noesis_core::bus::{self, subjects, SharedBus};
use noesis_core::error::{GoalError, Result};
use noesis_core::events::GoalLifecycle;
use noesis_core::goal::{Goal, GoalSeed};
use noesis_core::store::{keys, SharedStore, StateStore};
use noesis_core::types::GoalStatus;
use uuid::Uuid;

/// Authoritative store for goals
pub struct GoalManager {
    store: SharedStore,
    bus: SharedBus,
    agent_id: String,
}

impl GoalManager {
    pub fn new(store: SharedStore, bus: SharedBus, agent_id: impl Into<String>) -> Self {
        Self {
            store,
            bus,
            agent_id: agent_id.into(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Create a goal and publish `goal.created`.
    pub async fn create(&self, goal: Goal) -> Result<Uuid> {
        goal.validate()?;
        let id = goal.id;

        self.store
            .set(&keys::goal(id), &serde_json::to_string(&goal)?)
            .await?;
        self.store
            .set_add(&keys::goals_history(&self.agent_id), &id.to_string())
            .await?;
        if !goal.status.is_terminal() {
            self.store
                .set_add(&keys::goals_active(&self.agent_id), &id.to_string())
                .await?;
        }

        self.publish(subjects::GOAL_CREATED, &goal).await?;
        tracing::info!(goal_id = %id, goal_type = %goal.goal_type, "goal created");
        Ok(id)
    }

    /// Adopt a synthesised seed as an Active goal.
    pub async fn create_from_seed(&self, seed: &GoalSeed) -> Result<Uuid> {
        self.create(Goal::from_seed(seed)).await
    }

    /// Read one goal.
    pub async fn get(&self, id: Uuid) -> Result<Option<Goal>> {
        match self.store.get(&keys::goal(id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Goals currently in a non-terminal state for one agent.
    pub async fn list_active(&self, agent_id: &str) -> Result<Vec<Goal>> {
        self.collect(&keys::goals_active(agent_id)).await
    }

    /// Every goal ever owned by one agent.
    pub async fn list_all(&self, agent_id: &str) -> Result<Vec<Goal>> {
        self.collect(&keys::goals_history(agent_id)).await
    }

    /// Transition a goal to Achieved with a result payload.
    pub async fn achieve(&self, id: Uuid, result: serde_json::Value) -> Result<Goal> {
        self.finish(id, GoalStatus::Achieved, Some(result), None)
            .await
    }

    /// Transition a goal to Failed with a reason.
    pub async fn fail(&self, id: Uuid, reason: impl Into<String>) -> Result<Goal> {
        self.finish(id, GoalStatus::Failed, None, Some(reason.into()))
            .await
    }

    /// Archive a terminal goal.
    pub async fn archive(&self, id: Uuid) -> Result<Goal> {
        let mut goal = self.load(id).await?;
        goal.transition_to(GoalStatus::Archived)?;
        self.persist(&goal).await?;
        self.publish(subjects::GOAL_ARCHIVED, &goal).await?;
        Ok(goal)
    }

    /// Activate a pending goal.
    pub async fn activate(&self, id: Uuid) -> Result<Goal> {
        let mut goal = self.load(id).await?;
        goal.transition_to(GoalStatus::Active)?;
        self.persist(&goal).await?;
        self.publish(subjects::GOAL_UPDATED, &goal).await?;
        Ok(goal)
    }

    /// Attach the executing workflow (write-once) and publish `goal.updated`.
    pub async fn attach_workflow(&self, id: Uuid, workflow_id: Uuid) -> Result<Goal> {
        let mut goal = self.load(id).await?;
        goal.attach_workflow(workflow_id)?;
        self.persist(&goal).await?;
        self.publish(subjects::GOAL_UPDATED, &goal).await?;
        Ok(goal)
    }

    async fn finish(
        &self,
        id: Uuid,
        status: GoalStatus,
        result: Option<serde_json::Value>,
        reason: Option<String>,
    ) -> Result<Goal> {
        let mut goal = self.load(id).await?;
        let stored_updated_at = goal.updated_at;

        goal.transition_to(status)?;
        goal.result = result;
        goal.failure_reason = reason;

        // Reject if someone finished the goal between our read and write.
        if let Some(current) = self.get(id).await? {
            if current.updated_at > stored_updated_at {
                return Err(GoalError::StaleUpdate {
                    id,
                    incoming: stored_updated_at.to_rfc3339(),
                    stored: current.updated_at.to_rfc3339(),
                }
                .into());
            }
        }

        // Store write precedes event publication.
        self.persist(&goal).await?;
        self.store
            .set_remove(&keys::goals_active(&self.agent_id), &id.to_string())
            .await?;

        let subject = match status {
            GoalStatus::Achieved => subjects::GOAL_ACHIEVED,
            GoalStatus::Failed => subjects::GOAL_FAILED,
            _ => subjects::GOAL_UPDATED,
        };
        self.publish(subject, &goal).await?;
        tracing::info!(goal_id = %id, status = %status, "goal finished");
        Ok(goal)
    }

    async fn load(&self, id: Uuid) -> Result<Goal> {
        self.get(id).await?.ok_or_else(|| GoalError::NotFound(id).into())
    }

    async fn persist(&self, goal: &Goal) -> Result<()> {
        self.store
            .set(&keys::goal(goal.id), &serde_json::to_string(goal)?)
            .await
    }

    async fn publish(&self, subject: &str, goal: &Goal) -> Result<()> {
        bus::publish_event(
            self.bus.as_ref(),
            subject,
            &GoalLifecycle {
                goal_id: goal.id,
                goal_type: goal.goal_type,
                context: goal.context.clone(),
                status: goal.status,
                updated_at: goal.updated_at,
            },
        )
        .await
    }

    async fn collect(&self, set_key: &str) -> Result<Vec<Goal>> {
        let ids = self.store.set_members(set_key).await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(goal_id) = id.parse::<Uuid>() else {
                tracing::warn!(%id, "dropping malformed goal id in set");
                continue;
            };
            if let Some(goal) = self.get(goal_id).await? {
                out.push(goal);
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noesis_core::bus::{EventBus, MemoryBus};
    use noesis_core::goal::GoalContext;
    use noesis_core::store::MemoryStore;
    use noesis_core::types::GoalType;
    use serde_json::json;
    use std::sync::Arc;

    fn manager() -> (SharedStore, SharedBus, GoalManager) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let bus: SharedBus = Arc::new(MemoryBus::new());
        let manager = GoalManager::new(store.clone(), bus.clone(), "agent_1");
        (store, bus, manager)
    }

    fn active_goal() -> Goal {
        let mut goal = Goal::new(
            "explore plasma conductivity",
            GoalType::Curiosity,
            GoalContext::for_domain("physics"),
            "test",
        );
        goal.status = GoalStatus::Active;
        goal
    }

    #[tokio::test]
    async fn test_create_and_read_back() {
        let (_store, _bus, manager) = manager();
        let id = manager.create(active_goal()).await.unwrap();

        let goal = manager.get(id).await.unwrap().unwrap();
        assert_eq!(goal.status, GoalStatus::Active);
        assert_eq!(manager.list_active("agent_1").await.unwrap().len(), 1);
        assert_eq!(manager.list_all("agent_1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_achieve_writes_store_before_event() {
        let (store, bus, manager) = manager();
        let mut sub = bus.subscribe(&[subjects::GOAL_ACHIEVED]).await.unwrap();

        let id = manager.create(active_goal()).await.unwrap();
        manager.achieve(id, json!({"found": true})).await.unwrap();

        let envelope = sub.recv().await.unwrap();
        let event: GoalLifecycle = envelope.decode().unwrap();
        assert_eq!(event.status, GoalStatus::Achieved);

        // An observer reading on first receipt must see the new status.
        let stored: Goal =
            serde_json::from_str(&store.get(&keys::goal(id)).await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.status, GoalStatus::Achieved);
        assert_eq!(stored.result, Some(json!({"found": true})));

        // Terminal goals leave the active set but stay in history.
        assert!(manager.list_active("agent_1").await.unwrap().is_empty());
        assert_eq!(manager.list_all("agent_1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_records_reason_and_publishes() {
        let (_store, bus, manager) = manager();
        let mut sub = bus.subscribe(&[subjects::GOAL_FAILED]).await.unwrap();

        let id = manager.create(active_goal()).await.unwrap();
        let goal = manager.fail(id, "validation_exhausted").await.unwrap();
        assert_eq!(goal.failure_reason.as_deref(), Some("validation_exhausted"));

        let event: GoalLifecycle = sub.recv().await.unwrap().decode().unwrap();
        assert_eq!(event.status, GoalStatus::Failed);
    }

    #[tokio::test]
    async fn test_lifecycle_rejections() {
        let (_store, _bus, manager) = manager();
        let id = manager.create(active_goal()).await.unwrap();

        manager.achieve(id, json!({})).await.unwrap();
        // Terminal goals cannot be achieved or failed again.
        assert!(manager.achieve(id, json!({})).await.is_err());
        assert!(manager.fail(id, "late").await.is_err());
        // Archiving is the one remaining legal move.
        manager.archive(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_pending_goal_activation() {
        let (_store, _bus, manager) = manager();
        let goal = Goal::new(
            "user goal",
            GoalType::User,
            GoalContext::for_domain("general"),
            "http",
        );
        let id = manager.create(goal).await.unwrap();
        assert!(manager.achieve(id, json!({})).await.is_err());

        manager.activate(id).await.unwrap();
        manager.achieve(id, json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn test_attach_workflow_once() {
        let (_store, _bus, manager) = manager();
        let id = manager.create(active_goal()).await.unwrap();

        let wid = Uuid::new_v4();
        manager.attach_workflow(id, wid).await.unwrap();
        assert!(manager.attach_workflow(id, Uuid::new_v4()).await.is_err());

        let goal = manager.get(id).await.unwrap().unwrap();
        assert_eq!(goal.workflow_id, Some(wid));
    }

    #[tokio::test]
    async fn test_invalid_goal_rejected_at_create() {
        let (_store, _bus, manager) = manager();
        let goal = Goal::new(
            "probe without link",
            GoalType::InterventionTesting,
            GoalContext::for_domain("physics"),
            "test",
        );
        assert!(manager.create(goal).await.is_err());
    }
}
