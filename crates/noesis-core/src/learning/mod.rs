//! Explanation-Learning Feedback
//!
//! Consumes terminal goal events, scores how well the linked hypothesis
//! predicted the outcome, feeds the score back into hypothesis confidence
//! through the engine, and maintains per-domain statistics and the
//! confidence-scaling factor.
//!
//! Only this path writes hypothesis confidence, and only in response to a
//! terminal goal event. Processing is idempotent per
//! (goal_id, status, updated_at).

use crate::bus::{self, subjects, BusSubscription, EventBus, SharedBus};
use crate::error::Result;
use crate::events::{ExplanationLearningUpdated, GoalLifecycle};
use crate::goal::Goal;
use crate::hypothesis::HypothesisEngine;
use crate::knowledge::Belief;
use crate::store::{keys, SharedStore, StateStore};
use crate::types::{now, GoalStatus, Timestamp};
use crate::workflow::WorkflowRecord;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// TTL on the idempotence ledger entries.
const PROCESSED_TTL: Duration = Duration::from_secs(3600);

/// Per-event adjustment applied to the domain scaling factor.
const SCALING_STEP: f64 = 0.05;

/// Base magnitude of one feedback-driven belief confidence step.
const BELIEF_STEP: f64 = 0.08;

/// Bounds on the per-domain confidence scaling factor.
pub const SCALING_MIN: f64 = 0.5;
pub const SCALING_MAX: f64 = 1.5;

/// Per-domain feedback statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    pub domain: String,
    pub processed: u64,
    pub positive: u64,
    pub negative: u64,
    pub cumulative_delta: f64,
    pub last_updated: Timestamp,
}

impl LearningStats {
    fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            processed: 0,
            positive: 0,
            negative: 0,
            cumulative_delta: 0.0,
            last_updated: now(),
        }
    }
}

/// Map a workflow outcome to a score in [-1, +1].
///
/// `base` comes from the terminal goal status, `pass_ratio` from the
/// workflow's validation steps, `report_score` from an embedded hypothesis
/// test report when one was produced. Bounded and monotone in each input.
pub fn score_outcome(achieved: bool, pass_ratio: Option<f64>, report_score: Option<f64>) -> f64 {
    let base: f64 = if achieved { 1.0 } else { -1.0 };
    let ratio = pass_ratio.unwrap_or(if achieved { 1.0 } else { 0.0 });
    let report = report_score.unwrap_or(base).clamp(-1.0, 1.0);
    (0.5 * base + 0.3 * (2.0 * ratio.clamp(0.0, 1.0) - 1.0) + 0.2 * report).clamp(-1.0, 1.0)
}

/// Parse a `score:` line out of a hypothesis test report body.
pub fn parse_report_score(report: &str) -> Option<f64> {
    report.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("score:")?;
        rest.trim().parse::<f64>().ok().map(|v| v.clamp(-1.0, 1.0))
    })
}

/// The per-event outcome of feedback processing
#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackOutcome {
    /// The event was applied; carries the confidence delta
    Applied { delta: f64 },
    /// The event had already been processed and was skipped
    Duplicate,
    /// The event carried no actionable goal state
    Ignored,
}

/// Subscribes to terminal goal events and closes the learning loop
pub struct FeedbackProcessor {
    store: SharedStore,
    bus: SharedBus,
    engine: HypothesisEngine,
}

impl FeedbackProcessor {
    pub fn new(store: SharedStore, bus: SharedBus, engine: HypothesisEngine) -> Self {
        Self { store, bus, engine }
    }

    /// Subscribe to the terminal goal subjects.
    pub async fn subscription(&self) -> Result<BusSubscription> {
        self.bus
            .subscribe(&[subjects::GOAL_ACHIEVED, subjects::GOAL_FAILED])
            .await
    }

    /// Consume events until the bus shuts down.
    pub async fn run(&self) -> Result<()> {
        let mut sub = self.subscription().await?;
        while let Some(envelope) = sub.recv().await {
            let event: GoalLifecycle = match envelope.decode() {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, subject = %envelope.subject, "dropping malformed goal event");
                    continue;
                }
            };
            if let Err(e) = self.process_event(&event).await {
                tracing::warn!(goal_id = %event.goal_id, error = %e, "feedback processing failed");
            }
        }
        Ok(())
    }

    /// Apply one terminal goal event.
    pub async fn process_event(&self, event: &GoalLifecycle) -> Result<FeedbackOutcome> {
        if !matches!(event.status, GoalStatus::Achieved | GoalStatus::Failed) {
            return Ok(FeedbackOutcome::Ignored);
        }

        // At-least-once delivery: claim the ledger entry first.
        let ledger_key = keys::learning_processed(
            event.goal_id,
            &event.status.to_string(),
            &event.updated_at.to_rfc3339(),
        );
        if !self.store.set_nx_ttl(&ledger_key, "1", PROCESSED_TTL).await? {
            tracing::debug!(goal_id = %event.goal_id, "duplicate goal event skipped");
            return Ok(FeedbackOutcome::Duplicate);
        }

        let achieved = event.status == GoalStatus::Achieved;
        let goal = self.read_goal(event.goal_id).await?;
        let (pass_ratio, report_score) = match goal.as_ref().and_then(|g| g.workflow_id) {
            Some(workflow_id) => self.workflow_signals(workflow_id).await?,
            None => (None, None),
        };
        let score = score_outcome(achieved, pass_ratio, report_score);

        let domain = event.context.domain.clone();
        let scaling = self.read_scaling(&domain).await?;

        let delta = match event.context.hypothesis_id {
            Some(hypothesis_id) => {
                let before = self
                    .engine
                    .get(hypothesis_id)
                    .await?
                    .map(|h| h.confidence)
                    .unwrap_or(0.0);
                let updated = self
                    .engine
                    .update_on_outcome(hypothesis_id, score, scaling)
                    .await?;
                updated.confidence - before
            }
            None => 0.0,
        };

        // Goals opened from an uncertain belief carry its id; the outcome
        // revises that belief's confidence by the same bounded step.
        if let Some(belief_id) = event
            .context
            .extra
            .get("belief_id")
            .and_then(|s| s.parse::<Uuid>().ok())
        {
            if let Err(e) = self.revise_belief(&domain, belief_id, score, scaling).await {
                tracing::warn!(belief_id = %belief_id, error = %e, "belief revision failed");
            }
        }

        self.write_scaling(&domain, (scaling + SCALING_STEP * score).clamp(SCALING_MIN, SCALING_MAX))
            .await?;
        let stats = self.bump_stats(&domain, score, delta).await?;

        bus::publish_event(
            self.bus.as_ref(),
            subjects::EXPLANATION_LEARNING_UPDATED,
            &ExplanationLearningUpdated {
                domain,
                goal_id: event.goal_id,
                hypothesis_id: event.context.hypothesis_id,
                delta,
                stats_snapshot: stats,
            },
        )
        .await?;

        Ok(FeedbackOutcome::Applied { delta })
    }

    /// Current scaling factor for a domain, defaulting to 1.0.
    pub async fn read_scaling(&self, domain: &str) -> Result<f64> {
        Ok(self
            .store
            .get(&keys::confidence_scaling(domain))
            .await?
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0))
    }

    async fn write_scaling(&self, domain: &str, scaling: f64) -> Result<()> {
        self.store
            .set(&keys::confidence_scaling(domain), &format!("{:.6}", scaling))
            .await
    }

    /// Current stats for a domain.
    pub async fn read_stats(&self, domain: &str) -> Result<LearningStats> {
        Ok(self
            .store
            .get(&keys::learning_stats(domain))
            .await?
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_else(|| LearningStats::new(domain)))
    }

    async fn bump_stats(&self, domain: &str, score: f64, delta: f64) -> Result<LearningStats> {
        let mut stats = self.read_stats(domain).await?;
        stats.processed += 1;
        if score > 0.0 {
            stats.positive += 1;
        } else if score < 0.0 {
            stats.negative += 1;
        }
        stats.cumulative_delta += delta;
        stats.last_updated = now();
        self.store
            .set(&keys::learning_stats(domain), &serde_json::to_string(&stats)?)
            .await?;
        Ok(stats)
    }

    /// Adjust a stored belief's confidence by `BELIEF_STEP · scaling ·
    /// score` and write it back in place. Returns whether the belief was
    /// found.
    async fn revise_belief(
        &self,
        domain: &str,
        belief_id: Uuid,
        score: f64,
        scaling: f64,
    ) -> Result<bool> {
        let list_key = keys::beliefs(domain);
        let items = self.store.list_range(&list_key, 0, -1).await?;
        for (index, json) in items.iter().enumerate() {
            let Ok(mut belief) = serde_json::from_str::<Belief>(json) else {
                continue;
            };
            if belief.id != belief_id {
                continue;
            }
            belief.revise_confidence(
                BELIEF_STEP * scaling.clamp(SCALING_MIN, SCALING_MAX) * score.clamp(-1.0, 1.0),
            );
            self.store
                .list_set(&list_key, index as u64, &serde_json::to_string(&belief)?)
                .await?;
            tracing::debug!(
                belief_id = %belief_id,
                confidence = belief.confidence,
                "belief revised"
            );
            return Ok(true);
        }
        tracing::warn!(belief_id = %belief_id, domain, "linked belief not found");
        Ok(false)
    }

    async fn read_goal(&self, goal_id: Uuid) -> Result<Option<Goal>> {
        match self.store.get(&keys::goal(goal_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Extract (validation pass ratio, report score) from a workflow.
    async fn workflow_signals(&self, workflow_id: Uuid) -> Result<(Option<f64>, Option<f64>)> {
        let record: WorkflowRecord = match self.store.get(&keys::workflow(workflow_id)).await? {
            Some(json) => serde_json::from_str(&json)?,
            None => return Ok((None, None)),
        };

        let pass_ratio = if record.validation_steps.is_empty() {
            None
        } else {
            let passed = record.validation_steps.iter().filter(|s| s.passed).count();
            Some(passed as f64 / record.validation_steps.len() as f64)
        };

        let mut report_score = None;
        for artifact_id in &record.generated_artifact_ids {
            let Some(meta_json) = self.store.get(&keys::file_metadata(*artifact_id)).await? else {
                continue;
            };
            let meta: crate::artifact::FileArtifact = serde_json::from_str(&meta_json)?;
            if meta.filename.contains("test_report") {
                if let Some(body) = self.store.get(&keys::file_content(*artifact_id)).await? {
                    report_score = parse_report_score(&body);
                }
                break;
            }
        }

        Ok((pass_ratio, report_score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::goal::GoalContext;
    use crate::hypothesis::Hypothesis;
    use crate::llm::ScriptedGateway;
    use crate::store::MemoryStore;
    use crate::types::GoalType;
    use std::sync::Arc;

    fn setup() -> (SharedStore, SharedBus, FeedbackProcessor, HypothesisEngine) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let bus: SharedBus = Arc::new(MemoryBus::new());
        let engine = HypothesisEngine::new(
            store.clone(),
            bus.clone(),
            Arc::new(ScriptedGateway::new()),
            "agent_1",
        );
        let processor = FeedbackProcessor::new(
            store.clone(),
            bus.clone(),
            HypothesisEngine::new(
                store.clone(),
                bus.clone(),
                Arc::new(ScriptedGateway::new()),
                "agent_1",
            ),
        );
        (store, bus, processor, engine)
    }

    fn achieved_event(hypothesis_id: Option<Uuid>) -> GoalLifecycle {
        let mut context = GoalContext::for_domain("physics");
        context.hypothesis_id = hypothesis_id;
        GoalLifecycle {
            goal_id: Uuid::new_v4(),
            goal_type: GoalType::InterventionTesting,
            context,
            status: GoalStatus::Achieved,
            updated_at: now(),
        }
    }

    #[test]
    fn test_score_outcome_bounds_and_monotonicity() {
        assert_eq!(score_outcome(true, Some(1.0), Some(1.0)), 1.0);
        assert_eq!(score_outcome(false, Some(0.0), Some(-1.0)), -1.0);

        let low = score_outcome(true, Some(0.2), None);
        let high = score_outcome(true, Some(0.9), None);
        assert!(high > low);

        for achieved in [true, false] {
            let s = score_outcome(achieved, Some(0.5), Some(0.0));
            assert!((-1.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn test_parse_report_score() {
        let report = "# Hypothesis Test Report\n\nscore: 0.75\nnotes: fine\n";
        assert_eq!(parse_report_score(report), Some(0.75));
        assert_eq!(parse_report_score("score: 7"), Some(1.0));
        assert_eq!(parse_report_score("no score here"), None);
    }

    #[tokio::test]
    async fn test_positive_event_raises_confidence_and_stats() {
        let (_store, _bus, processor, engine) = setup();
        let h = Hypothesis::new("x causes y somewhere", "physics", 0.5);
        engine.persist(&h).await.unwrap();

        let event = achieved_event(Some(h.id));
        let outcome = processor.process_event(&event).await.unwrap();

        let FeedbackOutcome::Applied { delta } = outcome else {
            panic!("expected Applied, got {:?}", outcome);
        };
        assert!(delta > 0.0);

        let updated = engine.get(h.id).await.unwrap().unwrap();
        assert!(updated.confidence > 0.5);
        assert!(updated.uncertainty.epistemic < 1.0);

        let stats = processor.read_stats("physics").await.unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.positive, 1);
        assert!(stats.cumulative_delta > 0.0);

        let scaling = processor.read_scaling("physics").await.unwrap();
        assert!(scaling > 1.0);
    }

    #[tokio::test]
    async fn test_failed_event_lowers_confidence() {
        let (_store, _bus, processor, engine) = setup();
        let h = Hypothesis::new("x causes y somewhere", "physics", 0.5);
        engine.persist(&h).await.unwrap();

        let mut event = achieved_event(Some(h.id));
        event.status = GoalStatus::Failed;
        processor.process_event(&event).await.unwrap();

        let updated = engine.get(h.id).await.unwrap().unwrap();
        assert!(updated.confidence < 0.5);
    }

    #[tokio::test]
    async fn test_redelivery_is_idempotent() {
        let (_store, _bus, processor, engine) = setup();
        let h = Hypothesis::new("x causes y somewhere", "physics", 0.5);
        engine.persist(&h).await.unwrap();

        let event = achieved_event(Some(h.id));
        processor.process_event(&event).await.unwrap();
        let after_first = engine.get(h.id).await.unwrap().unwrap().confidence;

        let outcome = processor.process_event(&event).await.unwrap();
        assert_eq!(outcome, FeedbackOutcome::Duplicate);
        let after_second = engine.get(h.id).await.unwrap().unwrap().confidence;
        assert_eq!(after_first, after_second);

        let stats = processor.read_stats("physics").await.unwrap();
        assert_eq!(stats.processed, 1);
    }

    #[tokio::test]
    async fn test_event_without_hypothesis_updates_stats_only() {
        let (_store, _bus, processor, _engine) = setup();
        let event = achieved_event(None);
        let outcome = processor.process_event(&event).await.unwrap();
        assert_eq!(outcome, FeedbackOutcome::Applied { delta: 0.0 });

        let stats = processor.read_stats("physics").await.unwrap();
        assert_eq!(stats.processed, 1);
    }

    #[tokio::test]
    async fn test_belief_linked_goal_revises_belief() {
        let (store, _bus, processor, _engine) = setup();

        let belief = Belief::new("plasma conducts electricity", "physics", 0.5)
            .with_supporting_fact(Uuid::new_v4());
        store
            .list_push(
                &keys::beliefs("physics"),
                &serde_json::to_string(&belief).unwrap(),
            )
            .await
            .unwrap();

        let mut event = achieved_event(None);
        event
            .context
            .extra
            .insert("belief_id".to_string(), belief.id.to_string());
        processor.process_event(&event).await.unwrap();

        let stored = store
            .list_range(&keys::beliefs("physics"), 0, -1)
            .await
            .unwrap();
        let revised: Belief = serde_json::from_str(&stored[0]).unwrap();
        assert!(revised.confidence > 0.5);
        assert_eq!(revised.supporting_facts, belief.supporting_facts);

        // Negative outcomes push the other way.
        let mut failed = achieved_event(None);
        failed.status = GoalStatus::Failed;
        failed
            .context
            .extra
            .insert("belief_id".to_string(), belief.id.to_string());
        processor.process_event(&failed).await.unwrap();

        let stored = store
            .list_range(&keys::beliefs("physics"), 0, -1)
            .await
            .unwrap();
        let after: Belief = serde_json::from_str(&stored[0]).unwrap();
        assert!(after.confidence < revised.confidence);
    }

    #[tokio::test]
    async fn test_non_terminal_event_is_ignored() {
        let (_store, _bus, processor, _engine) = setup();
        let mut event = achieved_event(None);
        event.status = GoalStatus::Active;
        assert_eq!(
            processor.process_event(&event).await.unwrap(),
            FeedbackOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_emits_learning_event() {
        let (_store, bus, processor, engine) = setup();
        let mut sub = bus
            .subscribe(&[subjects::EXPLANATION_LEARNING_UPDATED])
            .await
            .unwrap();

        let h = Hypothesis::new("x causes y somewhere", "physics", 0.5);
        engine.persist(&h).await.unwrap();
        processor
            .process_event(&achieved_event(Some(h.id)))
            .await
            .unwrap();

        let envelope = sub.recv().await.unwrap();
        let event: ExplanationLearningUpdated = envelope.decode().unwrap();
        assert_eq!(event.hypothesis_id, Some(h.id));
        assert!(event.delta > 0.0);
    }
}
