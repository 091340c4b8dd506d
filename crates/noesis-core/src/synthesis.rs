//! Goal Synthesiser
//!
//! Turns high-uncertainty knowledge and detected inconsistencies into typed
//! goal seeds on the per-domain output lists, where the Monitor Converter
//! picks them up. Seed ids are deterministic over (source entity, goal
//! type); re-emission inside the cooling window collapses onto the
//! existing seed and may only promote its priority when the underlying
//! uncertainty grew.

use crate::error::Result;
use crate::goal::{GoalContext, GoalSeed};
use crate::hypothesis::{Hypothesis, HypothesisEngine};
use crate::knowledge::Belief;
use crate::store::{keys, SharedStore, StateStore};
use crate::types::{now, GoalType, HypothesisStatus, Priority};
use std::time::Duration;

/// Epistemic growth required before a cooled seed's priority is promoted.
const PROMOTION_MARGIN: f64 = 0.05;

/// Synthesiser configuration
#[derive(Debug, Clone)]
pub struct SynthesiserConfig {
    /// Epistemic threshold Θ above which knowledge spawns goals
    pub uncertainty_threshold: f64,

    /// Upper bound on seeds emitted per cycle
    pub batch_cap: usize,

    /// Cooling period T for one (source, type) pair
    pub cooling_period: Duration,
}

impl Default for SynthesiserConfig {
    fn default() -> Self {
        Self {
            uncertainty_threshold: 0.4,
            batch_cap: 8,
            cooling_period: Duration::from_secs(600),
        }
    }
}

/// Converts uncertainty and inconsistency into typed goal seeds
pub struct GoalSynthesiser {
    store: SharedStore,
    config: SynthesiserConfig,
}

impl GoalSynthesiser {
    pub fn new(store: SharedStore, config: SynthesiserConfig) -> Self {
        Self { store, config }
    }

    /// One synthesis cycle over the given domains.
    ///
    /// Returns the seeds actually written (new or promoted) this cycle.
    pub async fn run_cycle(
        &self,
        engine: &HypothesisEngine,
        domains: &[String],
    ) -> Result<Vec<GoalSeed>> {
        let mut candidates = Vec::new();

        for hypothesis in engine.all().await? {
            self.collect_from_hypothesis(&hypothesis, &mut candidates);
        }
        for domain in domains {
            for belief in self.read_beliefs(domain).await? {
                self.collect_from_belief(&belief, &mut candidates);
            }
        }

        // Tie-break when the batch cap bites: priority, then epistemic need,
        // then age.
        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(
                    b.epistemic
                        .partial_cmp(&a.epistemic)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.created_at.cmp(&b.created_at))
        });
        candidates.truncate(self.config.batch_cap);

        let mut emitted = Vec::new();
        for seed in candidates {
            if self.submit_seed(seed.clone()).await? {
                emitted.push(seed);
            }
        }
        Ok(emitted)
    }

    /// Offer one seed to the output list, honouring the cooling window.
    ///
    /// Returns `true` when the seed was appended or promoted.
    pub async fn submit_seed(&self, seed: GoalSeed) -> Result<bool> {
        let claim_key = keys::goal_seed_claim(&seed.source_entity_id, seed.goal_type.as_str());
        let list_key = keys::curiosity_goals(&seed.context.domain);

        let claimed = self
            .store
            .set_nx_ttl(&claim_key, &seed.id, self.config.cooling_period)
            .await?;

        if claimed {
            if let Some((index, existing)) = self.find_in_list(&list_key, &seed.id).await? {
                // Claim lapsed but the seed is still queued; refresh it.
                let refreshed = GoalSeed {
                    priority: existing.priority.max(seed.priority),
                    ..seed.clone()
                };
                self.store
                    .list_set(&list_key, index, &serde_json::to_string(&refreshed)?)
                    .await?;
            } else {
                self.store
                    .list_push(&list_key, &serde_json::to_string(&seed)?)
                    .await?;
            }
            tracing::debug!(seed_id = %seed.id, goal_type = %seed.goal_type, "seed emitted");
            return Ok(true);
        }

        // Inside the cooling window: promote only if uncertainty grew.
        if let Some((index, existing)) = self.find_in_list(&list_key, &seed.id).await? {
            if seed.epistemic > existing.epistemic + PROMOTION_MARGIN
                && seed.priority > existing.priority
            {
                let promoted = GoalSeed {
                    priority: seed.priority,
                    epistemic: seed.epistemic,
                    uncertainty: seed.uncertainty,
                    ..existing
                };
                self.store
                    .list_set(&list_key, index, &serde_json::to_string(&promoted)?)
                    .await?;
                tracing::debug!(seed_id = %seed.id, "seed priority promoted");
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn collect_from_hypothesis(&self, hypothesis: &Hypothesis, out: &mut Vec<GoalSeed>) {
        if hypothesis.status == HypothesisStatus::Refuted {
            return;
        }

        out.extend(hypothesis.intervention_goals.iter().cloned());

        if hypothesis.uncertainty.epistemic >= self.config.uncertainty_threshold {
            let source = hypothesis.id.to_string();
            out.push(GoalSeed {
                id: GoalSeed::deterministic_id(&source, GoalType::ActiveLearning),
                description: format!(
                    "Gather targeted evidence for the hypothesis: {}",
                    hypothesis.description
                ),
                goal_type: GoalType::ActiveLearning,
                priority: Priority::Medium,
                context: GoalContext::for_domain(&hypothesis.domain)
                    .with_hypothesis(hypothesis.id),
                source_entity_id: source,
                confidence: hypothesis.confidence,
                uncertainty: Some(hypothesis.uncertainty),
                epistemic: hypothesis.uncertainty.epistemic,
                created_at: now(),
            });
        }
    }

    fn collect_from_belief(&self, belief: &Belief, out: &mut Vec<GoalSeed>) {
        if belief.uncertainty.epistemic < self.config.uncertainty_threshold {
            return;
        }
        let source = belief.id.to_string();
        out.push(GoalSeed {
            id: GoalSeed::deterministic_id(&source, GoalType::Curiosity),
            description: format!("Investigate the uncertain belief: {}", belief.statement),
            goal_type: GoalType::Curiosity,
            priority: Priority::Low,
            // The belief link lets the learning feedback path revise the
            // belief when the goal terminates.
            context: GoalContext::for_domain(&belief.domain).with_extra("belief_id", &source),
            source_entity_id: source,
            confidence: belief.confidence,
            uncertainty: Some(belief.uncertainty),
            epistemic: belief.uncertainty.epistemic,
            created_at: now(),
        });
    }

    async fn read_beliefs(&self, domain: &str) -> Result<Vec<Belief>> {
        let raw = self
            .store
            .list_range(&keys::beliefs(domain), 0, -1)
            .await?;
        let mut out = Vec::with_capacity(raw.len());
        for json in raw {
            match serde_json::from_str(&json) {
                Ok(b) => out.push(b),
                Err(e) => tracing::warn!(domain, error = %e, "dropping malformed belief entry"),
            }
        }
        Ok(out)
    }

    async fn find_in_list(
        &self,
        list_key: &str,
        seed_id: &str,
    ) -> Result<Option<(u64, GoalSeed)>> {
        let items = self.store.list_range(list_key, 0, -1).await?;
        for (index, json) in items.iter().enumerate() {
            if let Ok(seed) = serde_json::from_str::<GoalSeed>(json) {
                if seed.id == seed_id {
                    return Ok(Some((index as u64, seed)));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::llm::ScriptedGateway;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn setup() -> (SharedStore, HypothesisEngine, GoalSynthesiser) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let engine = HypothesisEngine::new(
            store.clone(),
            Arc::new(MemoryBus::new()),
            Arc::new(ScriptedGateway::new()),
            "agent_1",
        );
        let synthesiser = GoalSynthesiser::new(store.clone(), SynthesiserConfig::default());
        (store, engine, synthesiser)
    }

    async fn seed_hypothesis(engine: &HypothesisEngine, description: &str) -> Hypothesis {
        let mut h = Hypothesis::new(description, "physics", 0.4);
        engine.classify_causal(&mut h, &[]);
        engine.attach_counterfactuals(&mut h);
        engine.attach_intervention_candidates(&mut h);
        engine.persist(&h).await.unwrap();
        h
    }

    #[tokio::test]
    async fn test_testable_hypothesis_yields_intervention_seed() {
        let (store, engine, synthesiser) = setup();
        let h = seed_hypothesis(&engine, "if heated then copper causes expansion").await;

        let emitted = synthesiser
            .run_cycle(&engine, &["physics".to_string()])
            .await
            .unwrap();

        assert!(emitted
            .iter()
            .any(|s| s.goal_type == GoalType::InterventionTesting
                && s.context.hypothesis_id == Some(h.id)));

        let list = store
            .list_range(&keys::curiosity_goals("physics"), 0, -1)
            .await
            .unwrap();
        assert!(!list.is_empty());
    }

    #[tokio::test]
    async fn test_uncertain_belief_yields_curiosity_seed() {
        let (store, engine, synthesiser) = setup();
        let belief = Belief::new("ungrounded claim about plasma", "physics", 0.5);
        store
            .list_push(
                &keys::beliefs("physics"),
                &serde_json::to_string(&belief).unwrap(),
            )
            .await
            .unwrap();

        let emitted = synthesiser
            .run_cycle(&engine, &["physics".to_string()])
            .await
            .unwrap();

        let seed = emitted
            .iter()
            .find(|s| s.goal_type == GoalType::Curiosity)
            .expect("curiosity seed must exist");
        assert_eq!(
            seed.context.extra.get("belief_id"),
            Some(&belief.id.to_string())
        );
    }

    #[tokio::test]
    async fn test_cooling_window_suppresses_reemission() {
        let (_, engine, synthesiser) = setup();
        seed_hypothesis(&engine, "if heated then copper causes expansion").await;

        let first = synthesiser
            .run_cycle(&engine, &["physics".to_string()])
            .await
            .unwrap();
        let second = synthesiser
            .run_cycle(&engine, &["physics".to_string()])
            .await
            .unwrap();

        assert!(!first.is_empty());
        assert!(second.is_empty(), "re-emission inside cooling must be quiet");
    }

    #[tokio::test]
    async fn test_batch_cap_prefers_high_priority() {
        let (store, engine, _) = setup();
        for i in 0..6 {
            let belief = Belief::new(format!("uncertain claim number {}", i), "physics", 0.5);
            store
                .list_push(
                    &keys::beliefs("physics"),
                    &serde_json::to_string(&belief).unwrap(),
                )
                .await
                .unwrap();
        }
        seed_hypothesis(&engine, "if heated then copper causes expansion").await;

        let synthesiser = GoalSynthesiser::new(
            store.clone(),
            SynthesiserConfig {
                batch_cap: 2,
                ..Default::default()
            },
        );
        let emitted = synthesiser
            .run_cycle(&engine, &["physics".to_string()])
            .await
            .unwrap();

        assert_eq!(emitted.len(), 2);
        // The intervention seed is High priority and must survive the cap.
        assert_eq!(emitted[0].goal_type, GoalType::InterventionTesting);
    }

    #[tokio::test]
    async fn test_refuted_hypotheses_do_not_spawn_goals() {
        let (_, engine, synthesiser) = setup();
        let mut h = Hypothesis::new("refuted claim about something", "physics", 0.1);
        for _ in 0..3 {
            h.apply_outcome(-1.0, -0.05);
        }
        assert_eq!(h.status, HypothesisStatus::Refuted);
        engine.persist(&h).await.unwrap();

        let emitted = synthesiser
            .run_cycle(&engine, &["physics".to_string()])
            .await
            .unwrap();
        assert!(emitted.is_empty());
    }
}
