//! Hypothesis Engine
//!
//! Generates hypotheses from knowledge slices, classifies their causal
//! structure from textual cues, attaches counterfactuals and intervention
//! candidates, and applies outcome feedback.
//!
//! Generation failures are non-fatal: an unavailable gateway falls back to
//! a co-mention heuristic, and an empty cycle is simply skipped. Storage
//! failures are retried with backoff and then surfaced as warnings, never
//! as hypotheses.

use crate::bus::{self, subjects, SharedBus};
use crate::error::{HypothesisError, Result};
use crate::events::HypothesisUpdated;
use crate::goal::{GoalContext, GoalSeed};
use crate::hypothesis::{Hypothesis, COUNTERFACTUAL_CAP};
use crate::knowledge::{Concept, Fact};
use crate::llm::{LlmGateway, LlmPriority, LlmRequest};
use crate::store::{keys, SharedStore, StateStore};
use crate::types::{now, CausalType, GoalType, Priority};
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Base confidence assigned to a freshly generated hypothesis.
const INITIAL_CONFIDENCE: f64 = 0.3;

/// Base magnitude of one outcome-driven confidence step.
const CONFIDENCE_STEP: f64 = 0.08;

/// Bounded store-write retries.
const PERSIST_ATTEMPTS: u32 = 3;

lazy_static! {
    /// Connective verbs claiming a cause-effect direction.
    static ref CAUSAL_CUES: Regex = Regex::new(
        r"(?i)\b(causes?|leads? to|results? in|drives?|produces?|increases?|decreases?|reduces?|improves?|triggers?)\b"
    )
    .unwrap();

    /// Conditional framing that makes a claim experimentally checkable.
    static ref CONDITIONAL_CUES: Regex =
        Regex::new(r"(?i)\b(if|when|whenever|after|before)\b").unwrap();

    /// Pure co-occurrence language.
    static ref OBSERVATIONAL_CUES: Regex = Regex::new(
        r"(?i)\b(correlates? with|is associated with|is related to|accompanies|co-?occurs with)\b"
    )
    .unwrap();

    /// Leading list markers stripped from gateway output lines.
    static ref LIST_MARKER: Regex = Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s*").unwrap();
}

/// Generates, classifies and updates hypotheses for one agent
pub struct HypothesisEngine {
    store: SharedStore,
    bus: SharedBus,
    llm: Arc<dyn LlmGateway>,
    agent_id: String,
}

impl HypothesisEngine {
    pub fn new(
        store: SharedStore,
        bus: SharedBus,
        llm: Arc<dyn LlmGateway>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            bus,
            llm,
            agent_id: agent_id.into(),
        }
    }

    /// Produce zero or more new hypotheses from the current knowledge slice.
    ///
    /// Candidates whose normalised description + domain already exist
    /// re-score the stored hypothesis instead of creating a second one.
    pub async fn generate(
        &self,
        domain: &str,
        facts: &[Fact],
        concepts: &[Concept],
    ) -> Result<Vec<Hypothesis>> {
        if facts.is_empty() && concepts.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = match self.generate_candidates(domain, facts, concepts).await {
            Ok(lines) => lines,
            Err(e) => {
                tracing::debug!(domain, error = %e, "gateway unavailable, using co-mention fallback");
                co_mention_candidates(facts, concepts)
            }
        };

        let existing = self.all().await?;
        let mut produced: Vec<Hypothesis> = Vec::new();

        for description in candidates {
            let mut hypothesis = Hypothesis::new(description, domain, INITIAL_CONFIDENCE);
            let key = hypothesis.dedup_key();

            // A candidate repeated within one response is simply skipped.
            if produced.iter().any(|h| h.dedup_key() == key) {
                continue;
            }
            if let Some(stored) = existing.iter().find(|h| h.dedup_key() == key) {
                let mut rescored = stored.clone();
                self.classify_causal(&mut rescored, concepts);
                self.attach_counterfactuals(&mut rescored);
                self.attach_intervention_candidates(&mut rescored);
                if let Err(e) = self.persist(&rescored).await {
                    tracing::warn!(hypothesis_id = %rescored.id, error = %e, "re-score persist failed");
                }
                continue;
            }

            self.classify_causal(&mut hypothesis, concepts);
            self.attach_counterfactuals(&mut hypothesis);
            self.attach_intervention_candidates(&mut hypothesis);
            hypothesis.validate()?;

            match self.persist(&hypothesis).await {
                Ok(()) => produced.push(hypothesis),
                Err(e) => {
                    tracing::warn!(domain, error = %e, "hypothesis persist failed, skipping");
                }
            }
        }

        Ok(produced)
    }

    /// Assign a causal type from textual cues plus concept structure.
    pub fn classify_causal(&self, hypothesis: &mut Hypothesis, concepts: &[Concept]) {
        let text = &hypothesis.description;

        let causal = CAUSAL_CUES.is_match(text);
        let conditional = CONDITIONAL_CUES.is_match(text);
        let observational = OBSERVATIONAL_CUES.is_match(text);

        // Specific concepts make the claim concretely manipulable.
        let has_specific_concept = concepts
            .iter()
            .any(|c| c.specificity >= 0.5 && text.to_lowercase().contains(&c.name));

        hypothesis.causal_type = if causal && (conditional || has_specific_concept) {
            CausalType::ExperimentallyTestableRelation
        } else if causal {
            CausalType::InferredCausalCandidate
        } else if observational {
            CausalType::ObservationalRelation
        } else {
            CausalType::None
        };
    }

    /// Attach "what if not X" actions for causal hypotheses.
    pub fn attach_counterfactuals(&self, hypothesis: &mut Hypothesis) {
        if !hypothesis.causal_type.is_causal() {
            hypothesis.counterfactual_actions.clear();
            return;
        }

        let (cause, effect) = split_cause_effect(&hypothesis.description);
        let actions = vec![
            format!("Observe whether {} still occurs when {} is absent", effect, cause),
            format!("Vary {} while holding other conditions fixed", cause),
            format!("Search for cases where {} occurs without {}", effect, cause),
        ];
        hypothesis.counterfactual_actions = actions.into_iter().take(COUNTERFACTUAL_CAP).collect();
    }

    /// Attach minimal-experiment seed goals for testable hypotheses.
    pub fn attach_intervention_candidates(&self, hypothesis: &mut Hypothesis) {
        if hypothesis.causal_type != CausalType::ExperimentallyTestableRelation {
            hypothesis.intervention_goals.clear();
            return;
        }
        if !hypothesis.intervention_goals.is_empty() {
            return;
        }

        let source = hypothesis.id.to_string();
        let (cause, effect) = split_cause_effect(&hypothesis.description);
        hypothesis.intervention_goals.push(GoalSeed {
            id: GoalSeed::deterministic_id(&source, GoalType::InterventionTesting),
            description: format!(
                "Run a minimal experiment: manipulate {} and measure the effect on {}",
                cause, effect
            ),
            goal_type: GoalType::InterventionTesting,
            priority: Priority::High,
            context: GoalContext::for_domain(&hypothesis.domain).with_hypothesis(hypothesis.id),
            source_entity_id: source,
            confidence: hypothesis.confidence,
            uncertainty: Some(hypothesis.uncertainty),
            epistemic: hypothesis.uncertainty.epistemic,
            created_at: now(),
        });
    }

    /// Apply one observed outcome to a stored hypothesis.
    ///
    /// The confidence step is `CONFIDENCE_STEP · scaling · outcome`, where
    /// `scaling` is the per-domain factor maintained by the learning
    /// feedback path. Publishes `hypothesis.updated` on success.
    pub async fn update_on_outcome(
        &self,
        hypothesis_id: Uuid,
        outcome: f64,
        scaling: f64,
    ) -> Result<Hypothesis> {
        let mut hypothesis = self
            .get(hypothesis_id)
            .await?
            .ok_or(HypothesisError::NotFound(hypothesis_id))?;

        let delta = CONFIDENCE_STEP * scaling.clamp(0.5, 1.5) * outcome.clamp(-1.0, 1.0);
        hypothesis.apply_outcome(outcome, delta);
        self.persist(&hypothesis).await?;

        bus::publish_event(
            self.bus.as_ref(),
            subjects::HYPOTHESIS_UPDATED,
            &HypothesisUpdated {
                hypothesis_id,
                domain: hypothesis.domain.clone(),
                confidence: hypothesis.confidence,
                uncertainty: hypothesis.uncertainty,
            },
        )
        .await?;

        Ok(hypothesis)
    }

    /// Read one hypothesis.
    pub async fn get(&self, id: Uuid) -> Result<Option<Hypothesis>> {
        let raw = self
            .store
            .hash_get(&keys::hypotheses(&self.agent_id), &id.to_string())
            .await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// All stored hypotheses for this agent. Malformed entries are dropped
    /// after a single log line rather than poisoning the scan.
    pub async fn all(&self) -> Result<Vec<Hypothesis>> {
        let values = self
            .store
            .hash_values(&keys::hypotheses(&self.agent_id))
            .await?;
        let mut out = Vec::with_capacity(values.len());
        for json in values {
            match serde_json::from_str(&json) {
                Ok(h) => out.push(h),
                Err(e) => tracing::warn!(error = %e, "dropping malformed hypothesis entry"),
            }
        }
        Ok(out)
    }

    /// Write one hypothesis with bounded retry and backoff.
    pub async fn persist(&self, hypothesis: &Hypothesis) -> Result<()> {
        let key = keys::hypotheses(&self.agent_id);
        let field = hypothesis.id.to_string();
        let json = serde_json::to_string(hypothesis)?;

        let mut last_err = None;
        for attempt in 0..PERSIST_ATTEMPTS {
            match self.store.hash_set(&key, &field, &json).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_err = Some(e);
                    let base = 50u64 << attempt;
                    let jitter = rand::thread_rng().gen_range(0..=base / 2);
                    tokio::time::sleep(Duration::from_millis(base + jitter)).await;
                }
            }
        }
        Err(last_err.expect("at least one persist attempt"))
    }

    async fn generate_candidates(
        &self,
        domain: &str,
        facts: &[Fact],
        concepts: &[Concept],
    ) -> Result<Vec<String>> {
        let fact_lines: Vec<String> = facts.iter().take(20).map(|f| format!("- {}", f.text)).collect();
        let concept_lines: Vec<String> = concepts
            .iter()
            .take(20)
            .map(|c| format!("- {} (specificity {:.1})", c.name, c.specificity))
            .collect();

        let prompt = format!(
            "Domain: {domain}\n\nObserved facts:\n{facts}\n\nKnown concepts:\n{concepts}\n\n\
             Propose up to 5 candidate explanatory hypotheses connecting these observations.\n\
             One hypothesis per line, plain statements, no numbering.",
            domain = domain,
            facts = fact_lines.join("\n"),
            concepts = concept_lines.join("\n"),
        );

        let response = self
            .llm
            .generate(
                LlmRequest::new(
                    "You generate candidate explanatory hypotheses from observations. \
                     Prefer statements with an explicit causal direction.",
                    prompt,
                )
                .with_priority(LlmPriority::Normal),
            )
            .await?;

        Ok(parse_candidate_lines(&response.text))
    }
}

/// Parse gateway output into candidate hypothesis statements.
fn parse_candidate_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| LIST_MARKER.replace(line, "").trim().to_string())
        .filter(|line| line.split_whitespace().count() >= 3)
        .take(5)
        .collect()
}

/// Heuristic fallback: pair concepts co-mentioned in one fact.
fn co_mention_candidates(facts: &[Fact], concepts: &[Concept]) -> Vec<String> {
    let mut out = Vec::new();
    for fact in facts {
        let text = fact.text.to_lowercase();
        let mentioned: Vec<&Concept> = concepts
            .iter()
            .filter(|c| text.contains(&c.name))
            .collect();
        for pair in mentioned.windows(2) {
            out.push(format!("{} is related to {}", pair[0].name, pair[1].name));
            if out.len() >= 5 {
                return out;
            }
        }
    }
    out
}

/// Split a claim around its first causal cue; falls back to halves.
fn split_cause_effect(description: &str) -> (String, String) {
    if let Some(m) = CAUSAL_CUES.find(description) {
        let cause = description[..m.start()].trim();
        let effect = description[m.end()..].trim();
        if !cause.is_empty() && !effect.is_empty() {
            return (strip_conditional(cause), effect.to_string());
        }
    }
    let words: Vec<&str> = description.split_whitespace().collect();
    let mid = words.len() / 2;
    (
        strip_conditional(&words[..mid.max(1)].join(" ")),
        words[mid.max(1)..].join(" "),
    )
}

fn strip_conditional(text: &str) -> String {
    CONDITIONAL_CUES.replace(text.trim(), "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{EventBus, MemoryBus};
    use crate::llm::ScriptedGateway;
    use crate::store::MemoryStore;
    use crate::types::HypothesisStatus;

    fn engine_with(llm: Arc<ScriptedGateway>) -> HypothesisEngine {
        HypothesisEngine::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryBus::new()),
            llm,
            "agent_1",
        )
    }

    fn sample_facts() -> Vec<Fact> {
        vec![
            Fact::new("heating copper makes it expand", "physics", "s1"),
            Fact::new("cooled copper contracts", "physics", "s1"),
        ]
    }

    fn sample_concepts() -> Vec<Concept> {
        vec![
            Concept::new("copper", "physics", 0.8),
            Concept::new("expansion", "physics", 0.6),
        ]
    }

    #[tokio::test]
    async fn test_generate_parses_and_classifies() {
        let llm = Arc::new(ScriptedGateway::new());
        llm.push_response("- heating causes copper expansion\n- copper correlates with conductivity\nshort");
        let engine = engine_with(llm);

        let produced = engine
            .generate("physics", &sample_facts(), &sample_concepts())
            .await
            .unwrap();

        assert_eq!(produced.len(), 2);
        assert_eq!(
            produced[0].causal_type,
            CausalType::ExperimentallyTestableRelation
        );
        assert!(!produced[0].intervention_goals.is_empty());
        assert!(!produced[0].counterfactual_actions.is_empty());
        assert_eq!(produced[1].causal_type, CausalType::ObservationalRelation);
        assert!(produced[1].intervention_goals.is_empty());
    }

    #[tokio::test]
    async fn test_generate_dedups_by_normalised_description() {
        let llm = Arc::new(ScriptedGateway::new());
        llm.push_response("heating causes copper expansion");
        llm.push_response("Heating   CAUSES copper expansion.");
        let engine = engine_with(llm);

        let first = engine
            .generate("physics", &sample_facts(), &sample_concepts())
            .await
            .unwrap();
        let second = engine
            .generate("physics", &sample_facts(), &sample_concepts())
            .await
            .unwrap();

        assert_eq!(first.len(), 1);
        assert!(second.is_empty(), "duplicate must re-score, not re-create");
        assert_eq!(engine.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_generate_falls_back_without_gateway() {
        // Empty script: every call errors, forcing the co-mention fallback.
        let engine = engine_with(Arc::new(ScriptedGateway::new()));

        let facts = vec![Fact::new(
            "copper expansion observed under heat",
            "physics",
            "s1",
        )];
        let produced = engine
            .generate("physics", &facts, &sample_concepts())
            .await
            .unwrap();

        assert_eq!(produced.len(), 1);
        assert!(produced[0].description.contains("related to"));
    }

    #[tokio::test]
    async fn test_update_on_outcome_publishes_and_persists() {
        let llm = Arc::new(ScriptedGateway::new());
        llm.push_response("heating causes copper expansion");
        let store: SharedStore = Arc::new(MemoryStore::new());
        let bus = Arc::new(MemoryBus::new());
        let engine = HypothesisEngine::new(store, bus.clone(), llm, "agent_1");

        let mut sub = bus.subscribe(&[subjects::HYPOTHESIS_UPDATED]).await.unwrap();

        let produced = engine
            .generate("physics", &sample_facts(), &sample_concepts())
            .await
            .unwrap();
        let id = produced[0].id;
        let before = produced[0].confidence;

        let updated = engine.update_on_outcome(id, 1.0, 1.0).await.unwrap();
        assert!(updated.confidence > before);
        assert_eq!(updated.status, HypothesisStatus::UnderTest);

        let envelope = sub.recv().await.unwrap();
        let event: HypothesisUpdated = envelope.decode().unwrap();
        assert_eq!(event.hypothesis_id, id);
    }

    #[tokio::test]
    async fn test_update_on_missing_hypothesis_errors() {
        let engine = engine_with(Arc::new(ScriptedGateway::new()));
        assert!(engine
            .update_on_outcome(Uuid::new_v4(), 1.0, 1.0)
            .await
            .is_err());
    }

    #[test]
    fn test_split_cause_effect() {
        let (cause, effect) = split_cause_effect("heating the bar causes expansion of the metal");
        assert_eq!(cause, "heating the bar");
        assert_eq!(effect, "expansion of the metal");
    }
}
