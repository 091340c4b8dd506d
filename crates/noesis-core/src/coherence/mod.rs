//! Coherence Monitor
//!
//! Periodically scans beliefs, hypotheses and active goals for
//! cross-system inconsistencies, stores each one once, opens a
//! coherence-resolution seed through the Goal Synthesiser, and marks the
//! inconsistency resolved when the adopted goal is achieved.

use crate::bus::{self, subjects, BusSubscription, EventBus, SharedBus};
use crate::error::Result;
use crate::events::{CoherenceEvent, GoalLifecycle};
use crate::goal::{Goal, GoalContext, GoalSeed};
use crate::hypothesis::{Hypothesis, HypothesisEngine};
use crate::knowledge::Belief;
use crate::store::{keys, SharedStore, StateStore};
use crate::synthesis::GoalSynthesiser;
use crate::types::{now, GoalStatus, GoalType, HypothesisStatus, Priority, Severity, Timestamp};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// How long a detected inconsistency suppresses re-detection.
const SEEN_TTL: Duration = Duration::from_secs(24 * 3600);

/// Per-domain sample bound for one scan.
const SCAN_SAMPLE: usize = 64;

lazy_static! {
    static ref NEGATORS: Regex = Regex::new(
        r"(?i)\b(not|never|no longer|cannot|can't|does not|doesn't|is not|isn't|do not|don't)\b"
    )
    .unwrap();
}

/// Kind of cross-system inconsistency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyKind {
    /// A belief and a hypothesis are direct negations in one domain
    BeliefNegation,
    /// A goal's achievement criterion contradicts a high-confidence belief
    GoalContradictsBelief,
    /// An active goal whose source hypothesis has been refuted
    StaleGoal,
}

impl InconsistencyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InconsistencyKind::BeliefNegation => "belief_negation",
            InconsistencyKind::GoalContradictsBelief => "goal_contradicts_belief",
            InconsistencyKind::StaleGoal => "stale_goal",
        }
    }
}

/// A detected cross-system inconsistency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inconsistency {
    /// Deterministic: blake3 over the sorted involved ids
    pub id: String,

    pub kind: InconsistencyKind,
    pub severity: Severity,
    pub description: String,
    pub involved_ids: Vec<String>,
    pub domain: String,
    pub detected_at: Timestamp,

    pub resolved: bool,

    /// Goal whose achievement resolved this inconsistency
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<Uuid>,
}

impl Inconsistency {
    pub fn new(
        kind: InconsistencyKind,
        severity: Severity,
        description: impl Into<String>,
        mut involved_ids: Vec<String>,
        domain: impl Into<String>,
    ) -> Self {
        involved_ids.sort();
        Self {
            id: Self::deterministic_id(&involved_ids),
            kind,
            severity,
            description: description.into(),
            involved_ids,
            domain: domain.into(),
            detected_at: now(),
            resolved: false,
            resolved_by: None,
        }
    }

    /// Stable hash over the sorted involved ids.
    pub fn deterministic_id(sorted_involved_ids: &[String]) -> String {
        let mut hasher = blake3::Hasher::new();
        for id in sorted_involved_ids {
            hasher.update(id.as_bytes());
            hasher.update(b"\x1f");
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// Auxiliaries dropped so "does not conduct" lines up with "conducts".
const AUXILIARIES: &[&str] = &[
    "does", "do", "did", "is", "are", "was", "were", "can", "could", "will", "would",
];

/// Reduce a statement to a comparable core, reporting whether negation
/// cues were present. Tokens are lowercased, auxiliaries removed, and
/// lightly stemmed so singular/plural verb forms compare equal.
fn strip_negation(statement: &str) -> (String, bool) {
    let normalised = statement
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let negated = NEGATORS.is_match(&normalised);
    let core = NEGATORS
        .replace_all(&normalised, "")
        .split_whitespace()
        .filter(|w| !AUXILIARIES.contains(w))
        .map(|w| {
            if w.len() > 3 {
                w.trim_end_matches('s')
            } else {
                w
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    (core, negated)
}

/// Whether two statements are direct negations of each other.
pub fn statements_negate(a: &str, b: &str) -> bool {
    let (core_a, neg_a) = strip_negation(a);
    let (core_b, neg_b) = strip_negation(b);
    !core_a.is_empty() && core_a == core_b && neg_a != neg_b
}

/// Monitor configuration
#[derive(Debug, Clone)]
pub struct CoherenceConfig {
    /// Scan period S
    pub period: Duration,

    /// Startup delay D before the first scan
    pub startup_delay: Duration,
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(300),
            startup_delay: Duration::from_secs(10),
        }
    }
}

/// Periodic cross-system consistency check
pub struct CoherenceMonitor {
    store: SharedStore,
    bus: SharedBus,
    agent_id: String,
    config: CoherenceConfig,
}

impl CoherenceMonitor {
    pub fn new(
        store: SharedStore,
        bus: SharedBus,
        agent_id: impl Into<String>,
        config: CoherenceConfig,
    ) -> Self {
        Self {
            store,
            bus,
            agent_id: agent_id.into(),
            config,
        }
    }

    /// Scan loop: startup delay, then one scan per period.
    pub async fn run(
        &self,
        engine: &HypothesisEngine,
        synthesiser: &GoalSynthesiser,
        domains: &[String],
    ) -> Result<()> {
        tokio::time::sleep(self.config.startup_delay).await;
        let mut ticker = tokio::time::interval(self.config.period);
        loop {
            ticker.tick().await;
            if let Err(e) = self.scan_once(engine, synthesiser, domains).await {
                tracing::warn!(error = %e, "coherence scan failed");
            }
        }
    }

    /// One full scan. Returns the inconsistencies newly materialised.
    pub async fn scan_once(
        &self,
        engine: &HypothesisEngine,
        synthesiser: &GoalSynthesiser,
        domains: &[String],
    ) -> Result<Vec<Inconsistency>> {
        let hypotheses = engine.all().await?;
        let goals = self.active_goals().await?;
        let mut found = Vec::new();

        for domain in domains {
            let beliefs = self.read_beliefs(domain).await?;
            self.detect_belief_negations(domain, &beliefs, &hypotheses, &mut found);
            self.detect_goal_contradictions(domain, &beliefs, &goals, &mut found);
        }
        self.detect_stale_goals(&goals, &hypotheses, &mut found);

        let mut materialised = Vec::new();
        for inconsistency in found {
            if self.materialise(synthesiser, inconsistency.clone()).await? {
                materialised.push(inconsistency);
            }
        }
        Ok(materialised)
    }

    /// Handle terminal goal events, resolving mapped inconsistencies.
    pub async fn resolution_listener(&self) -> Result<BusSubscription> {
        self.bus.subscribe(&[subjects::GOAL_ACHIEVED]).await
    }

    /// Consume resolution events until the bus shuts down.
    pub async fn run_resolution(&self) -> Result<()> {
        let mut sub = self.resolution_listener().await?;
        while let Some(envelope) = sub.recv().await {
            let event: GoalLifecycle = match envelope.decode() {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed goal event");
                    continue;
                }
            };
            if let Err(e) = self.observe_achievement(&event).await {
                tracing::warn!(goal_id = %event.goal_id, error = %e, "resolution handling failed");
            }
        }
        Ok(())
    }

    /// Mark the mapped inconsistency resolved when its goal is achieved.
    pub async fn observe_achievement(&self, event: &GoalLifecycle) -> Result<bool> {
        if event.status != GoalStatus::Achieved {
            return Ok(false);
        }
        let Some(inconsistency_id) = event.context.inconsistency_id.as_deref() else {
            return Ok(false);
        };

        let list_key = keys::coherence_inconsistencies(&self.agent_id);
        let items = self.store.list_range(&list_key, 0, -1).await?;
        for (index, json) in items.iter().enumerate() {
            let Ok(mut inconsistency) = serde_json::from_str::<Inconsistency>(json) else {
                continue;
            };
            if inconsistency.id != inconsistency_id || inconsistency.resolved {
                continue;
            }
            inconsistency.resolved = true;
            inconsistency.resolved_by = Some(event.goal_id);
            self.store
                .list_set(&list_key, index as u64, &serde_json::to_string(&inconsistency)?)
                .await?;

            bus::publish_event(
                self.bus.as_ref(),
                subjects::COHERENCE_RESOLVED,
                &CoherenceEvent {
                    inconsistency_id: inconsistency.id.clone(),
                    kind: inconsistency.kind.as_str().to_string(),
                    severity: inconsistency.severity,
                    involved_ids: inconsistency.involved_ids.clone(),
                    resolved_by: Some(event.goal_id),
                },
            )
            .await?;

            tracing::info!(
                inconsistency_id,
                goal_id = %event.goal_id,
                "inconsistency resolved"
            );
            return Ok(true);
        }
        Ok(false)
    }

    /// All stored inconsistencies for this agent.
    pub async fn inconsistencies(&self) -> Result<Vec<Inconsistency>> {
        let raw = self
            .store
            .list_range(&keys::coherence_inconsistencies(&self.agent_id), 0, -1)
            .await?;
        let mut out = Vec::with_capacity(raw.len());
        for json in raw {
            match serde_json::from_str(&json) {
                Ok(i) => out.push(i),
                Err(e) => tracing::warn!(error = %e, "dropping malformed inconsistency entry"),
            }
        }
        Ok(out)
    }

    fn detect_belief_negations(
        &self,
        domain: &str,
        beliefs: &[Belief],
        hypotheses: &[Hypothesis],
        out: &mut Vec<Inconsistency>,
    ) {
        for belief in beliefs {
            for hypothesis in hypotheses.iter().filter(|h| h.domain == domain) {
                if statements_negate(&belief.statement, &hypothesis.description) {
                    out.push(Inconsistency::new(
                        InconsistencyKind::BeliefNegation,
                        Severity::High,
                        format!(
                            "Belief \"{}\" and hypothesis \"{}\" are direct negations",
                            belief.statement, hypothesis.description
                        ),
                        vec![belief.id.to_string(), hypothesis.id.to_string()],
                        domain,
                    ));
                }
            }
            // Two stored beliefs may contradict each other the same way.
            for other in beliefs {
                if belief.id < other.id && statements_negate(&belief.statement, &other.statement) {
                    out.push(Inconsistency::new(
                        InconsistencyKind::BeliefNegation,
                        Severity::High,
                        format!(
                            "Beliefs \"{}\" and \"{}\" are direct negations",
                            belief.statement, other.statement
                        ),
                        vec![belief.id.to_string(), other.id.to_string()],
                        domain,
                    ));
                }
            }
        }
    }

    fn detect_goal_contradictions(
        &self,
        domain: &str,
        beliefs: &[Belief],
        goals: &[Goal],
        out: &mut Vec<Inconsistency>,
    ) {
        for goal in goals.iter().filter(|g| g.context.domain == domain) {
            for belief in beliefs.iter().filter(|b| b.is_high_confidence()) {
                if statements_negate(&goal.description, &belief.statement) {
                    out.push(Inconsistency::new(
                        InconsistencyKind::GoalContradictsBelief,
                        Severity::Medium,
                        format!(
                            "Goal \"{}\" contradicts high-confidence belief \"{}\"",
                            goal.description, belief.statement
                        ),
                        vec![goal.id.to_string(), belief.id.to_string()],
                        domain,
                    ));
                }
            }
        }
    }

    fn detect_stale_goals(
        &self,
        goals: &[Goal],
        hypotheses: &[Hypothesis],
        out: &mut Vec<Inconsistency>,
    ) {
        for goal in goals {
            let Some(hypothesis_id) = goal.context.hypothesis_id else {
                continue;
            };
            let refuted = hypotheses
                .iter()
                .any(|h| h.id == hypothesis_id && h.status == HypothesisStatus::Refuted);
            if refuted {
                out.push(Inconsistency::new(
                    InconsistencyKind::StaleGoal,
                    Severity::Low,
                    format!(
                        "Active goal \"{}\" probes the refuted hypothesis {}",
                        goal.description, hypothesis_id
                    ),
                    vec![goal.id.to_string(), hypothesis_id.to_string()],
                    goal.context.domain.clone(),
                ));
            }
        }
    }

    /// Store the inconsistency once, emit the event, and open a resolution
    /// seed. Returns `false` when it had already been materialised.
    async fn materialise(
        &self,
        synthesiser: &GoalSynthesiser,
        inconsistency: Inconsistency,
    ) -> Result<bool> {
        let seen = self
            .store
            .set_nx_ttl(&keys::coherence_seen(&inconsistency.id), "1", SEEN_TTL)
            .await?;
        if !seen {
            return Ok(false);
        }

        self.store
            .list_push(
                &keys::coherence_inconsistencies(&self.agent_id),
                &serde_json::to_string(&inconsistency)?,
            )
            .await?;

        bus::publish_event(
            self.bus.as_ref(),
            subjects::COHERENCE_INCONSISTENCY_DETECTED,
            &CoherenceEvent {
                inconsistency_id: inconsistency.id.clone(),
                kind: inconsistency.kind.as_str().to_string(),
                severity: inconsistency.severity,
                involved_ids: inconsistency.involved_ids.clone(),
                resolved_by: None,
            },
        )
        .await?;

        let seed = GoalSeed {
            id: GoalSeed::deterministic_id(&inconsistency.id, GoalType::CoherenceResolution),
            description: format!("Resolve inconsistency: {}", inconsistency.description),
            goal_type: GoalType::CoherenceResolution,
            priority: match inconsistency.severity {
                Severity::High => Priority::High,
                Severity::Medium => Priority::Medium,
                Severity::Low => Priority::Low,
            },
            context: GoalContext::for_domain(&inconsistency.domain)
                .with_inconsistency(&inconsistency.id),
            source_entity_id: inconsistency.id.clone(),
            confidence: 0.0,
            uncertainty: None,
            epistemic: 1.0,
            created_at: now(),
        };
        let seed_id = seed.id.clone();
        synthesiser.submit_seed(seed).await?;

        self.store
            .set(&keys::coherence_goal_mapping(&seed_id), &inconsistency.id)
            .await?;

        tracing::info!(
            inconsistency_id = %inconsistency.id,
            kind = inconsistency.kind.as_str(),
            "inconsistency detected"
        );
        Ok(true)
    }

    async fn active_goals(&self) -> Result<Vec<Goal>> {
        let ids = self
            .store
            .set_members(&keys::goals_active(&self.agent_id))
            .await?;
        let mut out = Vec::new();
        for id in ids.iter().take(SCAN_SAMPLE) {
            let Ok(goal_id) = id.parse::<Uuid>() else {
                continue;
            };
            if let Some(json) = self.store.get(&keys::goal(goal_id)).await? {
                match serde_json::from_str::<Goal>(&json) {
                    Ok(goal) if goal.status == GoalStatus::Active => out.push(goal),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "dropping malformed goal entry"),
                }
            }
        }
        Ok(out)
    }

    async fn read_beliefs(&self, domain: &str) -> Result<Vec<Belief>> {
        let raw = self
            .store
            .list_range(&keys::beliefs(domain), 0, SCAN_SAMPLE as i64 - 1)
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::llm::ScriptedGateway;
    use crate::store::MemoryStore;
    use crate::synthesis::SynthesiserConfig;
    use std::sync::Arc;

    fn setup() -> (
        SharedStore,
        SharedBus,
        HypothesisEngine,
        GoalSynthesiser,
        CoherenceMonitor,
    ) {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let bus: SharedBus = Arc::new(MemoryBus::new());
        let engine = HypothesisEngine::new(
            store.clone(),
            bus.clone(),
            Arc::new(ScriptedGateway::new()),
            "agent_1",
        );
        let synthesiser = GoalSynthesiser::new(store.clone(), SynthesiserConfig::default());
        let monitor = CoherenceMonitor::new(
            store.clone(),
            bus.clone(),
            "agent_1",
            CoherenceConfig::default(),
        );
        (store, bus, engine, synthesiser, monitor)
    }

    async fn push_belief(store: &SharedStore, statement: &str, confidence: f64) -> Belief {
        let belief = Belief::new(statement, "physics", confidence);
        store
            .list_push(
                &keys::beliefs("physics"),
                &serde_json::to_string(&belief).unwrap(),
            )
            .await
            .unwrap();
        belief
    }

    #[test]
    fn test_statements_negate() {
        assert!(statements_negate(
            "water conducts electricity",
            "water does not conduct electricity"
        ));
        assert!(statements_negate(
            "the cache is never stale",
            "the cache is stale"
        ));
        assert!(!statements_negate(
            "water conducts electricity",
            "water conducts electricity"
        ));
        assert!(!statements_negate(
            "water conducts electricity",
            "copper conducts electricity"
        ));
    }

    #[test]
    fn test_deterministic_inconsistency_ids() {
        let a = Inconsistency::new(
            InconsistencyKind::BeliefNegation,
            Severity::High,
            "d",
            vec!["b".into(), "a".into()],
            "physics",
        );
        let b = Inconsistency::new(
            InconsistencyKind::BeliefNegation,
            Severity::High,
            "different text",
            vec!["a".into(), "b".into()],
            "physics",
        );
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_mutually_negating_beliefs_detected_once() {
        let (store, _bus, engine, synthesiser, monitor) = setup();
        push_belief(&store, "plasma conducts electricity", 0.6).await;
        push_belief(&store, "plasma does not conduct electricity", 0.6).await;

        let domains = vec!["physics".to_string()];
        let first = monitor
            .scan_once(&engine, &synthesiser, &domains)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, InconsistencyKind::BeliefNegation);

        // Second scan must not re-materialise the same inconsistency.
        let second = monitor
            .scan_once(&engine, &synthesiser, &domains)
            .await
            .unwrap();
        assert!(second.is_empty());

        let stored = monitor.inconsistencies().await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_detection_opens_resolution_seed_and_mapping() {
        let (store, _bus, engine, synthesiser, monitor) = setup();
        push_belief(&store, "plasma conducts electricity", 0.6).await;
        push_belief(&store, "plasma does not conduct electricity", 0.6).await;

        let domains = vec!["physics".to_string()];
        let found = monitor
            .scan_once(&engine, &synthesiser, &domains)
            .await
            .unwrap();
        let inconsistency = &found[0];

        let seeds = store
            .list_range(&keys::curiosity_goals("physics"), 0, -1)
            .await
            .unwrap();
        let seed: GoalSeed = serde_json::from_str(&seeds[0]).unwrap();
        assert_eq!(seed.goal_type, GoalType::CoherenceResolution);
        assert_eq!(
            seed.context.inconsistency_id.as_deref(),
            Some(inconsistency.id.as_str())
        );

        let mapped = store
            .get(&keys::coherence_goal_mapping(&seed.id))
            .await
            .unwrap();
        assert_eq!(mapped.as_deref(), Some(inconsistency.id.as_str()));
    }

    #[tokio::test]
    async fn test_achievement_resolves_mapped_inconsistency() {
        let (store, bus, engine, synthesiser, monitor) = setup();
        push_belief(&store, "plasma conducts electricity", 0.6).await;
        push_belief(&store, "plasma does not conduct electricity", 0.6).await;

        let domains = vec!["physics".to_string()];
        let found = monitor
            .scan_once(&engine, &synthesiser, &domains)
            .await
            .unwrap();
        let inconsistency_id = found[0].id.clone();

        let mut sub = bus.subscribe(&[subjects::COHERENCE_RESOLVED]).await.unwrap();

        let goal_id = Uuid::new_v4();
        let event = GoalLifecycle {
            goal_id,
            goal_type: GoalType::CoherenceResolution,
            context: GoalContext::for_domain("physics").with_inconsistency(&inconsistency_id),
            status: GoalStatus::Achieved,
            updated_at: now(),
        };
        assert!(monitor.observe_achievement(&event).await.unwrap());

        let stored = monitor.inconsistencies().await.unwrap();
        assert!(stored[0].resolved);
        assert_eq!(stored[0].resolved_by, Some(goal_id));

        let resolved: CoherenceEvent = sub.recv().await.unwrap().decode().unwrap();
        assert_eq!(resolved.resolved_by, Some(goal_id));
    }

    #[tokio::test]
    async fn test_stale_goal_detection() {
        let (store, _bus, engine, synthesiser, monitor) = setup();

        let mut h = Hypothesis::new("dead end claim about nothing", "physics", 0.1);
        for _ in 0..3 {
            h.apply_outcome(-1.0, -0.05);
        }
        assert_eq!(h.status, HypothesisStatus::Refuted);
        engine.persist(&h).await.unwrap();

        let goal = Goal::from_seed(&GoalSeed {
            id: "seed-1".into(),
            description: "probe the dead end".into(),
            goal_type: GoalType::InterventionTesting,
            priority: Priority::High,
            context: GoalContext::for_domain("physics").with_hypothesis(h.id),
            source_entity_id: h.id.to_string(),
            confidence: 0.1,
            uncertainty: None,
            epistemic: 1.0,
            created_at: now(),
        });
        store
            .set(&keys::goal(goal.id), &serde_json::to_string(&goal).unwrap())
            .await
            .unwrap();
        store
            .set_add(&keys::goals_active("agent_1"), &goal.id.to_string())
            .await
            .unwrap();

        let found = monitor
            .scan_once(&engine, &synthesiser, &["physics".to_string()])
            .await
            .unwrap();
        assert!(found
            .iter()
            .any(|i| i.kind == InconsistencyKind::StaleGoal));
    }
}
