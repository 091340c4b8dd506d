//! Beliefs - domain-qualified propositions supported by facts

use crate::types::{now, Timestamp};
use crate::uncertainty::{self, EvidencePoint, UncertaintySignals};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A proposition the agent holds with some confidence
///
/// Ingestion forms beliefs and corroborates them with supporting facts;
/// only the explanation-learning feedback path may revise `confidence`.
/// The uncertainty block is rederived whole on every change, never
/// patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Belief {
    /// Unique identifier
    pub id: Uuid,

    /// The proposition believed to be true
    pub statement: String,

    /// Knowledge domain
    pub domain: String,

    /// Confidence in this belief (0.0-1.0)
    pub confidence: f64,

    /// Derived uncertainty block
    pub uncertainty: UncertaintySignals,

    /// Supporting fact ids
    pub supporting_facts: Vec<Uuid>,

    pub created_at: Timestamp,
}

impl Belief {
    pub fn new(
        statement: impl Into<String>,
        domain: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            id: Uuid::new_v4(),
            statement: statement.into(),
            domain: domain.into(),
            confidence,
            uncertainty: UncertaintySignals::no_evidence(confidence),
            supporting_facts: Vec::new(),
            created_at: now(),
        }
    }

    /// Normalised statement used for deduplication at ingestion.
    pub fn normalised_statement(statement: &str) -> String {
        statement
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .trim_matches(|c: char| c.is_ascii_punctuation())
            .to_string()
    }

    pub fn with_supporting_fact(mut self, fact_id: Uuid) -> Self {
        self.add_supporting_fact(fact_id);
        self
    }

    /// Record one more corroborating fact and rederive the block.
    pub fn add_supporting_fact(&mut self, fact_id: Uuid) {
        if !self.supporting_facts.contains(&fact_id) {
            self.supporting_facts.push(fact_id);
        }
        self.uncertainty = self.corroboration_signals(self.confidence);
    }

    /// Apply a feedback-driven confidence adjustment. This is the only
    /// mutation path the learning loop uses.
    pub fn revise_confidence(&mut self, delta: f64) {
        let confidence = (self.confidence + delta).clamp(0.0, 1.0);
        let uncertainty = self.corroboration_signals(confidence);
        self.set_confidence(confidence, uncertainty);
    }

    /// Replace confidence, clamping into range. The uncertainty block is
    /// recomputed whole by the caller, never patched in place.
    pub fn set_confidence(&mut self, confidence: f64, uncertainty: UncertaintySignals) {
        self.confidence = confidence.clamp(0.0, 1.0);
        self.uncertainty = uncertainty;
    }

    /// Strong beliefs anchor coherence checks against contradicting goals.
    pub fn is_high_confidence(&self) -> bool {
        self.confidence >= 0.8
    }

    /// Derive the block treating each distinct supporting fact as one
    /// independent supporting observation.
    fn corroboration_signals(&self, confidence: f64) -> UncertaintySignals {
        let history: Vec<EvidencePoint> = self
            .supporting_facts
            .iter()
            .map(|_| EvidencePoint::new(self.created_at, 1.0, 0.0))
            .collect();
        uncertainty::derive(&history, confidence)
    }
}
