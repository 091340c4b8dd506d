//! Hypothesis data structure
//!
//! A hypothesis is a candidate explanatory statement with confidence, a
//! derived uncertainty block, optional causal structure, and a bounded
//! evidence history. The engine in [`engine`] owns generation,
//! classification and outcome updates.

pub mod engine;

pub use engine::HypothesisEngine;

use crate::error::{HypothesisError, Result};
use crate::goal::GoalSeed;
use crate::types::{now, CausalType, HypothesisStatus, Timestamp};
use crate::uncertainty::{self, EvidencePoint, UncertaintySignals};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Cap on counterfactual actions attached to one hypothesis.
pub const COUNTERFACTUAL_CAP: usize = 3;

/// Cap on retained evidence points.
pub const EVIDENCE_CAP: usize = 50;

/// Confidence above which a tested hypothesis flips to Supported.
pub const SUPPORT_THRESHOLD: f64 = 0.85;

/// Confidence below which a tested hypothesis flips to Refuted.
pub const REFUTE_THRESHOLD: f64 = 0.15;

/// A candidate explanatory statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Unique identifier
    pub id: Uuid,

    /// The explanatory claim
    pub description: String,

    /// Knowledge domain
    pub domain: String,

    /// Confidence in the claim (0.0-1.0)
    pub confidence: f64,

    pub status: HypothesisStatus,

    /// Derived uncertainty block, recomputed whole on every update
    pub uncertainty: UncertaintySignals,

    pub causal_type: CausalType,

    /// "What if not X" probes, capped at [`COUNTERFACTUAL_CAP`]
    pub counterfactual_actions: Vec<String>,

    /// Seed goals describing the minimal experiment, when testable
    pub intervention_goals: Vec<GoalSeed>,

    pub created_at: Timestamp,

    /// Bounded, oldest-first outcome history
    pub evidence_history: Vec<EvidencePoint>,
}

impl Hypothesis {
    /// Create a fresh hypothesis with no evidence.
    pub fn new(
        description: impl Into<String>,
        domain: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            domain: domain.into(),
            confidence,
            status: HypothesisStatus::Proposed,
            uncertainty: UncertaintySignals::no_evidence(confidence),
            causal_type: CausalType::None,
            counterfactual_actions: Vec::new(),
            intervention_goals: Vec::new(),
            created_at: now(),
            evidence_history: Vec::new(),
        }
    }

    /// Normalised description used for deduplication.
    pub fn normalised_description(description: &str) -> String {
        description
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .trim_matches(|c: char| c.is_ascii_punctuation())
            .to_string()
    }

    /// Dedup key: normalised description + domain.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}\x1f{}",
            Self::normalised_description(&self.description),
            self.domain
        )
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(HypothesisError::InvalidConfidence(self.confidence).into());
        }
        if self.causal_type == CausalType::ExperimentallyTestableRelation
            && self.intervention_goals.is_empty()
        {
            return Err(HypothesisError::MissingInterventions(self.id).into());
        }
        Ok(())
    }

    /// Apply one observed outcome: append evidence, adjust confidence by a
    /// bounded step, rederive the uncertainty block, and settle status.
    ///
    /// `delta` is the already-scaled confidence adjustment computed by the
    /// engine; the evidence point records it for the stability estimate.
    pub fn apply_outcome(&mut self, outcome: f64, delta: f64) {
        let outcome = outcome.clamp(-1.0, 1.0);
        self.confidence = (self.confidence + delta).clamp(0.0, 1.0);
        self.evidence_history
            .push(EvidencePoint::new(now(), outcome, delta));
        if self.evidence_history.len() > EVIDENCE_CAP {
            let excess = self.evidence_history.len() - EVIDENCE_CAP;
            self.evidence_history.drain(..excess);
        }
        self.uncertainty = uncertainty::derive(&self.evidence_history, self.confidence);
        self.settle_status();
    }

    fn settle_status(&mut self) {
        if self.evidence_history.len() < 3 {
            if !self.evidence_history.is_empty() {
                self.status = HypothesisStatus::UnderTest;
            }
            return;
        }
        self.status = if self.confidence >= SUPPORT_THRESHOLD {
            HypothesisStatus::Supported
        } else if self.confidence <= REFUTE_THRESHOLD {
            HypothesisStatus::Refuted
        } else {
            HypothesisStatus::UnderTest
        };
    }
}
