//! Uncertainty Model
//!
//! Pure, stateless derivation of an uncertainty block from an evidence
//! history and a base confidence. The block is a value type: it is
//! recomputed whole on every update and never partially mutated.
//!
//! - `epistemic` falls as independent supporting observations accumulate;
//!   with zero evidence it sits at its maximum of 1.0.
//! - `aleatoric` is the variance of recent outcomes; pure noise scores high.
//! - `calibrated_confidence` scales the base confidence by the evidence
//!   level and blends in the empirical success rate.
//! - `stability` is the fraction of recent updates whose confidence delta
//!   kept its sign; `volatility` is its complement.
//!
//! All outputs are clamped to [0.0, 1.0] and the derivation is
//! deterministic for identical inputs.

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

/// How many evidence points feed the outcome-statistics window.
pub const EVIDENCE_WINDOW: usize = 20;

/// How many recent confidence deltas feed the stability estimate.
pub const STABILITY_WINDOW: usize = 8;

/// Weight of the base confidence against the empirical success rate.
const BASE_BLEND: f64 = 0.7;

/// One observed outcome applied to a belief, goal, or hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvidencePoint {
    /// When the outcome was observed
    pub at: Timestamp,

    /// Outcome score in [-1.0, +1.0]; positive supports the claim
    pub outcome: f64,

    /// The confidence adjustment that the outcome produced
    pub delta_confidence: f64,
}

impl EvidencePoint {
    /// Create an evidence point, clamping the outcome into [-1, 1].
    pub fn new(at: Timestamp, outcome: f64, delta_confidence: f64) -> Self {
        Self {
            at,
            outcome: outcome.clamp(-1.0, 1.0),
            delta_confidence,
        }
    }

    /// Whether this observation supports the claim.
    pub fn is_supporting(&self) -> bool {
        self.outcome > 0.0
    }
}

/// The derived uncertainty block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UncertaintySignals {
    /// Uncertainty from lack of evidence (reducible by observation)
    pub epistemic: f64,

    /// Uncertainty from inherent outcome noise (not reducible)
    pub aleatoric: f64,

    /// Base confidence discounted by evidence level and success rate
    pub calibrated_confidence: f64,

    /// Fraction of recent updates whose delta kept its sign
    pub stability: f64,

    /// Complement of stability
    pub volatility: f64,
}

impl Default for UncertaintySignals {
    fn default() -> Self {
        Self::no_evidence(0.0)
    }
}

impl UncertaintySignals {
    /// The block for an entity with no evidence at all.
    pub fn no_evidence(base_confidence: f64) -> Self {
        derive(&[], base_confidence)
    }
}

/// Derive the uncertainty block from an evidence history and base confidence.
///
/// `history` is ordered oldest-first; only the trailing [`EVIDENCE_WINDOW`]
/// points contribute to outcome statistics and only the trailing
/// [`STABILITY_WINDOW`] deltas contribute to stability.
pub fn derive(history: &[EvidencePoint], base_confidence: f64) -> UncertaintySignals {
    let base_confidence = base_confidence.clamp(0.0, 1.0);

    let window_start = history.len().saturating_sub(EVIDENCE_WINDOW);
    let window = &history[window_start..];

    let supporting = window.iter().filter(|p| p.is_supporting()).count();
    let epistemic = epistemic_from_support(supporting);
    let aleatoric = outcome_variance(window);
    let success_rate = if window.is_empty() {
        base_confidence
    } else {
        supporting as f64 / window.len() as f64
    };
    let calibrated_confidence = calibrate(base_confidence, epistemic, success_rate);

    let stability = sign_stability(history);

    UncertaintySignals {
        epistemic,
        aleatoric,
        calibrated_confidence,
        stability,
        volatility: (1.0 - stability).clamp(0.0, 1.0),
    }
}

/// Calibrated confidence as a function of its three inputs.
///
/// Kept separate so the monotonicity invariant (non-increasing in
/// `epistemic` for fixed inputs) can be tested directly.
pub fn calibrate(base_confidence: f64, epistemic: f64, success_rate: f64) -> f64 {
    let blended = BASE_BLEND * base_confidence + (1.0 - BASE_BLEND) * success_rate;
    ((1.0 - epistemic.clamp(0.0, 1.0)) * blended).clamp(0.0, 1.0)
}

fn epistemic_from_support(supporting: usize) -> f64 {
    // Harmonic decay: 1.0 with no support, ~0.5 at three observations.
    (1.0 / (1.0 + supporting as f64 / 3.0)).clamp(0.0, 1.0)
}

fn outcome_variance(window: &[EvidencePoint]) -> f64 {
    if window.len() < 2 {
        return 0.0;
    }
    let n = window.len() as f64;
    let mean = window.iter().map(|p| p.outcome).sum::<f64>() / n;
    let var = window
        .iter()
        .map(|p| {
            let d = p.outcome - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    var.clamp(0.0, 1.0)
}

fn sign_stability(history: &[EvidencePoint]) -> f64 {
    let start = history.len().saturating_sub(STABILITY_WINDOW);
    let deltas: Vec<f64> = history[start..].iter().map(|p| p.delta_confidence).collect();
    if deltas.len() < 2 {
        return 1.0;
    }
    let pairs = deltas.len() - 1;
    let steady = deltas
        .windows(2)
        .filter(|w| w[0].signum() == w[1].signum())
        .count();
    (steady as f64 / pairs as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now;

    fn point(outcome: f64, delta: f64) -> EvidencePoint {
        EvidencePoint::new(now(), outcome, delta)
    }

    #[test]
    fn test_zero_evidence_is_maximally_epistemic() {
        let u = derive(&[], 0.9);
        assert_eq!(u.epistemic, 1.0);
        assert_eq!(u.aleatoric, 0.0);
        // Calibrated confidence collapses when nothing supports the base.
        assert!(u.calibrated_confidence <= 0.9 * 1e-9);
        assert_eq!(u.stability, 1.0);
        assert_eq!(u.volatility, 0.0);
    }

    #[test]
    fn test_epistemic_decreases_with_support() {
        let mut history = Vec::new();
        let mut prev = derive(&history, 0.5).epistemic;
        for _ in 0..10 {
            history.push(point(1.0, 0.05));
            let next = derive(&history, 0.5).epistemic;
            assert!(next < prev, "epistemic must fall with supporting evidence");
            prev = next;
        }
    }

    #[test]
    fn test_aleatoric_high_for_pure_noise() {
        let noisy: Vec<EvidencePoint> = (0..10)
            .map(|i| point(if i % 2 == 0 { 1.0 } else { -1.0 }, 0.01))
            .collect();
        let consistent: Vec<EvidencePoint> = (0..10).map(|_| point(1.0, 0.01)).collect();

        let noisy_u = derive(&noisy, 0.5);
        let consistent_u = derive(&consistent, 0.5);

        assert!(noisy_u.aleatoric > 0.9);
        assert_eq!(consistent_u.aleatoric, 0.0);
    }

    #[test]
    fn test_stability_tracks_sign_changes() {
        let steady: Vec<EvidencePoint> = (0..8).map(|_| point(1.0, 0.05)).collect();
        assert_eq!(derive(&steady, 0.5).stability, 1.0);

        let flapping: Vec<EvidencePoint> = (0..8)
            .map(|i| point(1.0, if i % 2 == 0 { 0.05 } else { -0.05 }))
            .collect();
        let u = derive(&flapping, 0.5);
        assert_eq!(u.stability, 0.0);
        assert_eq!(u.volatility, 1.0);
    }

    #[test]
    fn test_stability_plus_volatility_is_unit() {
        let mixed: Vec<EvidencePoint> = vec![
            point(1.0, 0.05),
            point(1.0, 0.04),
            point(-1.0, -0.03),
            point(1.0, 0.02),
            point(1.0, 0.02),
        ];
        let u = derive(&mixed, 0.6);
        assert!((u.stability + u.volatility - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_calibrate_monotone_in_epistemic() {
        let mut prev = calibrate(0.8, 0.0, 0.6);
        for i in 1..=20 {
            let e = i as f64 / 20.0;
            let c = calibrate(0.8, e, 0.6);
            assert!(c <= prev);
            prev = c;
        }
    }

    #[test]
    fn test_determinism() {
        let history: Vec<EvidencePoint> = (0..6).map(|i| point(1.0 - i as f64 * 0.3, 0.02)).collect();
        assert_eq!(derive(&history, 0.42), derive(&history, 0.42));
    }

    #[test]
    fn test_all_outputs_clamped() {
        let wild: Vec<EvidencePoint> = (0..30)
            .map(|i| EvidencePoint::new(now(), if i % 3 == 0 { 5.0 } else { -7.0 }, 3.0))
            .collect();
        let u = derive(&wild, 2.5);
        for v in [
            u.epistemic,
            u.aleatoric,
            u.calibrated_confidence,
            u.stability,
            u.volatility,
        ] {
            assert!((0.0..=1.0).contains(&v), "output {} out of range", v);
        }
    }
}
