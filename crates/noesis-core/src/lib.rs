//! Noesis Core - the cognitive engine of the Goal-Hypothesis-Execution loop
//!
//! Noesis is a distributed cognitive runtime: external stimuli become
//! facts and beliefs, uncertainty about them becomes hypotheses and typed
//! goals, goals become code-synthesising workflows, and execution outcomes
//! feed back into hypothesis confidence.
//!
//! # Architecture
//!
//! This crate holds the shared substrate and the reasoning-side components:
//!
//! 1. **Data model** (`types`, `goal`, `hypothesis`, `knowledge`,
//!    `workflow`, `artifact`, `capability`): persisted entities and their
//!    lifecycle rules.
//! 2. **Uncertainty Model** (`uncertainty`): pure derivation of the
//!    epistemic/aleatoric/calibration block from evidence histories.
//! 3. **Hypothesis Engine** (`hypothesis::engine`): generation, causal
//!    classification, counterfactuals, intervention candidates, outcome
//!    updates.
//! 4. **Goal Synthesiser** (`synthesis`): high-uncertainty knowledge and
//!    inconsistencies become typed goal seeds.
//! 5. **Explanation-Learning Feedback** (`learning`): terminal goal events
//!    close the loop into hypothesis confidence.
//! 6. **Coherence Monitor** (`coherence`): cross-system consistency
//!    scanning and resolution tracking.
//! 7. **Contracts** (`store`, `bus`, `llm`): the external collaborators,
//!    with in-memory/test implementations.
//!
//! The Goal Manager, Monitor Converter and Intelligent Executor live in
//! their service crates and compose these pieces over the shared store and
//! bus.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, clippy::all)]

pub mod artifact;
pub mod bus;
pub mod capability;
pub mod coherence;
pub mod config;
pub mod error;
pub mod events;
pub mod goal;
pub mod hypothesis;
pub mod ingest;
pub mod knowledge;
pub mod learning;
pub mod llm;
pub mod store;
pub mod synthesis;
pub mod types;
pub mod uncertainty;
pub mod workflow;

// Re-export commonly used types for convenience
pub use artifact::FileArtifact;
pub use capability::{Capability, SafetyLevel};
pub use coherence::{CoherenceConfig, CoherenceMonitor, Inconsistency, InconsistencyKind};
pub use config::RuntimeConfig;
pub use error::{NoesisError, Result};
pub use goal::{Goal, GoalContext, GoalSeed};
pub use hypothesis::{Hypothesis, HypothesisEngine};
pub use knowledge::{Belief, Concept, Fact};
pub use learning::{FeedbackProcessor, LearningStats};
pub use synthesis::{GoalSynthesiser, SynthesiserConfig};
pub use types::{
    CausalType, GoalStatus, GoalType, HypothesisStatus, Priority, Severity, Timestamp,
    WorkflowStatus,
};
pub use uncertainty::{EvidencePoint, UncertaintySignals};
pub use workflow::{ValidationStep, WorkflowRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
