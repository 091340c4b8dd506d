//! Noesis Executor - goal-triggered code synthesis and validation
//!
//! The Intelligent Executor accepts workflow requests over HTTP or from
//! goal lifecycle events, synthesises code through the LLM gateway,
//! screens it against a static safety policy, validates it in the sandbox
//! with bounded patched retries, stores artifacts with paired indices, and
//! caches validated capabilities for reuse.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, clippy::all)]

pub mod artifacts;
pub mod capability;
pub mod dispatch;
pub mod executor;
pub mod fingerprint;
pub mod http;
pub mod safety;
pub mod synthesis;

pub use artifacts::ArtifactStore;
pub use capability::CapabilityCache;
pub use dispatch::GoalDispatcher;
pub use executor::{ExecuteRequest, ExecuteResponse, ExecutorConfig, IntelligentExecutor};
pub use fingerprint::fingerprint;
pub use http::{build_router, ExecutorServiceState};
pub use safety::{SafetyPolicy, SafetyVerdict};
pub use synthesis::CodeSynthesiser;
