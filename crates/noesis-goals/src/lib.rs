//! Noesis Goals - authoritative goal lifecycle and seed conversion
//!
//! Two components live here:
//!
//! - [`GoalManager`]: the authoritative store for goals, with write-then-
//!   publish lifecycle events and the HTTP surface in [`http`].
//! - [`MonitorConverter`]: the periodic poller lifting synthesised goal
//!   seeds into Goal Manager tasks, idempotent across replicas.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms, clippy::all)]

pub mod converter;
pub mod http;
pub mod manager;

pub use converter::{ConverterConfig, MonitorConverter};
pub use http::{build_router, GoalServiceState};
pub use manager::GoalManager;
