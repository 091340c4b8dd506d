//! Knowledge primitives - facts, concepts, beliefs
//!
//! Facts are immutable observations; concepts are named abstractions that
//! facts and beliefs reference; beliefs are domain-qualified propositions
//! whose confidence the learning feedback path may revise.

pub mod belief;
pub mod concept;
pub mod fact;

pub use belief::Belief;
pub use concept::Concept;
pub use fact::Fact;
