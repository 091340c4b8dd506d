//! Concepts - named abstractions referenced by facts and beliefs

use crate::types::{now, Timestamp};
use serde::{Deserialize, Serialize};

/// A named abstraction. Created on first reference, never destroyed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// Canonical lowercase name; doubles as the storage key
    pub name: String,

    /// Knowledge domain the concept belongs to
    pub domain: String,

    /// How specific the abstraction is, from 0.0 (very general) to 1.0
    pub specificity: f64,

    /// How many facts have referenced this concept
    pub reference_count: u64,

    pub created_at: Timestamp,
}

impl Concept {
    pub fn new(name: impl Into<String>, domain: impl Into<String>, specificity: f64) -> Self {
        Self {
            name: name.into().to_lowercase(),
            domain: domain.into(),
            specificity: specificity.clamp(0.0, 1.0),
            reference_count: 1,
            created_at: now(),
        }
    }

    /// Record one more referencing fact.
    pub fn touch(&mut self) {
        self.reference_count += 1;
    }
}
