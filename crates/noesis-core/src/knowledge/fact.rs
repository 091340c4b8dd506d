//! Facts - atomic ingested observations

use crate::types::{now, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An atomic observation ingested from input. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Unique identifier
    pub id: Uuid,

    /// The observed text
    pub text: String,

    /// Knowledge domain the observation was classified into
    pub domain: String,

    /// Where the observation came from (session id, feed name)
    pub source: String,

    pub timestamp: Timestamp,

    /// Optional embedding produced by an external vector store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Fact {
    pub fn new(
        text: impl Into<String>,
        domain: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            domain: domain.into(),
            source: source.into(),
            timestamp: now(),
            embedding: None,
        }
    }
}
