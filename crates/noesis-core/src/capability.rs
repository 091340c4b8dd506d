//! Capabilities
//!
//! A capability is a previously validated code body cached under a task
//! name, reusable across workflows. The cache is an at-most-one mapping
//! per task name, owned through conditional writes.

use crate::types::{now, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Safety classification recorded with a cached capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    /// Passed the static check with no flagged patterns
    #[default]
    Clean,
    /// Passed, but touches the filesystem or network in sanctioned ways
    Guarded,
}

/// A cached, previously validated code artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// Cache key
    pub task_name: String,

    pub language: String,

    /// The validated code body
    pub code: String,

    /// Expected shape of the activation context, key → description
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input_schema: BTreeMap<String, String>,

    /// Keywords derived from the originating description
    pub tags: Vec<String>,

    /// Completed workflows that used this code
    pub success_count: u64,

    pub last_used_at: Timestamp,

    pub safety_level: SafetyLevel,
}

impl Capability {
    pub fn new(
        task_name: impl Into<String>,
        language: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            task_name: task_name.into(),
            language: language.into(),
            code: code.into(),
            input_schema: BTreeMap::new(),
            tags: Vec::new(),
            success_count: 1,
            last_used_at: now(),
            safety_level: SafetyLevel::Clean,
        }
    }

    /// Record one more successful use.
    pub fn record_hit(&mut self) {
        self.success_count += 1;
        self.last_used_at = now();
    }

    /// Derive tags from a task description: lowercase keywords, stopwords
    /// removed, capped at eight.
    pub fn tags_from_description(description: &str) -> Vec<String> {
        const STOPWORDS: &[&str] = &[
            "the", "a", "an", "of", "to", "and", "or", "in", "on", "for", "with", "as", "is",
            "are", "that", "this", "first", "all",
        ];
        let mut tags: Vec<String> = description
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2 && !STOPWORDS.contains(w))
            .map(|w| w.to_string())
            .collect();
        tags.dedup();
        tags.truncate(8);
        tags
    }
}
