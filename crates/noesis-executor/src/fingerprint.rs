//! Workflow fingerprinting
//!
//! A fingerprint is a stable blake3 hash over the normalised request
//! description and a canonical serialisation of its context. Two requests
//! with the same fingerprint collide inside the duplicate-suppression
//! window.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

lazy_static! {
    /// Filler tokens that do not change what a request means.
    static ref STOP_MARKERS: Regex =
        Regex::new(r"(?i)\b(please|now|today|again|asap)\b").unwrap();
}

/// Normalise a request description: lowercase, whitespace collapsed,
/// stop markers stripped, punctuation trimmed from token edges.
pub fn normalise_description(description: &str) -> String {
    let lowered = description.to_lowercase();
    let stripped = STOP_MARKERS.replace_all(&lowered, "");
    stripped
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical serialisation of a context map: sorted keys, unit-separator
/// delimited so neither keys nor values can alias the joint encoding.
fn canonical_context(context: &BTreeMap<String, String>) -> String {
    context
        .iter()
        .map(|(k, v)| format!("{}\x1f{}", k, v))
        .collect::<Vec<_>>()
        .join("\x1e")
}

/// Compute the fingerprint for a (description, context) pair.
pub fn fingerprint(description: &str, context: &BTreeMap<String, String>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(normalise_description(description).as_bytes());
    hasher.update(b"\x1d");
    hasher.update(canonical_context(context).as_bytes());
    hasher.finalize().to_hex().to_string()
}
