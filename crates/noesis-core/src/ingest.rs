//! Input ingestion
//!
//! Consumes `input.received` envelopes: each text becomes an immutable
//! Fact in its classified domain, referenced concepts are upserted, a
//! declarative Belief is formed or corroborated from the statement, and a
//! hypothesis-generation cycle runs over the refreshed slice. Malformed
//! payloads are logged once and dropped without blocking the consumer.

use crate::bus::{subjects, EventBus, SharedBus};
use crate::error::Result;
use crate::events::InputReceived;
use crate::hypothesis::HypothesisEngine;
use crate::knowledge::{Belief, Concept, Fact};
use crate::store::{keys, SharedStore, StateStore};

/// Confidence assigned to a freshly formed belief.
const BELIEF_BASE_CONFIDENCE: f64 = 0.5;

/// Keyword tables for the lightweight domain classifier.
const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "physics",
        &["energy", "heat", "force", "mass", "electric", "magnet", "quantum", "particle"],
    ),
    (
        "biology",
        &["cell", "gene", "protein", "organism", "species", "enzyme", "neuron"],
    ),
    (
        "economics",
        &["market", "price", "inflation", "trade", "currency", "demand", "supply"],
    ),
    (
        "technology",
        &["software", "network", "compute", "algorithm", "server", "protocol", "model"],
    ),
];

/// Classify raw text into a domain by keyword hits.
pub fn classify_domain(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut best = ("general", 0usize);
    for (domain, words) in DOMAIN_KEYWORDS {
        let hits = words.iter().filter(|w| lowered.contains(**w)).count();
        if hits > best.1 {
            best = (domain, hits);
        }
    }
    best.0.to_string()
}

/// Extract candidate concept names: distinct lowercase nouns-by-heuristic
/// (words of four letters or more, minus a small stopword list).
pub fn extract_concepts(text: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &[
        "this", "that", "with", "from", "have", "been", "when", "will", "would", "there",
        "their", "about", "which", "into", "because", "after", "before", "makes",
    ];
    let mut seen = Vec::new();
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 4 && !STOPWORDS.contains(w))
    {
        if !seen.iter().any(|s| s == word) {
            seen.push(word.to_string());
        }
    }
    seen.truncate(12);
    seen
}

/// Distil a declarative statement out of raw input text: the first
/// sentence, when it is substantial enough to stand as a proposition.
pub fn belief_statement(text: &str) -> Option<String> {
    let first = text.split(['.', '!', '?', '\n']).next()?.trim();
    if first.split_whitespace().count() < 3 {
        return None;
    }
    Some(first.to_string())
}

/// Bus consumer turning external stimuli into knowledge
pub struct InputIngestor {
    store: SharedStore,
    bus: SharedBus,
}

impl InputIngestor {
    pub fn new(store: SharedStore, bus: SharedBus) -> Self {
        Self { store, bus }
    }

    /// Consume `input.received` until the bus shuts down.
    pub async fn run(&self, engine: &HypothesisEngine) -> Result<()> {
        let mut sub = self.bus.subscribe(&[subjects::INPUT_RECEIVED]).await?;
        while let Some(envelope) = sub.recv().await {
            let input: InputReceived = match envelope.decode() {
                Ok(i) => i,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed input payload");
                    continue;
                }
            };
            if let Err(e) = self.ingest(engine, &input).await {
                tracing::warn!(error = %e, "input ingestion failed");
            }
        }
        Ok(())
    }

    /// Store one input as a fact, upsert its concepts, form or corroborate
    /// the matching belief, and run a generation cycle for the fact's
    /// domain.
    pub async fn ingest(&self, engine: &HypothesisEngine, input: &InputReceived) -> Result<Fact> {
        let domain = classify_domain(&input.text);
        let fact = Fact::new(&input.text, &domain, &input.session_id);

        self.store
            .list_push(&keys::facts(&domain), &serde_json::to_string(&fact)?)
            .await?;

        let mut concepts = Vec::new();
        for name in extract_concepts(&input.text) {
            concepts.push(self.upsert_concept(&name, &domain).await?);
        }

        self.upsert_belief(&fact, &domain).await?;

        let facts = self.recent_facts(&domain, 20).await?;
        // Generation failures are non-fatal by contract; the engine already
        // degrades to its heuristic fallback internally.
        let produced = engine.generate(&domain, &facts, &concepts).await?;
        tracing::debug!(
            %domain,
            fact_id = %fact.id,
            hypotheses = produced.len(),
            "input ingested"
        );

        Ok(fact)
    }

    /// Form a belief from the fact's statement, or corroborate the stored
    /// belief whose normalised statement matches. Corroboration appends a
    /// supporting fact and rederives the uncertainty block; confidence is
    /// left alone for the learning feedback path.
    async fn upsert_belief(&self, fact: &Fact, domain: &str) -> Result<Option<Belief>> {
        let Some(statement) = belief_statement(&fact.text) else {
            return Ok(None);
        };
        let list_key = keys::beliefs(domain);
        let normalised = Belief::normalised_statement(&statement);

        let items = self.store.list_range(&list_key, 0, -1).await?;
        for (index, json) in items.iter().enumerate() {
            let Ok(mut belief) = serde_json::from_str::<Belief>(json) else {
                continue;
            };
            if Belief::normalised_statement(&belief.statement) != normalised {
                continue;
            }
            belief.add_supporting_fact(fact.id);
            self.store
                .list_set(&list_key, index as u64, &serde_json::to_string(&belief)?)
                .await?;
            tracing::debug!(
                belief_id = %belief.id,
                supports = belief.supporting_facts.len(),
                "belief corroborated"
            );
            return Ok(Some(belief));
        }

        let belief = Belief::new(statement, domain, BELIEF_BASE_CONFIDENCE)
            .with_supporting_fact(fact.id);
        self.store
            .list_push(&list_key, &serde_json::to_string(&belief)?)
            .await?;
        tracing::debug!(belief_id = %belief.id, %domain, "belief formed");
        Ok(Some(belief))
    }

    async fn upsert_concept(&self, name: &str, domain: &str) -> Result<Concept> {
        let key = keys::concepts();
        let concept = match self.store.hash_get(&key, name).await? {
            Some(json) => {
                let mut existing: Concept = serde_json::from_str(&json)?;
                existing.touch();
                existing
            }
            // Longer names tend to be more specific abstractions.
            None => Concept::new(name, domain, (name.len() as f64 / 12.0).min(0.9)),
        };
        self.store
            .hash_set(&key, name, &serde_json::to_string(&concept)?)
            .await?;
        Ok(concept)
    }

    async fn recent_facts(&self, domain: &str, limit: i64) -> Result<Vec<Fact>> {
        let raw = self
            .store
            .list_range(&keys::facts(domain), -limit, -1)
            .await?;
        let mut out = Vec::with_capacity(raw.len());
        for json in raw {
            match serde_json::from_str(&json) {
                Ok(f) => out.push(f),
                Err(e) => tracing::warn!(domain, error = %e, "dropping malformed fact entry"),
            }
        }
        Ok(out)
    }
}
