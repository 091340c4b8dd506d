//! In-memory event bus
//!
//! Fans publications out over one broadcast channel per subject. Lagging
//! subscribers lose intermediate envelopes, which matches the at-least-once
//! (not exactly-once, not lossless) contract: consumers re-read the store
//! on anything important.

use crate::bus::{BusSubscription, Envelope, EventBus};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc};

const SUBJECT_CAPACITY: usize = 256;

/// Broadcast-backed bus for tests and single-node deployments
#[derive(Debug, Default)]
pub struct MemoryBus {
    subjects: RwLock<HashMap<String, broadcast::Sender<Envelope>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, subject: &str) -> broadcast::Sender<Envelope> {
        if let Some(tx) = self.subjects.read().get(subject) {
            return tx.clone();
        }
        let mut subjects = self.subjects.write();
        subjects
            .entry(subject.to_string())
            .or_insert_with(|| broadcast::channel(SUBJECT_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, subject: &str, payload: serde_json::Value) -> Result<()> {
        let envelope = Envelope::new(subject, payload);
        tracing::debug!(subject, event_id = %envelope.event_id, "publish");
        // No receiver yet is not an error: subscribers attach lazily.
        let _ = self.sender_for(subject).send(envelope);
        Ok(())
    }

    async fn subscribe(&self, subs: &[&str]) -> Result<BusSubscription> {
        let (tx, rx) = mpsc::channel(SUBJECT_CAPACITY);
        for subject in subs {
            let mut source = self.sender_for(subject).subscribe();
            let sink = tx.clone();
            let subject = subject.to_string();
            tokio::spawn(async move {
                loop {
                    match source.recv().await {
                        Ok(envelope) => {
                            if sink.send(envelope).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(%subject, skipped, "subscriber lagged, envelopes dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }
        Ok(BusSubscription::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_subscribe_roundtrip() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe(&["goal.created"]).await.unwrap();

        bus.publish("goal.created", json!({"goal_id": "g1"}))
            .await
            .unwrap();

        let envelope = sub.recv().await.unwrap();
        assert_eq!(envelope.subject, "goal.created");
        assert_eq!(envelope.payload["goal_id"], "g1");
    }

    #[tokio::test]
    async fn test_merged_subjects() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe(&["goal.achieved", "goal.failed"]).await.unwrap();

        bus.publish("goal.achieved", json!({"n": 1})).await.unwrap();
        bus.publish("goal.failed", json!({"n": 2})).await.unwrap();
        bus.publish("goal.created", json!({"n": 3})).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..2 {
            seen.push(sub.recv().await.unwrap().subject);
        }
        seen.sort();
        assert_eq!(seen, vec!["goal.achieved", "goal.failed"]);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = MemoryBus::new();
        bus.publish("input.received", json!({"text": "hello"}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_every_envelope_has_unique_id() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe(&["x"]).await.unwrap();
        bus.publish("x", json!({})).await.unwrap();
        bus.publish("x", json!({})).await.unwrap();

        let a = sub.recv().await.unwrap();
        let b = sub.recv().await.unwrap();
        assert_ne!(a.event_id, b.event_id);
    }
}
