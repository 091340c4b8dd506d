//! Capability cache
//!
//! Cache of validated code bodies keyed by task name. Writes go through a
//! short-lived conditional claim so concurrent workflows never interleave
//! an upsert; the mapping stays at-most-one per task name.

use noesis_core::capability::{Capability, SafetyLevel};
use noesis_core::error::Result;
use noesis_core::store::{keys, SharedStore, StateStore};
use std::time::Duration;

/// TTL of the single-writer claim taken around one upsert.
const WRITE_CLAIM_TTL: Duration = Duration::from_secs(5);

/// How many times an upsert retries a lost claim before giving up.
const CLAIM_ATTEMPTS: u32 = 3;

/// Conditional-write capability cache over the state store
#[derive(Clone)]
pub struct CapabilityCache {
    store: SharedStore,
}

impl CapabilityCache {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Cached capability for a task name, if any.
    pub async fn lookup(&self, task_name: &str) -> Result<Option<Capability>> {
        match self.store.get(&keys::capability(task_name)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Record a successful completion: create the capability or bump its
    /// success count. Lost claims are retried briefly and then skipped
    /// with a warning; the cache is an optimisation, not ground truth.
    pub async fn record_success(
        &self,
        task_name: &str,
        language: &str,
        code: &str,
        description: &str,
        safety_level: SafetyLevel,
    ) -> Result<Option<Capability>> {
        let claim_key = keys::capability_claim(task_name);

        for attempt in 0..CLAIM_ATTEMPTS {
            if self.store.set_nx_ttl(&claim_key, "1", WRITE_CLAIM_TTL).await? {
                let result = self
                    .upsert(task_name, language, code, description, safety_level)
                    .await;
                self.store.delete(&claim_key).await?;
                return result.map(Some);
            }
            tokio::time::sleep(Duration::from_millis(50 << attempt)).await;
        }

        tracing::warn!(task_name, "capability upsert skipped, writer claim busy");
        Ok(None)
    }

    /// Refresh `last_used_at` after a cache hit was validated again.
    pub async fn touch(&self, task_name: &str) -> Result<()> {
        if let Some(mut capability) = self.lookup(task_name).await? {
            capability.record_hit();
            self.store
                .set(
                    &keys::capability(task_name),
                    &serde_json::to_string(&capability)?,
                )
                .await?;
        }
        Ok(())
    }

    /// All cached capabilities, in task-name order.
    pub async fn list(&self) -> Result<Vec<Capability>> {
        let names = self.store.set_members(&keys::capability_index()).await?;
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            if let Some(capability) = self.lookup(&name).await? {
                out.push(capability);
            }
        }
        Ok(out)
    }

    async fn upsert(
        &self,
        task_name: &str,
        language: &str,
        code: &str,
        description: &str,
        safety_level: SafetyLevel,
    ) -> Result<Capability> {
        let capability = match self.lookup(task_name).await? {
            Some(mut existing) => {
                existing.record_hit();
                existing.code = code.to_string();
                existing.language = language.to_string();
                existing.safety_level = safety_level;
                existing
            }
            None => {
                let mut fresh = Capability::new(task_name, language, code);
                fresh.tags = Capability::tags_from_description(description);
                fresh.safety_level = safety_level;
                fresh
            }
        };

        self.store
            .set(
                &keys::capability(task_name),
                &serde_json::to_string(&capability)?,
            )
            .await?;
        self.store
            .set_add(&keys::capability_index(), task_name)
            .await?;
        tracing::debug!(task_name, success_count = capability.success_count, "capability upserted");
        Ok(capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noesis_core::store::MemoryStore;
    use std::sync::Arc;

    fn cache() -> CapabilityCache {
        CapabilityCache::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_record_then_lookup() {
        let cache = cache();
        cache
            .record_success("PrimeGen", "python", "print(2)", "generate primes", SafetyLevel::Clean)
            .await
            .unwrap();

        let cap = cache.lookup("PrimeGen").await.unwrap().unwrap();
        assert_eq!(cap.success_count, 1);
        assert!(cap.tags.contains(&"primes".to_string()));
    }

    #[tokio::test]
    async fn test_repeat_success_increments_count() {
        let cache = cache();
        for _ in 0..3 {
            cache
                .record_success("PrimeGen", "python", "print(2)", "generate primes", SafetyLevel::Clean)
                .await
                .unwrap();
        }
        let cap = cache.lookup("PrimeGen").await.unwrap().unwrap();
        assert_eq!(cap.success_count, 3);
    }

    #[tokio::test]
    async fn test_at_most_one_entry_per_task_name() {
        let cache = cache();
        cache
            .record_success("PrimeGen", "python", "v1", "generate primes", SafetyLevel::Clean)
            .await
            .unwrap();
        cache
            .record_success("PrimeGen", "python", "v2", "generate primes", SafetyLevel::Clean)
            .await
            .unwrap();

        let listed = cache.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].code, "v2");
    }

    #[tokio::test]
    async fn test_touch_refreshes_usage() {
        let cache = cache();
        cache
            .record_success("PrimeGen", "python", "v1", "generate primes", SafetyLevel::Clean)
            .await
            .unwrap();
        cache.touch("PrimeGen").await.unwrap();

        let cap = cache.lookup("PrimeGen").await.unwrap().unwrap();
        assert_eq!(cap.success_count, 2);
    }
}
