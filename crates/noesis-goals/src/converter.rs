//! Monitor Converter
//!
//! Periodic poller lifting synthesised goal seeds from the per-domain
//! output lists into Goal Manager goals. The mapping key claim makes the
//! conversion idempotent: any number of converter replicas over the same
//! store create each goal exactly once.

use crate::manager::GoalManager;
use noesis_core::error::Result;
use noesis_core::goal::GoalSeed;
use noesis_core::store::{keys, SharedStore, StateStore};
use noesis_core::types::GoalStatus;
use std::time::Duration;
use uuid::Uuid;

/// Placeholder mapping value written while the goal is being created.
const CLAIM_PENDING: &str = "pending";

/// Converter configuration
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// Poll period P
    pub period: Duration,

    /// TTL on seed → goal mappings
    pub mapping_ttl: Duration,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(30),
            mapping_ttl: Duration::from_secs(24 * 3600),
        }
    }
}

/// Lifts synthesised seeds into Goal Manager tasks
pub struct MonitorConverter {
    store: SharedStore,
    config: ConverterConfig,
}

impl MonitorConverter {
    pub fn new(store: SharedStore, config: ConverterConfig) -> Self {
        Self { store, config }
    }

    /// Poll loop: one conversion pass per period.
    pub async fn run(&self, manager: &GoalManager, domains: &[String]) -> Result<()> {
        let mut ticker = tokio::time::interval(self.config.period);
        loop {
            ticker.tick().await;
            match self.convert_once(manager, domains).await {
                Ok(created) if created > 0 => {
                    tracing::info!(created, "converter pass adopted seeds");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "converter pass failed"),
            }
        }
    }

    /// One conversion pass. Returns how many goals were created.
    pub async fn convert_once(&self, manager: &GoalManager, domains: &[String]) -> Result<usize> {
        let mut created = 0;
        for domain in domains {
            let raw = self
                .store
                .list_range(&keys::curiosity_goals(domain), 0, -1)
                .await?;
            for json in raw {
                let seed: GoalSeed = match serde_json::from_str(&json) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::warn!(domain, error = %e, "dropping malformed seed entry");
                        continue;
                    }
                };
                if self.convert_seed(manager, &seed).await? {
                    created += 1;
                }
            }
        }
        Ok(created)
    }

    /// Adopt one seed if it has no live mapping. Returns whether a goal
    /// was created.
    async fn convert_seed(&self, manager: &GoalManager, seed: &GoalSeed) -> Result<bool> {
        let mapping_key = keys::goal_mapping(&seed.id);

        if let Some(existing) = self.store.get(&mapping_key).await? {
            if self.mapping_is_live(manager, &existing).await? {
                return Ok(false);
            }
            // Terminal goal behind the mapping: drop it so the claim can be
            // retaken and the seed re-adopted after the cooling period.
            self.store.delete(&mapping_key).await?;
        }

        // The claim is what makes concurrent replicas safe.
        let claimed = self
            .store
            .set_nx_ttl(&mapping_key, CLAIM_PENDING, self.config.mapping_ttl)
            .await?;
        if !claimed {
            return Ok(false);
        }

        let goal_id = match manager.create_from_seed(seed).await {
            Ok(id) => id,
            Err(e) => {
                // Release the claim so a later pass can retry.
                self.store.delete(&mapping_key).await?;
                return Err(e);
            }
        };
        self.store.set(&mapping_key, &goal_id.to_string()).await?;
        self.store
            .expire(&mapping_key, self.config.mapping_ttl)
            .await?;

        tracing::debug!(seed_id = %seed.id, goal_id = %goal_id, "seed adopted");
        Ok(true)
    }

    /// A mapping is live while its goal exists and is not terminal.
    async fn mapping_is_live(&self, manager: &GoalManager, mapping: &str) -> Result<bool> {
        if mapping == CLAIM_PENDING {
            return Ok(true);
        }
        let Ok(goal_id) = mapping.parse::<Uuid>() else {
            return Ok(false);
        };
        match manager.get(goal_id).await? {
            Some(goal) => Ok(!matches!(
                goal.status,
                GoalStatus::Achieved | GoalStatus::Failed | GoalStatus::Archived
            )),
            None => Ok(false),
        }
    }
}
