//! State Store contract
//!
//! The key–value store is the authoritative state of the runtime. Components
//! hold only ids of their neighbours' entities and re-read through this
//! contract on demand; in-memory copies are caches.
//!
//! The conditional claim (`set_nx_ttl`) is the single cross-worker
//! mutual-exclusion primitive in the core: fingerprint claims, converter
//! mappings, capability ownership and cooling windows all ride on it.

pub mod keys;
pub mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Shared handle to a state store implementation
pub type SharedStore = Arc<dyn StateStore>;

/// Durable key–value + list/set/hash primitives
///
/// Values are JSON documents encoded as strings; the store itself never
/// interprets them. Keys follow the layout in [`keys`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a plain value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a plain value, unconditionally.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Claim a key: write only if absent, with a time-to-live.
    ///
    /// Returns `true` when this caller won the claim.
    async fn set_nx_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Remove a key of any shape. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Attach a time-to-live to an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Append to a list, creating it if absent. Returns the new length.
    async fn list_push(&self, key: &str, value: &str) -> Result<u64>;

    /// Read a list slice; `stop = -1` addresses the final element.
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;

    /// Overwrite one list element in place.
    async fn list_set(&self, key: &str, index: u64, value: &str) -> Result<()>;

    /// List length; zero for absent keys.
    async fn list_len(&self, key: &str) -> Result<u64>;

    /// Add a member to a set. Returns `true` if it was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// Remove a member from a set. Returns `true` if it was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool>;

    /// All members of a set, in stable order.
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Write one field of a hash, creating the hash if absent.
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Read one field of a hash.
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// All values of a hash, in stable field order.
    async fn hash_values(&self, key: &str) -> Result<Vec<String>>;

    /// Delete one field of a hash. Returns whether it existed.
    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool>;
}
