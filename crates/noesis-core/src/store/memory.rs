//! In-memory state store
//!
//! Reference implementation of [`StateStore`] used by tests and single-node
//! deployments. Entries honour TTLs lazily: an expired entry is treated as
//! absent and reaped on the next touch of its key.

use crate::error::{Result, StoreError};
use crate::store::StateStore;
use crate::types::{now, Timestamp};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    List(Vec<String>),
    Set(BTreeSet<String>),
    Hash(BTreeMap<String, String>),
}

impl StoredValue {
    fn shape(&self) -> &'static str {
        match self {
            StoredValue::Text(_) => "text",
            StoredValue::List(_) => "list",
            StoredValue::Set(_) => "set",
            StoredValue::Hash(_) => "hash",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    expires_at: Option<Timestamp>,
}

impl Entry {
    fn fresh(value: StoredValue) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, at: Timestamp) -> bool {
        self.expires_at.map(|t| t <= at).unwrap_or(false)
    }
}

/// DashMap-backed store with lazy TTL expiry
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove the entry if its TTL has lapsed; returns whether a live entry remains.
    fn reap(&self, key: &str) -> bool {
        let t = now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired(t) {
                drop(entry);
                self.entries.remove(key);
                return false;
            }
            return true;
        }
        false
    }

    fn wrong_shape(key: &str, expected: &'static str) -> StoreError {
        StoreError::WrongShape {
            key: key.to_string(),
            expected,
        }
    }

    fn ttl_deadline(ttl: Duration) -> Timestamp {
        now() + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(0))
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if !self.reap(key) {
            return Ok(None);
        }
        match self.entries.get(key).map(|e| e.value.clone()) {
            Some(StoredValue::Text(s)) => Ok(Some(s)),
            Some(other) => {
                tracing::debug!(key, shape = other.shape(), "get on non-text key");
                Err(Self::wrong_shape(key, "text").into())
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .insert(key.to_string(), Entry::fresh(StoredValue::Text(value.to_string())));
        Ok(())
    }

    async fn set_nx_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.reap(key);
        let mut won = false;
        self.entries
            .entry(key.to_string())
            .or_insert_with(|| {
                won = true;
                Entry {
                    value: StoredValue::Text(value.to_string()),
                    expires_at: Some(Self::ttl_deadline(ttl)),
                }
            });
        Ok(won)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let live = self.reap(key);
        Ok(live && self.entries.remove(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        if !self.reap(key) {
            return Ok(false);
        }
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Self::ttl_deadline(ttl));
            return Ok(true);
        }
        Ok(false)
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<u64> {
        self.reap(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::fresh(StoredValue::List(Vec::new())));
        match &mut entry.value {
            StoredValue::List(items) => {
                items.push(value.to_string());
                Ok(items.len() as u64)
            }
            _ => Err(Self::wrong_shape(key, "list").into()),
        }
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        if !self.reap(key) {
            return Ok(Vec::new());
        }
        match self.entries.get(key).map(|e| e.value.clone()) {
            Some(StoredValue::List(items)) => {
                let len = items.len() as i64;
                let norm = |i: i64| -> i64 {
                    if i < 0 {
                        (len + i).max(0)
                    } else {
                        i.min(len)
                    }
                };
                let from = norm(start) as usize;
                let to = (norm(stop) + 1).clamp(0, len) as usize;
                if from >= to {
                    return Ok(Vec::new());
                }
                Ok(items[from..to].to_vec())
            }
            Some(_) => Err(Self::wrong_shape(key, "list").into()),
            None => Ok(Vec::new()),
        }
    }

    async fn list_set(&self, key: &str, index: u64, value: &str) -> Result<()> {
        self.reap(key);
        let mut entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))?;
        match &mut entry.value {
            StoredValue::List(items) => {
                let slot = items
                    .get_mut(index as usize)
                    .ok_or_else(|| StoreError::KeyNotFound(format!("{}[{}]", key, index)))?;
                *slot = value.to_string();
                Ok(())
            }
            _ => Err(Self::wrong_shape(key, "list").into()),
        }
    }

    async fn list_len(&self, key: &str) -> Result<u64> {
        if !self.reap(key) {
            return Ok(0);
        }
        match self.entries.get(key).map(|e| e.value.clone()) {
            Some(StoredValue::List(items)) => Ok(items.len() as u64),
            Some(_) => Err(Self::wrong_shape(key, "list").into()),
            None => Ok(0),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        self.reap(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::fresh(StoredValue::Set(BTreeSet::new())));
        match &mut entry.value {
            StoredValue::Set(members) => Ok(members.insert(member.to_string())),
            _ => Err(Self::wrong_shape(key, "set").into()),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        if !self.reap(key) {
            return Ok(false);
        }
        let mut entry = match self.entries.get_mut(key) {
            Some(e) => e,
            None => return Ok(false),
        };
        match &mut entry.value {
            StoredValue::Set(members) => Ok(members.remove(member)),
            _ => Err(Self::wrong_shape(key, "set").into()),
        }
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        if !self.reap(key) {
            return Ok(Vec::new());
        }
        match self.entries.get(key).map(|e| e.value.clone()) {
            Some(StoredValue::Set(members)) => Ok(members.into_iter().collect()),
            Some(_) => Err(Self::wrong_shape(key, "set").into()),
            None => Ok(Vec::new()),
        }
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.reap(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::fresh(StoredValue::Hash(BTreeMap::new())));
        match &mut entry.value {
            StoredValue::Hash(fields) => {
                fields.insert(field.to_string(), value.to_string());
                Ok(())
            }
            _ => Err(Self::wrong_shape(key, "hash").into()),
        }
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        if !self.reap(key) {
            return Ok(None);
        }
        match self.entries.get(key).map(|e| e.value.clone()) {
            Some(StoredValue::Hash(fields)) => Ok(fields.get(field).cloned()),
            Some(_) => Err(Self::wrong_shape(key, "hash").into()),
            None => Ok(None),
        }
    }

    async fn hash_values(&self, key: &str) -> Result<Vec<String>> {
        if !self.reap(key) {
            return Ok(Vec::new());
        }
        match self.entries.get(key).map(|e| e.value.clone()) {
            Some(StoredValue::Hash(fields)) => Ok(fields.into_values().collect()),
            Some(_) => Err(Self::wrong_shape(key, "hash").into()),
            None => Ok(Vec::new()),
        }
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool> {
        if !self.reap(key) {
            return Ok(false);
        }
        let mut entry = match self.entries.get_mut(key) {
            Some(e) => e,
            None => return Ok(false),
        };
        match &mut entry.value {
            StoredValue::Hash(fields) => Ok(fields.remove(field).is_some()),
            _ => Err(Self::wrong_shape(key, "hash").into()),
        }
    }
}
