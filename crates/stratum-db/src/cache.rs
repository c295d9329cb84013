//! Primary-key row cache.
//!
//! Repositories consult an [`EntityCache`] for `find`/`find_many` when asked
//! to, fill it on a miss and evict keys they write. Cached rows are stored
//! exactly as they come from the database, transformed columns still
//! encoded.

use std::{
    collections::{HashMap, VecDeque},
    sync::{PoisonError, RwLock},
};

use serde_json::Value;

use crate::{
    error::Result,
    helpers::{key_string, Row},
};

pub trait EntityCache: Send + Sync {
    fn find_from_cache(&self, table: &str, id: &Value) -> Result<Option<Row>>;

    /// Cached rows for `ids`, in the order of `ids`. Misses are skipped.
    fn find_many_from_cache(&self, table: &str, ids: &[Value]) -> Result<Vec<Row>> {
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(row) = self.find_from_cache(table, id)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn put(&self, table: &str, id: &Value, row: Row) -> Result<()>;

    fn forget(&self, _table: &str, _id: &Value) -> Result<()> {
        Ok(())
    }
}

/// Entries a [`MemoryCache::new`] cache holds before evicting.
pub const DEFAULT_CAPACITY: usize = 10_000;

type Key = (String, String);

#[derive(Debug, Default)]
struct Entries {
    rows: HashMap<Key, Row>,
    /// Insertion order, oldest first.
    order: VecDeque<Key>,
}

/// An in-process [`EntityCache`] with no expiry. Once `capacity` rows are
/// held, each new row evicts the oldest one.
#[derive(Debug)]
pub struct MemoryCache {
    entries: RwLock<Entries>,
    capacity: usize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, table: &str, id: &Value) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .contains_key(&(table.to_string(), key_string(id)))
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.rows.clear();
        entries.order.clear();
    }
}

impl EntityCache for MemoryCache {
    fn find_from_cache(&self, table: &str, id: &Value) -> Result<Option<Row>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.rows.get(&(table.to_string(), key_string(id))).cloned())
    }

    fn put(&self, table: &str, id: &Value, row: Row) -> Result<()> {
        if self.capacity == 0 {
            return Ok(());
        }

        let key = (table.to_string(), key_string(id));
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = entries.rows.get_mut(&key) {
            *slot = row;
            return Ok(());
        }

        while entries.rows.len() >= self.capacity {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            entries.rows.remove(&oldest);
        }
        entries.order.push_back(key.clone());
        entries.rows.insert(key, row);
        Ok(())
    }

    fn forget(&self, table: &str, id: &Value) -> Result<()> {
        let key = (table.to_string(), key_string(id));
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.rows.remove(&key).is_some() {
            entries.order.retain(|k| k != &key);
        }
        Ok(())
    }
}
