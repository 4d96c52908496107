//! A small expiring map.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// String-keyed cache whose entries expire `ttl` after insertion.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, (V, Instant)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The cached value, if it has not expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|(_, inserted)| inserted.elapsed() < self.ttl)
            .map(|(value, _)| value.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.entries
            .write()
            .insert(key.into(), (value, Instant::now()));
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, (_, inserted)| inserted.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
