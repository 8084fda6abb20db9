//! Process-local TTL cache
//!
//! Backs the domain cache and the tenant module-config cache. Entries expire
//! by the injected clock; invalidation is explicit. Not coherent across
//! instances, staleness is bounded by the TTL.

use crate::clock::SharedClock;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// Cache entry with its expiry instant
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

/// Mutex-protected map with per-entry expiry
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    clock: SharedClock,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty cache whose entries live for `ttl`
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Get a live entry
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = self.clock.now();
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    /// Insert or replace an entry, restarting its TTL
    pub fn insert(&self, key: K, value: V) {
        let expires_at = self.clock.now() + self.ttl_delta();
        self.entries.write().insert(key, CacheEntry { value, expires_at });
    }

    /// Drop a single entry
    pub fn invalidate<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.write().remove(key).is_some()
    }

    /// Drop every entry matching `predicate`, returns how many went
    pub fn invalidate_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&K, &V) -> bool,
    {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|k, entry| !predicate(k, &entry.value));
        before - entries.len()
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Remove expired entries, returns how many went
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until purged
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Configured lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn ttl_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(36_500))
    }
}
