//! Time-bounded cache
//!
//! Backs the clinic-info cache (60s) and the reference-data cache used by
//! diagnosis (5 minutes). Entries are checked for expiry on read. Once the
//! map grows past its soft limit, expired entries are swept and the oldest
//! live entries are evicted until it fits again.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// TTL of cached clinic/patient info lookups
pub const INFO_CACHE_TTL: Duration = Duration::from_secs(60);

/// Entry count past which the info cache sweeps expired entries
pub const INFO_CACHE_SOFT_LIMIT: usize = 100;

/// TTL of cached reference data (menus, coupons, store profiles)
pub const REFERENCE_CACHE_TTL: Duration = Duration::from_secs(300);

/// Entry count kept by the reference-data cache
pub const REFERENCE_CACHE_SOFT_LIMIT: usize = 500;

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Thread-safe map whose entries expire after a fixed TTL
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
    soft_limit: Option<usize>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            soft_limit: None,
        }
    }

    /// Bound the map to `limit` entries, sweeping expired ones first
    pub fn with_soft_limit(mut self, limit: usize) -> Self {
        self.soft_limit = Some(limit);
        self
    }

    /// Cache for read-only practice lookups
    pub fn info() -> Self {
        Self::new(INFO_CACHE_TTL).with_soft_limit(INFO_CACHE_SOFT_LIMIT)
    }

    /// Cache for diagnosis reference data
    pub fn reference() -> Self {
        Self::new(REFERENCE_CACHE_TTL).with_soft_limit(REFERENCE_CACHE_SOFT_LIMIT)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn soft_limit(&self) -> Option<usize> {
        self.soft_limit
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn expired(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        now.duration_since(entry.inserted_at) >= self.ttl
    }

    /// Fresh value for `key`; expired entries are dropped
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if !self.expired(entry, now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: V) {
        let mut entries = self.lock();
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );

        if let Some(limit) = self.soft_limit {
            if entries.len() > limit {
                let now = Instant::now();
                entries.retain(|_, entry| now.duration_since(entry.inserted_at) < self.ttl);
            }
            while entries.len() > limit {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(key, _)| key.clone());
                match oldest {
                    Some(key) => entries.remove(&key),
                    None => break,
                };
            }
        }
    }

    /// Remove expired entries, returning how many were dropped
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.inserted_at) < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
