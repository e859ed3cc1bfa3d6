//! Time-boxed cache placed in front of every provider lookup.
//!
//! Expiry is checked on read; nothing sweeps the map in the background, but a
//! read that finds an entry past its grace window removes it.
//! Expired entries stay readable through [`ProviderCache::get_stale`] for a
//! grace window so an outage can still be answered with the last known value.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;

/// One external capability behind the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Geocode,
    ReverseGeocode,
    AddressSearch,
    Weather,
    Traffic,
    RouteStats,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Geocode => "geocode",
            Capability::ReverseGeocode => "reverse_geocode",
            Capability::AddressSearch => "address_search",
            Capability::Weather => "weather",
            Capability::Traffic => "traffic",
            Capability::RouteStats => "route_stats",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub capability: Capability,
    pub query: String,
}

impl CacheKey {
    pub fn new(capability: Capability, query: impl Into<String>) -> Self {
        Self {
            capability,
            query: query.into(),
        }
    }
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Concurrency-safe TTL map. Writes are last-writer-wins.
pub struct ProviderCache<V> {
    entries: RwLock<HashMap<CacheKey, Entry<V>>>,
    stale_grace: Duration,
}

impl<V: Clone> ProviderCache<V> {
    pub fn new(stale_grace: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stale_grace,
        }
    }

    /// Returns the value if present and not yet expired. An entry past the
    /// grace window is dropped.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(key) {
                Some(entry) if now < entry.expires_at => return Some(entry.value.clone()),
                Some(entry) if now < entry.expires_at + self.stale_grace => return None,
                Some(_) => {}
                None => return None,
            }
        }
        self.evict_dead(key, now);
        None
    }

    /// Returns the value even if expired, as long as it is within the grace window.
    /// Entries past the grace window are dropped.
    pub fn get_stale(&self, key: &CacheKey) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(key) {
                Some(entry) if now < entry.expires_at + self.stale_grace => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        self.evict_dead(key, now);
        None
    }

    fn evict_dead(&self, key: &CacheKey, now: Instant) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries
            .get(key)
            .is_some_and(|entry| now >= entry.expires_at + self.stale_grace)
        {
            entries.remove(key);
        }
    }

    pub fn insert(&self, key: CacheKey, value: V, ttl: Duration) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
