//! Resolution cache
//!
//! Memoizes `has_capability` outcomes keyed by (subject, capability,
//! context). The cache holds only derived booleans, never source data,
//! and is invalidated explicitly by the engine's mutation wrappers. The
//! TTL is a backstop for deployments where an external writer mutates the
//! store directly.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries before eviction kicks in
    pub capacity: usize,
    /// Time-to-live for cached outcomes
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            ttl: Duration::from_secs(60),
        }
    }
}

/// Cache key: one resolved authorization question.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub subject_id: i64,
    pub capability: String,
    pub context_id: i64,
}

#[derive(Debug, Clone)]
struct CachedEntry {
    allowed: bool,
    cached_at: Instant,
}

impl CachedEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

/// Thread-safe memoization of resolution outcomes.
pub struct DecisionCache {
    entries: DashMap<CacheKey, CachedEntry>,
    config: CacheConfig,
    stats: DashMap<&'static str, usize>,
}

impl DecisionCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            stats: DashMap::new(),
        }
    }

    /// Cached outcome for a key, if present and fresh.
    pub fn get(&self, key: &CacheKey) -> Option<bool> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired(self.config.ttl) {
                drop(entry);
                self.entries.remove(key);
                self.increment("expirations");
                return None;
            }
            self.increment("hits");
            return Some(entry.allowed);
        }
        self.increment("misses");
        None
    }

    /// Store an outcome, evicting a slice of entries when at capacity.
    pub fn put(&self, key: CacheKey, allowed: bool) {
        if self.entries.len() >= self.config.capacity {
            self.evict();
        }
        self.entries.insert(
            key,
            CachedEntry {
                allowed,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop the cached outcomes of a single subject, or everything when
    /// `subject_id` is `None`.
    pub fn invalidate(&self, subject_id: Option<i64>) {
        match subject_id {
            Some(subject_id) => {
                self.entries.retain(|key, _| key.subject_id != subject_id);
            }
            None => self.entries.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stat("hits"),
            misses: self.stat("misses"),
            expirations: self.stat("expirations"),
            entries: self.entries.len(),
            max_entries: self.config.capacity,
        }
    }

    // Crude eviction: drop roughly 10% of entries in iteration order.
    fn evict(&self) {
        let to_remove = (self.config.capacity / 10).max(1);
        let mut removed = 0;
        self.entries.retain(|_, _| {
            if removed < to_remove {
                removed += 1;
                false
            } else {
                true
            }
        });
    }

    fn increment(&self, key: &'static str) {
        self.stats
            .entry(key)
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    fn stat(&self, key: &'static str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub entries: usize,
    pub max_entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
