//! Translation cache.
//!
//! Memoizes synthesized payloads so repeated translation of unchanged input
//! is served without re-running the analysis.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::change::ChangePayload;
use crate::entity::EditMode;

/// Key of a cached translation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Source unit: stroke ID, pattern ID or entity ID.
    pub source: String,
    /// Mode the source belongs to.
    pub source_mode: EditMode,
    /// Mode the payload was synthesized for.
    pub target_mode: EditMode,
}

impl CacheKey {
    /// Create a key.
    #[must_use]
    pub fn new(source: impl Into<String>, source_mode: EditMode, target_mode: EditMode) -> Self {
        Self {
            source: source.into(),
            source_mode,
            target_mode,
        }
    }
}

/// Entry in the translation cache.
#[derive(Debug)]
struct CacheEntry {
    /// Fingerprint of the input the payload was derived from.
    fingerprint: u64,
    /// Synthesized payload.
    payload: ChangePayload,
    /// Insertion time in milliseconds.
    inserted_at: u64,
    /// Access sequence number for LRU ordering.
    last_used: u64,
}

/// Configuration for the translation cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationCacheConfig {
    /// Time-to-live of an entry in milliseconds.
    pub ttl_ms: u64,
    /// Maximum number of entries.
    pub max_entries: usize,
}

impl Default for TranslationCacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 5_000,
            max_entries: 1000,
        }
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of evictions.
    pub evictions: u64,
    /// Current number of entries.
    pub entries: usize,
}

impl CacheStats {
    /// Combine two sets of statistics.
    #[must_use]
    pub fn combined(self, other: Self) -> Self {
        Self {
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            evictions: self.evictions + other.evictions,
            entries: self.entries + other.entries,
        }
    }
}

/// Hash any serializable input into a fingerprint.
///
/// Returns `None` if the input cannot be serialized, which callers treat as
/// uncacheable.
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> Option<u64> {
    let bytes = serde_json::to_vec(value).ok()?;
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    Some(hasher.finish())
}

/// TTL + LRU cache of synthesized payloads.
#[derive(Debug)]
pub struct TranslationCache {
    entries: HashMap<CacheKey, CacheEntry>,
    config: TranslationCacheConfig,
    clock: u64,
    stats: CacheStats,
}

impl TranslationCache {
    /// Create a cache with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TranslationCacheConfig::default())
    }

    /// Create a cache with custom configuration.
    #[must_use]
    pub fn with_config(config: TranslationCacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    /// Look up a payload derived from input with the given fingerprint.
    ///
    /// Expired entries and entries for different input count as misses.
    pub fn get(&mut self, key: &CacheKey, fingerprint: u64, now: u64) -> Option<ChangePayload> {
        let ttl = self.config.ttl_ms;
        let fresh = self.entries.get(key).is_some_and(|entry| {
            entry.fingerprint == fingerprint && now.saturating_sub(entry.inserted_at) <= ttl
        });
        if !fresh {
            self.stats.misses += 1;
            return None;
        }
        self.clock += 1;
        let clock = self.clock;
        let entry = self.entries.get_mut(key)?;
        entry.last_used = clock;
        self.stats.hits += 1;
        Some(entry.payload.clone())
    }

    /// Store a payload, evicting expired entries and then the least
    /// recently used ones while over capacity.
    pub fn insert(&mut self, key: CacheKey, fingerprint: u64, payload: ChangePayload, now: u64) {
        self.clock += 1;
        self.entries.insert(
            key,
            CacheEntry {
                fingerprint,
                payload,
                inserted_at: now,
                last_used: self.clock,
            },
        );
        self.evict_expired(now);
        while self.entries.len() > self.config.max_entries && !self.entries.is_empty() {
            self.evict_lru();
        }
    }

    /// Drop every entry whose source matches.
    pub fn invalidate_source(&mut self, source: &str) {
        self.entries.retain(|key, _| key.source != source);
    }

    /// Drop entries older than the TTL.
    pub fn evict_expired(&mut self, now: u64) {
        let ttl = self.config.ttl_ms;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_sub(entry.inserted_at) <= ttl);
        self.stats.evictions += (before - self.entries.len()) as u64;
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.stats.evictions += 1;
        }
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            ..self.stats
        }
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(generation: u32) -> ChangePayload {
        ChangePayload::GrowthUpdated {
            seeds: Vec::new(),
            generation,
        }
    }

    fn key(source: &str) -> CacheKey {
        CacheKey::new(source, EditMode::Draw, EditMode::Growth)
    }

    #[test]
    fn test_hit_requires_same_fingerprint() {
        let mut cache = TranslationCache::new();
        cache.insert(key("a"), 7, payload(1), 0);
        assert_eq!(cache.get(&key("a"), 7, 10), Some(payload(1)));
        assert_eq!(cache.get(&key("a"), 8, 10), None);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn test_ttl_expiry() {
        let mut cache = TranslationCache::new();
        cache.insert(key("a"), 1, payload(1), 1_000);
        assert!(cache.get(&key("a"), 1, 6_000).is_some());
        assert!(cache.get(&key("a"), 1, 6_001).is_none());
        cache.evict_expired(6_001);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction_over_capacity() {
        let mut cache = TranslationCache::with_config(TranslationCacheConfig {
            ttl_ms: 60_000,
            max_entries: 2,
        });
        cache.insert(key("a"), 1, payload(1), 0);
        cache.insert(key("b"), 1, payload(2), 0);
        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get(&key("a"), 1, 1).is_some());
        cache.insert(key("c"), 1, payload(3), 2);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("a"), 1, 3).is_some());
        assert!(cache.get(&key("b"), 1, 3).is_none());
        assert!(cache.get(&key("c"), 1, 3).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        assert_eq!(fingerprint(&[1.0, 2.0]), fingerprint(&[1.0, 2.0]));
        assert_ne!(fingerprint(&[1.0, 2.0]), fingerprint(&[1.0, 2.5]));
    }
}
