//! Render cache for per-entity, per-mode raster tiles.
//!
//! Tiles are rendered in world-aligned space so they stay valid across
//! small pans and zooms; the canvas clears the cache when the viewport
//! moves significantly.

use std::collections::HashMap;

use genshi_core::{EditMode, EntityId, Point};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::surface::Surface;

/// Cache key for one entity in one mode.
#[must_use]
pub fn cache_key(entity: EntityId, mode: EditMode) -> String {
    format!("entity:{entity}:{mode}")
}

/// A rendered tile and where it sits in the world.
#[derive(Debug, Clone)]
pub struct CachedTile {
    /// Tile pixels.
    pub surface: Surface,
    /// World position of the tile's top-left pixel.
    pub origin: Point,
    /// Tile pixels per world unit.
    pub scale: f64,
}

impl CachedTile {
    /// Bytes held by the tile.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.surface.byte_len()
    }
}

#[derive(Debug)]
struct CacheEntry {
    tile: CachedTile,
    last_accessed: u64,
    size_bytes: usize,
}

/// Configuration for the render cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderCacheConfig {
    /// Maximum total tile size in bytes.
    pub max_size_bytes: usize,
    /// Maximum number of tiles.
    pub max_entries: usize,
    /// Frames a tile may go unused before maintenance drops it.
    pub max_idle_frames: u64,
}

impl Default for RenderCacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 128 * 1024 * 1024, // 128 MB
            max_entries: 1000,
            max_idle_frames: 600,
        }
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderCacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that missed.
    pub misses: u64,
    /// Tiles dropped for size, count or idleness.
    pub evictions: u64,
    /// Tiles dropped because their entity changed.
    pub invalidations: u64,
    /// Full clears.
    pub clears: u64,
    /// Tiles currently held.
    pub entries: usize,
    /// Bytes currently held.
    pub size_bytes: usize,
}

/// Memoized tiles keyed by [`cache_key`], with LRU eviction.
#[derive(Debug)]
pub struct RenderCache {
    entries: HashMap<String, CacheEntry>,
    config: RenderCacheConfig,
    current_size: usize,
    clock: u64,
    stats: RenderCacheStats,
}

impl RenderCache {
    /// Create a cache with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RenderCacheConfig::default())
    }

    /// Create a cache with custom configuration.
    #[must_use]
    pub fn with_config(config: RenderCacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            current_size: 0,
            clock: 0,
            stats: RenderCacheStats::default(),
        }
    }

    /// Set the current frame, used for LRU order and idle eviction.
    pub fn set_frame(&mut self, frame: u64) {
        self.clock = self.clock.max(frame);
    }

    /// Look up a tile.
    pub fn get(&mut self, key: &str) -> Option<&CachedTile> {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_accessed = self.clock;
            self.stats.hits += 1;
            Some(&entry.tile)
        } else {
            self.stats.misses += 1;
            None
        }
    }

    /// Insert a tile, evicting least-recently-used tiles to make room.
    ///
    /// A tile larger than the whole budget is not cached.
    pub fn insert(&mut self, key: String, tile: CachedTile) {
        let size_bytes = tile.size_bytes();
        if let Some(old) = self.entries.remove(&key) {
            self.current_size -= old.size_bytes;
        }
        if size_bytes > self.config.max_size_bytes || self.config.max_entries == 0 {
            trace!(key = %key, size_bytes, "Tile exceeds cache budget");
            return;
        }
        self.evict_if_needed(size_bytes);
        self.current_size += size_bytes;
        self.entries.insert(
            key,
            CacheEntry {
                tile,
                last_accessed: self.clock,
                size_bytes,
            },
        );
    }

    /// Remove one tile.
    pub fn remove(&mut self, key: &str) -> Option<CachedTile> {
        let entry = self.entries.remove(key)?;
        self.current_size -= entry.size_bytes;
        Some(entry.tile)
    }

    /// Drop every tile whose key mentions the entity.
    ///
    /// Returns the number of tiles dropped.
    pub fn invalidate_entity(&mut self, entity: EntityId) -> usize {
        let needle = entity.to_string();
        let keys: Vec<String> = self
            .entries
            .keys()
            .filter(|k| k.contains(&needle))
            .cloned()
            .collect();
        for key in &keys {
            self.remove(key);
        }
        self.stats.invalidations += keys.len() as u64;
        keys.len()
    }

    /// Check if a tile is cached.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop every tile.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.current_size = 0;
        self.stats.clears += 1;
    }

    /// Number of cached tiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes held by cached tiles.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.current_size
    }

    /// Cache statistics.
    #[must_use]
    pub fn stats(&self) -> RenderCacheStats {
        RenderCacheStats {
            entries: self.entries.len(),
            size_bytes: self.current_size,
            ..self.stats
        }
    }

    fn evict_if_needed(&mut self, needed_bytes: usize) {
        while self.current_size + needed_bytes > self.config.max_size_bytes
            && !self.entries.is_empty()
        {
            self.evict_lru();
        }
        while self.entries.len() >= self.config.max_entries && !self.entries.is_empty() {
            self.evict_lru();
        }
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by(|(ka, a), (kb, b)| a.last_accessed.cmp(&b.last_accessed).then(ka.cmp(kb)))
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.remove(&key);
            self.stats.evictions += 1;
        }
    }

    /// Drop tiles unused for longer than `max_idle_frames`.
    pub fn maintenance(&mut self) {
        let horizon = self.clock.saturating_sub(self.config.max_idle_frames);
        let idle: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, e)| e.last_accessed < horizon)
            .map(|(k, _)| k.clone())
            .collect();
        for key in idle {
            self.remove(&key);
            self.stats.evictions += 1;
        }
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new()
    }
}
