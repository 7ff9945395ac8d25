//! Memory-Bounded Stream Registry
//!
//! One engine per sensor stream. Streams are keyed by the xxh3 hash of their
//! device id; when the registry is full the least valuable stream (stale,
//! few readings, low priority) is evicted to make room.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Stream id used when a reading does not name its device
pub const DEFAULT_STREAM: &str = "default";

/// Hash a device id into a registry key.
pub fn stream_key(device: &str) -> u64 {
    xxhash_rust::xxh3::xxh3_64(device.as_bytes())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of streams kept alive
    pub max_streams: usize,
    /// Streams with fewer readings are only evicted when nothing else qualifies
    pub min_events_for_eviction: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_streams: 10_000,
            min_events_for_eviction: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamMeta {
    pub last_access: Instant,
    pub event_count: u64,
    /// Higher = less likely to evict
    pub priority: u8,
    pub created_at: Instant,
}

impl Default for StreamMeta {
    fn default() -> Self {
        let now = Instant::now();
        Self {
            last_access: now,
            event_count: 0,
            priority: 0,
            created_at: now,
        }
    }
}

impl StreamMeta {
    pub fn touch(&mut self) {
        self.last_access = Instant::now();
        self.event_count += 1;
    }

    /// Lower = evicted first
    pub fn eviction_score(&self) -> f64 {
        let age_seconds = self.last_access.elapsed().as_secs_f64();
        let event_factor = (self.event_count as f64).ln().max(1.0);
        let priority_factor = 1.0 + (self.priority as f64 * 0.5);
        (event_factor * priority_factor) / (age_seconds + 1.0)
    }
}

#[derive(Debug)]
pub struct StreamEntry<E> {
    pub engine: E,
    pub meta: StreamMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub active_streams: usize,
    pub total_evictions: u64,
    pub total_creations: u64,
    pub total_accesses: u64,
    pub capacity: usize,
}

pub struct StreamRegistry<E> {
    streams: HashMap<u64, StreamEntry<E>>,
    config: RegistryConfig,
    stats: RegistryStats,
}

impl<E> StreamRegistry<E> {
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let capacity = config.max_streams.max(1);
        Self {
            streams: HashMap::with_capacity(capacity.min(1024)),
            stats: RegistryStats {
                capacity,
                ..Default::default()
            },
            config: RegistryConfig {
                max_streams: capacity,
                ..config
            },
        }
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.streams.len() >= self.config.max_streams
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active_streams: self.streams.len(),
            ..self.stats.clone()
        }
    }

    pub fn contains(&self, key: u64) -> bool {
        self.streams.contains_key(&key)
    }

    /// Look up a stream, counting the access
    pub fn get(&mut self, key: u64) -> Option<&E> {
        self.get_mut(key).map(|e| &*e)
    }

    pub fn get_mut(&mut self, key: u64) -> Option<&mut E> {
        let entry = self.streams.get_mut(&key)?;
        entry.meta.touch();
        self.stats.total_accesses += 1;
        Some(&mut entry.engine)
    }

    /// Insert a stream, returning whatever had to be evicted for it
    pub fn insert(&mut self, key: u64, engine: E) -> Option<(u64, E)> {
        self.insert_with_priority(key, engine, 0)
    }

    pub fn insert_with_priority(&mut self, key: u64, engine: E, priority: u8) -> Option<(u64, E)> {
        let evicted = if self.is_full() && !self.streams.contains_key(&key) {
            self.evict_one()
        } else {
            None
        };

        let meta = StreamMeta {
            priority,
            ..Default::default()
        };
        self.streams.insert(key, StreamEntry { engine, meta });
        self.stats.total_creations += 1;
        evicted
    }

    /// Fetch a stream, creating it on first sight. Creation may evict.
    /// The second element reports whether a stream was evicted.
    pub fn get_or_create<F>(&mut self, key: u64, create: F) -> (&mut E, bool)
    where
        F: FnOnce() -> E,
    {
        let mut evicted = false;
        if self.streams.contains_key(&key) {
            self.stats.total_accesses += 1;
        } else {
            if self.is_full() {
                evicted = self.evict_one().is_some();
            }
            self.stats.total_creations += 1;
        }

        let entry = self.streams.entry(key).or_insert_with(|| StreamEntry {
            engine: create(),
            meta: StreamMeta::default(),
        });
        entry.meta.touch();
        (&mut entry.engine, evicted)
    }

    fn evict_one(&mut self) -> Option<(u64, E)> {
        let candidate = self.find_eviction_candidate()?;
        let entry = self.streams.remove(&candidate)?;
        self.stats.total_evictions += 1;
        Some((candidate, entry.engine))
    }

    fn find_eviction_candidate(&self) -> Option<u64> {
        let mature = self
            .streams
            .iter()
            .filter(|(_, e)| e.meta.event_count >= self.config.min_events_for_eviction)
            .min_by(|a, b| a.1.meta.eviction_score().total_cmp(&b.1.meta.eviction_score()))
            .map(|(&k, _)| k);

        // Nothing mature enough: fall back to the stalest stream
        mature.or_else(|| {
            self.streams
                .iter()
                .min_by_key(|(_, e)| e.meta.last_access)
                .map(|(&k, _)| k)
        })
    }

    pub fn remove(&mut self, key: u64) -> Option<E> {
        self.streams.remove(&key).map(|e| e.engine)
    }

    pub fn clear(&mut self) {
        self.streams.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &E)> {
        self.streams.iter().map(|(k, v)| (k, &v.engine))
    }

    pub fn meta(&self, key: u64) -> Option<&StreamMeta> {
        self.streams.get(&key).map(|e| &e.meta)
    }

    /// Bulk evict down to `target_size` streams
    pub fn evict_to_size(&mut self, target_size: usize) -> Vec<(u64, E)> {
        let mut evicted = Vec::new();
        while self.streams.len() > target_size {
            match self.evict_one() {
                Some(e) => evicted.push(e),
                None => break,
            }
        }
        evicted
    }
}

impl<E> Default for StreamRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(max_streams: usize) -> StreamRegistry<u32> {
        StreamRegistry::with_config(RegistryConfig {
            max_streams,
            min_events_for_eviction: 0,
        })
    }

    #[test]
    fn test_basic_operations() {
        let mut registry = small(10);
        registry.insert(1, 100);
        registry.insert(2, 200);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(1), Some(&100));
        assert_eq!(registry.remove(1), Some(100));
        assert!(!registry.contains(1));
    }

    #[test]
    fn test_eviction_at_capacity() {
        let mut registry = small(3);
        registry.insert(1, 100);
        registry.insert(2, 200);
        registry.insert(3, 300);

        let evicted = registry.insert(4, 400);
        assert!(evicted.is_some());
        assert_eq!(registry.len(), 3);
        assert!(registry.contains(4));
        assert_eq!(registry.stats().total_evictions, 1);
    }

    #[test]
    fn test_get_or_create() {
        let mut registry: StreamRegistry<i32> = StreamRegistry::new();

        let (value, evicted) = registry.get_or_create(123, || 42);
        assert_eq!(*value, 42);
        assert!(!evicted);

        *registry.get_or_create(123, || 999).0 = 100;
        assert_eq!(registry.get(123), Some(&100));
        assert_eq!(registry.stats().total_creations, 1);
    }

    #[test]
    fn test_priority_survives_eviction() {
        let mut registry = small(3);
        registry.insert_with_priority(1, 1, 0);
        registry.insert_with_priority(2, 2, 5);
        registry.insert_with_priority(3, 3, 10);
        for _ in 0..5 {
            registry.get_mut(1);
            registry.get_mut(2);
            registry.get_mut(3);
        }

        registry.insert(4, 4);
        assert!(registry.contains(3), "high priority stream should survive");
    }

    #[test]
    fn test_evict_to_size() {
        let mut registry = small(10);
        for k in 0..6 {
            registry.insert(k, k as u32);
        }
        let evicted = registry.evict_to_size(2);
        assert_eq!(evicted.len(), 4);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_stream_key_is_stable() {
        assert_eq!(stream_key("esp32-01"), stream_key("esp32-01"));
        assert_ne!(stream_key("esp32-01"), stream_key("esp32-02"));
    }
}
