//! Resolution cache with lightweight LRU + TTL eviction.
//!
//! Keys embed the index generation, so any rebuild or refresh makes older
//! entries unreachable; they then age out through TTL or capacity eviction.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::config::ResolveOptions;
use crate::models::FileMatch;

struct CacheEntry {
    value: Vec<FileMatch>,
    expires_at: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheMode {
    Hit,
    Miss,
}

pub struct ResolutionCache {
    max_entries: usize,
    ttl: Duration,
    cache: Mutex<IndexMap<String, CacheEntry>>,
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new(128, Duration::from_secs(30))
    }
}

impl ResolutionCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            max_entries: max_entries.max(1),
            ttl: ttl.max(Duration::from_millis(100)),
            cache: Mutex::new(IndexMap::new()),
        }
    }

    pub fn cache_key(generation: u64, instruction: &str, options: &ResolveOptions) -> String {
        format!(
            "{generation}:{}:{}:{}:{}",
            options.max_results, options.min_score, options.enable_fuzzy_matching, instruction
        )
    }

    fn evict_expired(&self) {
        let mut cache = self.cache.lock();
        let now = Instant::now();
        cache.retain(|_, entry| entry.expires_at > now);
    }

    fn evict_over_capacity(&self) {
        let mut cache = self.cache.lock();
        while cache.len() > self.max_entries {
            cache.shift_remove_index(0);
        }
    }

    pub fn get_or_compute(
        &self,
        key: &str,
        compute: impl FnOnce() -> Vec<FileMatch>,
    ) -> (Vec<FileMatch>, CacheMode) {
        self.evict_expired();
        {
            let mut cache = self.cache.lock();
            if let Some(entry) = cache.shift_remove(key) {
                let value = entry.value.clone();
                // Re-insert at the back for LRU order.
                cache.insert(key.to_string(), entry);
                return (value, CacheMode::Hit);
            }
        }

        let value = compute();
        {
            let mut cache = self.cache.lock();
            cache.insert(
                key.to_string(),
                CacheEntry {
                    value: value.clone(),
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
        self.evict_over_capacity();
        (value, CacheMode::Miss)
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn stats(&self) -> HashMap<String, usize> {
        let cache = self.cache.lock();
        let mut result = HashMap::new();
        result.insert("entries".to_string(), cache.len());
        result.insert("max_entries".to_string(), self.max_entries);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_after_miss() {
        let cache = ResolutionCache::default();
        let (first, mode) = cache.get_or_compute("k", Vec::new);
        assert!(first.is_empty());
        assert_eq!(mode, CacheMode::Miss);
        let (_, mode) = cache.get_or_compute("k", || panic!("must not recompute"));
        assert_eq!(mode, CacheMode::Hit);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = ResolutionCache::new(2, Duration::from_secs(60));
        cache.get_or_compute("a", Vec::new);
        cache.get_or_compute("b", Vec::new);
        cache.get_or_compute("a", Vec::new);
        cache.get_or_compute("c", Vec::new);
        assert_eq!(cache.stats()["entries"], 2);
        // "b" was least recently used.
        let (_, mode) = cache.get_or_compute("b", Vec::new);
        assert_eq!(mode, CacheMode::Miss);
    }

    #[test]
    fn test_key_includes_generation() {
        let options = ResolveOptions::default();
        assert_ne!(
            ResolutionCache::cache_key(1, "x", &options),
            ResolutionCache::cache_key(2, "x", &options)
        );
    }
}
