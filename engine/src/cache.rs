//! Render caching with LRU eviction, keyed by scripture id

use crate::line::ScriptureId;
use crate::render::Render;
use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Capacity used when a zero capacity is configured.
const FALLBACK_CAPACITY: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
}

struct Entries {
    renders: LruCache<ScriptureId, Arc<Render>>,
    /// Bumped by every invalidate and clear
    generation: u64,
}

pub struct RenderCache {
    cache: Mutex<Entries>,
}

impl RenderCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(FALLBACK_CAPACITY);
        Self {
            cache: Mutex::new(Entries {
                renders: LruCache::new(capacity),
                generation: 0,
            }),
        }
    }

    // Entries are immutable, a poisoned lock still holds a usable cache
    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached render for `id`, or a fresh one from `render`.
    ///
    /// The lock is not held while rendering, so two concurrent misses may
    /// both render; the later insert wins. A render that raced an
    /// invalidate or clear is returned but not stored.
    pub fn get_or_render(&self, id: &ScriptureId, render: impl FnOnce() -> Render) -> Arc<Render> {
        let generation = {
            let mut cache = self.lock();
            if let Some(hit) = cache.renders.get(id) {
                tracing::debug!(id = %id, "render cache hit");
                return Arc::clone(hit);
            }
            cache.generation
        };

        let rendered = Arc::new(render());
        let mut cache = self.lock();
        if cache.generation == generation {
            cache.renders.put(id.clone(), Arc::clone(&rendered));
        } else {
            tracing::debug!(id = %id, "render cache invalidated during render, not storing");
        }
        rendered
    }

    pub fn invalidate(&self, id: &ScriptureId) {
        let mut cache = self.lock();
        cache.generation += 1;
        if cache.renders.pop(id).is_some() {
            tracing::debug!(id = %id, "render cache entry invalidated");
        }
    }

    pub fn clear(&self) {
        let mut cache = self.lock();
        cache.generation += 1;
        cache.renders.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let cache = self.lock();
        CacheStats {
            entries: cache.renders.len(),
            capacity: cache.renders.cap().get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn render(id: &str, default_primary_key: &str) -> Render {
        Render {
            scripture_id: id.to_string(),
            default_primary_key: default_primary_key.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_second_lookup_is_cached() {
        let cache = RenderCache::new(4);
        let id = ScriptureId::shabad(1);
        let calls = Cell::new(0);

        let first = cache.get_or_render(&id, || {
            calls.set(calls.get() + 1);
            render("1", "10")
        });
        let second = cache.get_or_render(&id, || {
            calls.set(calls.get() + 1);
            render("1", "99")
        });

        assert_eq!(calls.get(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.default_primary_key, "10");
    }

    #[test]
    fn test_invalidate_forces_rerender() {
        let cache = RenderCache::new(4);
        let id = ScriptureId::Bani("japji".to_string());
        cache.get_or_render(&id, || render("japji", "1"));
        cache.invalidate(&id);

        let fresh = cache.get_or_render(&id, || render("japji", "7"));
        assert_eq!(fresh.default_primary_key, "7");
    }

    #[test]
    fn test_invalidate_during_render_is_not_overwritten() {
        let cache = RenderCache::new(4);
        let id = ScriptureId::shabad(1);

        // A history post lands while the stale render is in flight
        let stale = cache.get_or_render(&id, || {
            cache.invalidate(&id);
            render("1", "10")
        });
        assert_eq!(stale.default_primary_key, "10");
        assert_eq!(cache.stats().entries, 0);

        let calls = Cell::new(0);
        let fresh = cache.get_or_render(&id, || {
            calls.set(calls.get() + 1);
            render("1", "20")
        });
        assert_eq!(calls.get(), 1);
        assert_eq!(fresh.default_primary_key, "20");
        assert_eq!(cache.get_or_render(&id, || render("1", "30")).default_primary_key, "20");
    }

    #[test]
    fn test_clear_during_render_is_not_overwritten() {
        let cache = RenderCache::new(4);
        let id = ScriptureId::Bani("japji".to_string());
        cache.get_or_render(&id, || {
            cache.clear();
            render("japji", "1")
        });
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_eviction_and_stats() {
        let cache = RenderCache::new(2);
        for i in 1..=3 {
            cache.get_or_render(&ScriptureId::shabad(i), || render(&i.to_string(), "1"));
        }
        assert_eq!(cache.stats(), CacheStats { entries: 2, capacity: 2 });

        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_zero_capacity_falls_back() {
        assert_eq!(RenderCache::new(0).stats().capacity, 64);
    }
}
