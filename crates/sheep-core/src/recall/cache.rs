//! Recall Caches
//!
//! Session-scoped fact cache plus the shared entity-keyword index, both
//! derived views of the store. The store's fact-write hook clears them
//! synchronously with every fact insert, update, or retraction.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use crate::memory::Fact;

use super::adversarial::EntityIndex;

/// Sessions cached at once
const SESSION_CACHE_CAPACITY: usize = 64;

/// Derived views invalidated on every fact write
pub struct RecallCaches {
    sessions: Mutex<LruCache<String, Arc<Vec<Fact>>>>,
    entity_index: Mutex<Option<Arc<EntityIndex>>>,
}

impl Default for RecallCaches {
    fn default() -> Self {
        Self::new()
    }
}

impl RecallCaches {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(LruCache::new(
                NonZeroUsize::new(SESSION_CACHE_CAPACITY).expect("capacity is non-zero"),
            )),
            entity_index: Mutex::new(None),
        }
    }

    /// Cached fact snapshot for a session, built on miss
    pub fn session_facts<F>(&self, session_id: &str, build: F) -> Arc<Vec<Fact>>
    where
        F: FnOnce() -> Vec<Fact>,
    {
        if let Ok(mut cache) = self.sessions.lock() {
            if let Some(hit) = cache.get(session_id) {
                return hit.clone();
            }
            let built = Arc::new(build());
            cache.put(session_id.to_string(), built.clone());
            return built;
        }
        Arc::new(build())
    }

    /// Cached entity index, built on miss
    pub fn entity_index<F>(&self, build: F) -> Arc<EntityIndex>
    where
        F: FnOnce() -> EntityIndex,
    {
        if let Ok(mut slot) = self.entity_index.lock() {
            if let Some(hit) = slot.as_ref() {
                return hit.clone();
            }
            let built = Arc::new(build());
            *slot = Some(built.clone());
            return built;
        }
        Arc::new(build())
    }

    /// Drop everything; wired into the store's fact-write hook
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.sessions.lock() {
            cache.clear();
        }
        if let Ok(mut slot) = self.entity_index.lock() {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn session_cache_hits_until_invalidated() {
        let caches = RecallCaches::new();
        let builds = AtomicUsize::new(0);
        let build = || {
            builds.fetch_add(1, Ordering::SeqCst);
            vec![Fact::new("user", "likes", "espresso", 0.8)]
        };

        let a = caches.session_facts("s1", build);
        let b = caches.session_facts("s1", || unreachable!("must hit the cache"));
        assert_eq!(a.len(), b.len());
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        caches.invalidate();
        let _ = caches.session_facts("s1", || Vec::new());
    }

    #[test]
    fn entity_index_is_shared_until_invalidated() {
        let caches = RecallCaches::new();
        let first = caches.entity_index(|| EntityIndex::build(&[]));
        let second = caches.entity_index(|| unreachable!("must hit the cache"));
        assert!(Arc::ptr_eq(&first, &second));

        caches.invalidate();
        let third = caches.entity_index(|| EntityIndex::build(&[]));
        assert!(!Arc::ptr_eq(&first, &third));
    }
}
