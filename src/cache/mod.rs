//! Resolved download URL cache
//!
//! `getFile` links stay valid for at least an hour, so repeated share-link
//! hits within the TTL reuse the last resolved URL instead of calling the
//! Bot API again.

mod lru;

pub use lru::LruTracker;

use crate::config::CacheConfig;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

struct CachedLink {
    url: String,
    resolved_at: Instant,
}

struct Inner {
    links: HashMap<String, CachedLink>,
    lru: LruTracker<String>,
}

/// Bounded TTL cache keyed by Telegram file id
pub struct LinkCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    max_entries: usize,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
}

impl LinkCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        LinkCache {
            inner: Mutex::new(Inner {
                links: HashMap::new(),
                lru: LruTracker::new(),
            }),
            ttl,
            max_entries,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        LinkCache::new(Duration::from_secs(config.link_ttl_secs), config.max_entries)
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero() && self.max_entries > 0
    }

    pub fn get(&self, file_id: &str) -> Option<String> {
        self.get_at(file_id, Instant::now())
    }

    pub fn get_at(&self, file_id: &str, now: Instant) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }

        let mut inner = self.inner.lock();
        let fresh = match inner.links.get(file_id) {
            Some(link) => now.saturating_duration_since(link.resolved_at) < self.ttl,
            None => return None,
        };

        if !fresh {
            trace!("Cached link for {} expired", file_id);
            inner.links.remove(file_id);
            inner.lru.remove(&file_id.to_string());
            return None;
        }

        let key = file_id.to_string();
        inner.lru.touch(&key);
        inner.links.get(file_id).map(|link| link.url.clone())
    }

    pub fn insert(&self, file_id: &str, url: String) {
        self.insert_at(file_id, url, Instant::now());
    }

    pub fn insert_at(&self, file_id: &str, url: String, now: Instant) {
        if !self.is_enabled() {
            return;
        }

        let mut inner = self.inner.lock();
        let key = file_id.to_string();
        inner.links.insert(key.clone(), CachedLink { url, resolved_at: now });
        inner.lru.touch(&key);

        while inner.links.len() > self.max_entries {
            match inner.lru.pop_oldest() {
                Some(evicted) => {
                    trace!("Evicting cached link for {}", evicted);
                    inner.links.remove(&evicted);
                }
                None => break,
            }
        }
    }

    pub fn invalidate(&self, file_id: &str) {
        let mut inner = self.inner.lock();
        if inner.links.remove(file_id).is_some() {
            inner.lru.remove(&file_id.to_string());
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.inner.lock().links.len(),
            max_entries: self.max_entries,
        }
    }
}
