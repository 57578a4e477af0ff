//! Expiring key/value cache owned by the plugin layer.
//!
//! Token and secret caching happens here rather than in the resolver, which stays
//! stateless. Plugins receive the registry's cache through
//! [`PluginRegistrar::cache`](super::PluginRegistrar::cache).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Cache with per-entry expiry.
pub trait PluginCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value`; `ttl` of `None` never expires.
    fn set(&self, key: &str, value: String, ttl: Option<Duration>);

    fn delete(&self, key: &str);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// Process-local [`PluginCache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PluginCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = entries.get(key)?;
        if entry.is_expired(Instant::now()) {
            entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    fn set(&self, key: &str, value: String, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key.to_string(), CacheEntry { value, expires_at });
    }

    fn delete(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_deletes_values() {
        let cache = MemoryCache::new();
        cache.set("token", "abc".into(), None);
        assert_eq!(cache.get("token").as_deref(), Some("abc"));
        cache.delete("token");
        assert_eq!(cache.get("token"), None);
    }

    #[test]
    fn expired_entries_are_evicted() {
        let cache = MemoryCache::new();
        cache.set("short", "x".into(), Some(Duration::ZERO));
        cache.set("long", "y".into(), Some(Duration::from_secs(3600)));
        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.get("long").as_deref(), Some("y"));
    }
}
