//! Remember-or-compute cache.
//!
//! A concurrent map of JSON values with per-entry expiry. Expired entries are
//! treated as absent and recomputed on the next `remember`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

use crate::observability::metrics;

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Shared, cloneable cache handle.
#[derive(Debug, Clone)]
pub struct Cache {
    entries: Arc<DashMap<String, Entry>>,
    default_ttl: Duration,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl Cache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Cached value for `key`, or the result of `f` stored for `ttl`.
    ///
    /// Errors from `f` are returned and nothing is stored.
    pub fn remember<F, E>(&self, key: &str, ttl: Duration, f: F) -> Result<Value, E>
    where
        F: FnOnce() -> Result<Value, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = f()?;
        self.put(key, value.clone(), ttl);
        Ok(value)
    }

    /// Live value for `key`. Expired entries are evicted.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone());

        if hit.is_none() {
            self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        }
        metrics::record_cache_lookup(hit.is_some());
        hit
    }

    pub fn put(&self, key: &str, value: Value, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now().checked_add(ttl),
            },
        );
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn forget(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn flush(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn test_remember_computes_once() {
        let cache = Cache::default();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok::<_, ()>(json!([1, 2]))
        };

        assert_eq!(cache.remember("k", Duration::from_secs(60), compute).unwrap(), json!([1, 2]));
        assert_eq!(cache.remember("k", Duration::from_secs(60), compute).unwrap(), json!([1, 2]));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_expired_entries_recompute() {
        let cache = Cache::default();
        cache.put("k", json!("old"), Duration::ZERO);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());

        let value = cache
            .remember("k", Duration::from_secs(60), || Ok::<_, ()>(json!("new")))
            .unwrap();
        assert_eq!(value, json!("new"));
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = Cache::default();
        let err = cache.remember("k", Duration::from_secs(60), || Err::<Value, _>("boom"));
        assert_eq!(err, Err("boom"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unbounded_ttl_never_expires() {
        let cache = Cache::new(Duration::from_secs(u64::MAX));
        cache.put("k", json!(1), cache.default_ttl());
        assert_eq!(cache.get("k"), Some(json!(1)));
    }

    #[test]
    fn test_forget_and_flush() {
        let cache = Cache::default();
        cache.put("a", json!(1), Duration::from_secs(60));
        cache.put("b", json!(2), Duration::from_secs(60));
        assert!(cache.forget("a"));
        assert!(!cache.forget("a"));
        assert_eq!(cache.len(), 1);
        cache.flush();
        assert!(cache.is_empty());
    }
}
