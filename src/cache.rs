//! Response Cache
//!
//! Bounded in-memory cache of serialized responses with per-entry TTL.
//! When full, the entry with the oldest creation time is evicted.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: String,
    created_at: Instant,
    ttl: Duration,
    hits: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    total_hits: u64,
}

/// Snapshot of cache occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub total_hits: u64,
}

#[derive(Debug)]
pub struct ResponseCache {
    default_ttl: Duration,
    max_size: usize,
    state: Mutex<CacheState>,
}

impl ResponseCache {
    pub fn new(default_ttl: Duration, max_size: usize) -> Self {
        Self {
            default_ttl,
            max_size,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Derive the cache key for a request.
    ///
    /// Hashes the canonical JSON array `[prompt, model, options]`, with
    /// object keys sorted at every depth, so insertion order never changes
    /// the key and no field can bleed into its neighbour.
    pub fn key_for(
        prompt: &str,
        model: Option<&str>,
        options: &BTreeMap<String, serde_json::Value>,
    ) -> String {
        let mut canonical = String::new();
        canonical.push('[');
        write_canonical_str(&mut canonical, prompt);
        canonical.push(',');
        match model {
            Some(model) => write_canonical_str(&mut canonical, model),
            None => canonical.push_str("null"),
        }
        canonical.push_str(",{");
        for (i, (key, value)) in options.iter().enumerate() {
            if i > 0 {
                canonical.push(',');
            }
            write_canonical_str(&mut canonical, key);
            canonical.push(':');
            write_canonical(&mut canonical, value);
        }
        canonical.push_str("}]");

        format!("{:x}", Sha256::digest(canonical.as_bytes()))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Instant::now())
    }

    /// Look up `key`, lazily dropping it if expired
    pub fn get_at(&self, key: &str, now: Instant) -> Option<String> {
        let mut state = self.state.lock();

        let expired = match state.entries.get(key) {
            None => return None,
            Some(entry) => now.saturating_duration_since(entry.created_at) >= entry.ttl,
        };

        if expired {
            state.entries.remove(key);
            return None;
        }

        state.total_hits += 1;
        let entry = state.entries.get_mut(key)?;
        entry.hits += 1;
        Some(entry.payload.clone())
    }

    /// Store `payload` under `key`; `ttl` defaults to the cache-wide TTL
    pub fn set(&self, key: impl Into<String>, payload: impl Into<String>, ttl: Option<Duration>) {
        self.set_at(key, payload, ttl, Instant::now());
    }

    pub fn set_at(
        &self,
        key: impl Into<String>,
        payload: impl Into<String>,
        ttl: Option<Duration>,
        now: Instant,
    ) {
        if self.max_size == 0 {
            return;
        }

        let key = key.into();
        let mut state = self.state.lock();

        if !state.entries.contains_key(&key) && state.entries.len() >= self.max_size {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.created_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                payload: payload.into(),
                created_at: now,
                ttl: ttl.unwrap_or(self.default_ttl),
                hits: 0,
            },
        );
    }

    /// Drop a single entry
    pub fn remove(&self, key: &str) {
        self.state.lock().entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hits recorded against one live entry
    pub fn hits(&self, key: &str) -> Option<u64> {
        self.state.lock().entries.get(key).map(|e| e.hits)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            size: state.entries.len(),
            total_hits: state.total_hits,
        }
    }

    /// Remove every entry; the cumulative hit counter is kept
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }
}

fn write_canonical(out: &mut String, value: &serde_json::Value) {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, value)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_str(out, key);
                out.push(':');
                write_canonical(out, value);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_canonical_str(out: &mut String, s: &str) {
    out.push_str(&serde_json::Value::String(s.to_string()).to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(pairs: &[(&str, serde_json::Value)]) -> BTreeMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_key_ignores_option_order() {
        let a = options(&[("top_p", json!(0.9)), ("stop", json!({"x": 1, "a": [1, 2]}))]);
        let b = options(&[("stop", json!({"a": [1, 2], "x": 1})), ("top_p", json!(0.9))]);

        assert_eq!(
            ResponseCache::key_for("hi", Some("m"), &a),
            ResponseCache::key_for("hi", Some("m"), &b)
        );
        assert_ne!(
            ResponseCache::key_for("hi", Some("m"), &a),
            ResponseCache::key_for("hi", Some("other"), &a)
        );
        assert_ne!(
            ResponseCache::key_for("hi", None, &a),
            ResponseCache::key_for("hello", None, &a)
        );
        assert_eq!(ResponseCache::key_for("hi", None, &a).len(), 64);
    }

    #[test]
    fn test_key_fields_do_not_run_together() {
        let none = BTreeMap::new();

        assert_ne!(
            ResponseCache::key_for("a:b", Some("c"), &none),
            ResponseCache::key_for("a", Some("b:c"), &none)
        );
        assert_ne!(
            ResponseCache::key_for("hi", None, &none),
            ResponseCache::key_for("hi", Some(""), &none)
        );
        assert_ne!(
            ResponseCache::key_for("hi", None, &none),
            ResponseCache::key_for("hi", Some("null"), &none)
        );
    }

    #[test]
    fn test_get_counts_hits() {
        let cache = ResponseCache::new(Duration::from_secs(60), 10);
        cache.set("k", "v", None);

        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.hits("k"), Some(2));
        assert_eq!(cache.stats(), CacheStats { size: 1, total_hits: 2 });
    }

    #[test]
    fn test_expired_entry_is_removed_on_read() {
        let cache = ResponseCache::new(Duration::from_secs(60), 10);
        let start = Instant::now();
        cache.set_at("k", "v", Some(Duration::from_secs(5)), start);

        assert!(cache.get_at("k", start + Duration::from_secs(4)).is_some());
        assert!(cache.get_at("k", start + Duration::from_secs(5)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evicts_oldest_created_entry() {
        let cache = ResponseCache::new(Duration::from_secs(600), 3);
        let start = Instant::now();

        for i in 0..4u64 {
            cache.set_at(format!("k{}", i), "v", None, start + Duration::from_secs(i));
            // A hot entry is still evicted once it is the oldest
            cache.get_at("k0", start + Duration::from_secs(i));
        }

        assert_eq!(cache.len(), 3);
        assert!(cache.get_at("k0", start + Duration::from_secs(5)).is_none());
        for i in 1..4 {
            assert!(cache.get_at(&format!("k{}", i), start + Duration::from_secs(5)).is_some());
        }
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = ResponseCache::new(Duration::from_secs(600), 2);
        cache.set("a", "1", None);
        cache.set("b", "2", None);
        cache.set("a", "3", None);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some("3".to_string()));
        assert_eq!(cache.get("b"), Some("2".to_string()));
    }

    #[test]
    fn test_clear_keeps_hit_total() {
        let cache = ResponseCache::new(Duration::from_secs(60), 10);
        cache.set("k", "v", None);
        cache.get("k");
        cache.clear();

        assert_eq!(cache.stats(), CacheStats { size: 0, total_hits: 1 });
        cache.clear();
        assert!(cache.is_empty());
    }
}
