//! API Key Pool Management
//!
//! Round-robin rotation over a provider's keys, skipping keys that failed.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// A single API key with usage tracking
#[derive(Debug)]
pub struct ApiKey {
    value: String,
    failed: AtomicBool,
    request_count: AtomicU64,
}

impl ApiKey {
    pub fn new(value: String) -> Self {
        Self {
            value,
            failed: AtomicBool::new(false),
            request_count: AtomicU64::new(0),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }
}

/// Pool of API keys for one provider
#[derive(Debug)]
pub struct KeyPool {
    keys: Vec<ApiKey>,
    current_index: AtomicUsize,
}

impl KeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys: keys.into_iter().map(ApiKey::new).collect(),
            current_index: AtomicUsize::new(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Next key in rotation that is not marked failed.
    ///
    /// When every key has failed the failed marks are cleared and rotation
    /// starts over, so a provider is never left without a key to try.
    pub fn next_key(&self) -> Option<String> {
        if self.keys.is_empty() {
            return None;
        }

        if self.keys.iter().all(ApiKey::is_failed) {
            for key in &self.keys {
                key.failed.store(false, Ordering::Relaxed);
            }
        }

        let len = self.keys.len();
        for _ in 0..len {
            let idx = self.current_index.fetch_add(1, Ordering::Relaxed) % len;
            let key = &self.keys[idx];
            if !key.is_failed() {
                return Some(key.value.clone());
            }
        }

        // Another caller failed the remaining keys between the check and the scan
        self.keys.first().map(|k| k.value.clone())
    }

    /// Count one completed request made with `key_value`
    pub fn record_usage(&self, key_value: &str) {
        if let Some(key) = self.find(key_value) {
            key.request_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn mark_failed(&self, key_value: &str) {
        if let Some(key) = self.find(key_value) {
            key.failed.store(true, Ordering::Relaxed);
        }
    }

    pub fn mark_recovered(&self, key_value: &str) {
        if let Some(key) = self.find(key_value) {
            key.failed.store(false, Ordering::Relaxed);
        }
    }

    fn find(&self, key_value: &str) -> Option<&ApiKey> {
        self.keys.iter().find(|k| k.value == key_value)
    }

    pub fn stats(&self) -> KeyPoolStats {
        let failed = self.keys.iter().filter(|k| k.is_failed()).count();

        KeyPoolStats {
            total_keys: self.keys.len(),
            available_keys: self.keys.len() - failed,
            failed_keys: failed,
            usage_counts: self.keys.iter().map(ApiKey::request_count).collect(),
        }
    }
}

/// Statistics about a key pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyPoolStats {
    pub total_keys: usize,
    pub available_keys: usize,
    pub failed_keys: usize,
    pub usage_counts: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(keys: &[&str]) -> KeyPool {
        KeyPool::new(keys.iter().map(|k| k.to_string()).collect())
    }

    #[test]
    fn test_round_robin() {
        let pool = pool(&["key1", "key2", "key3"]);

        let picked: Vec<_> = (0..4).filter_map(|_| pool.next_key()).collect();
        assert_eq!(picked, vec!["key1", "key2", "key3", "key1"]);
    }

    #[test]
    fn test_skips_failed_keys() {
        let pool = pool(&["key1", "key2"]);
        pool.mark_failed("key1");

        assert_eq!(pool.next_key().as_deref(), Some("key2"));
        assert_eq!(pool.next_key().as_deref(), Some("key2"));

        pool.mark_recovered("key1");
        assert_eq!(pool.stats().failed_keys, 0);
    }

    #[test]
    fn test_all_failed_resets_rotation() {
        let pool = pool(&["key1", "key2"]);
        pool.mark_failed("key1");
        pool.mark_failed("key2");
        assert_eq!(pool.stats().available_keys, 0);

        assert!(pool.next_key().is_some());
        assert_eq!(pool.stats().available_keys, 2);
    }

    #[test]
    fn test_usage_counts() {
        let pool = pool(&["key1", "key2"]);
        pool.record_usage("key2");
        pool.record_usage("key2");
        pool.record_usage("unknown");

        assert_eq!(
            pool.stats(),
            KeyPoolStats {
                total_keys: 2,
                available_keys: 2,
                failed_keys: 0,
                usage_counts: vec![0, 2],
            }
        );
    }

    #[test]
    fn test_empty_pool() {
        let pool = KeyPool::new(Vec::new());
        assert!(pool.is_empty());
        assert_eq!(pool.next_key(), None);
    }
}
