//! Persistent collection store.
//!
//! `IP`, `SESSION`, `USER`, `GLOBAL` and `RESOURCE` survive individual
//! transactions. The engine reaches them through [`CollectionStore`]; a
//! production deployment backs this with shared storage, while the
//! bundled [`MemoryStore`] keeps everything in process memory.
//!
//! Records are addressed as `(name, key)` where `name` scopes the
//! collection to its `initcol` instance (`ip:198.51.100.7`) and `key` is
//! the variable name inside it. Per-key read-modify-write consistency is
//! the store implementation's responsibility.

use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;

/// A stored collection entry.
#[derive(Debug, Clone)]
pub struct StoredValue {
    /// The value bytes.
    pub value: String,
    /// Creation time (seconds since the epoch).
    pub created_at: i64,
    /// Last read or write time.
    pub last_used_at: i64,
    /// Expiry time, if one was set.
    pub expires_at: Option<i64>,
}

/// Backend for persistent collections.
pub trait CollectionStore: Send + Sync {
    /// Read one entry. Expired entries are treated as absent.
    fn get(&self, name: &str, key: &str) -> Option<StoredValue>;

    /// Write one entry, with an optional TTL in seconds.
    fn put(&self, name: &str, key: &str, value: &str, ttl: Option<u64>);

    /// Delete one entry.
    fn delete(&self, name: &str, key: &str);

    /// Keys within a collection matching a regex.
    fn keys_matching(&self, name: &str, pattern: &Regex) -> Vec<String>;

    /// All keys within a collection.
    fn keys(&self, name: &str) -> Vec<String>;

    /// Set an absolute expiry time on an entry.
    fn expire(&self, name: &str, key: &str, at: i64);
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// In-memory store. Suitable for single-process deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, HashMap<String, StoredValue>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CollectionStore for MemoryStore {
    fn get(&self, name: &str, key: &str) -> Option<StoredValue> {
        let mut data = self.data.lock().unwrap();
        let collection = data.get_mut(name)?;
        let now = now_epoch();
        if let Some(entry) = collection.get(key) {
            if entry.expires_at.is_some_and(|at| at <= now) {
                collection.remove(key);
                return None;
            }
        }
        let entry = collection.get_mut(key)?;
        entry.last_used_at = now;
        Some(entry.clone())
    }

    fn put(&self, name: &str, key: &str, value: &str, ttl: Option<u64>) {
        let mut data = self.data.lock().unwrap();
        let now = now_epoch();
        let collection = data.entry(name.to_string()).or_default();
        let created_at = collection.get(key).map(|e| e.created_at).unwrap_or(now);
        collection.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                created_at,
                last_used_at: now,
                expires_at: ttl.map(|t| now + t as i64),
            },
        );
    }

    fn delete(&self, name: &str, key: &str) {
        let mut data = self.data.lock().unwrap();
        if let Some(collection) = data.get_mut(name) {
            collection.remove(key);
        }
    }

    fn keys_matching(&self, name: &str, pattern: &Regex) -> Vec<String> {
        let data = self.data.lock().unwrap();
        let now = now_epoch();
        data.get(name)
            .map(|collection| {
                collection
                    .iter()
                    .filter(|(_, e)| !e.expires_at.is_some_and(|at| at <= now))
                    .filter(|(k, _)| pattern.is_match(k))
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn keys(&self, name: &str) -> Vec<String> {
        let data = self.data.lock().unwrap();
        let now = now_epoch();
        data.get(name)
            .map(|collection| {
                collection
                    .iter()
                    .filter(|(_, e)| !e.expires_at.is_some_and(|at| at <= now))
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn expire(&self, name: &str, key: &str, at: i64) {
        let mut data = self.data.lock().unwrap();
        if let Some(entry) = data.get_mut(name).and_then(|c| c.get_mut(key)) {
            entry.expires_at = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_roundtrip() {
        let store = MemoryStore::new();
        store.put("ip:198.51.100.7", "counter", "3", None);
        let entry = store.get("ip:198.51.100.7", "counter").unwrap();
        assert_eq!(entry.value, "3");
        assert!(entry.expires_at.is_none());
    }

    #[test]
    fn test_instances_are_isolated() {
        let store = MemoryStore::new();
        store.put("ip:10.0.0.1", "counter", "1", None);
        store.put("ip:10.0.0.2", "counter", "9", None);
        assert_eq!(store.get("ip:10.0.0.1", "counter").unwrap().value, "1");
        assert_eq!(store.get("ip:10.0.0.2", "counter").unwrap().value, "9");
    }

    #[test]
    fn test_expired_entry_is_absent() {
        let store = MemoryStore::new();
        store.put("session:abc", "user", "bob", None);
        store.expire("session:abc", "user", now_epoch() - 1);
        assert!(store.get("session:abc", "user").is_none());
        assert!(store.keys("session:abc").is_empty());
    }

    #[test]
    fn test_keys_matching() {
        let store = MemoryStore::new();
        store.put("global:global", "limit_api", "10", None);
        store.put("global:global", "limit_web", "20", None);
        store.put("global:global", "other", "1", None);
        let re = Regex::new("^limit_").unwrap();
        let mut keys = store.keys_matching("global:global", &re);
        keys.sort();
        assert_eq!(keys, vec!["limit_api", "limit_web"]);
    }

    #[test]
    fn test_created_at_survives_overwrite() {
        let store = MemoryStore::new();
        store.put("ip:1.2.3.4", "n", "1", None);
        let created = store.get("ip:1.2.3.4", "n").unwrap().created_at;
        store.put("ip:1.2.3.4", "n", "2", None);
        assert_eq!(store.get("ip:1.2.3.4", "n").unwrap().created_at, created);
    }
}
