//! Collection trait and the ordered key/value implementation.

use regex::Regex;

/// A readable collection of key/value pairs.
pub trait Collection: Send + Sync {
    /// All entries in insertion order.
    fn all(&self) -> Vec<(&str, &str)>;

    /// Values stored under a key (exact match).
    fn get(&self, key: &str) -> Vec<&str>;

    /// Values stored under a key, compared case-insensitively.
    fn get_ci(&self, key: &str) -> Vec<&str>;

    /// Entries whose key matches a regex.
    fn get_regex(&self, pattern: &Regex) -> Vec<(&str, &str)>;

    /// Number of entries.
    fn count(&self) -> usize;
}

/// A writable collection (TX, persistent collections, ENV).
pub trait MutableCollection: Collection {
    /// Replace all values under a key with one value.
    fn set(&mut self, key: String, value: String);

    /// Remove a key.
    fn delete(&mut self, key: &str);

    /// Add `amount` to a numeric value; non-numeric operands count as 0.
    fn increment(&mut self, key: &str, amount: i64);
}

/// Insertion-ordered collection. Duplicate keys are allowed (repeated
/// query parameters, repeated headers).
#[derive(Debug, Clone, Default)]
pub struct OrderedCollection {
    entries: Vec<(String, String)>,
}

impl OrderedCollection {
    /// Create a new empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, keeping any existing entries with the same key.
    pub fn add(&mut self, key: String, value: String) {
        self.entries.push((key, value));
    }

    /// First value stored under a key, if any.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether the collection has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Combined byte length of all keys and values.
    pub fn combined_size(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl Collection for OrderedCollection {
    fn all(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    fn get(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    fn get_ci(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    fn get_regex(&self, pattern: &Regex) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .filter(|(k, _)| pattern.is_match(k))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    fn count(&self) -> usize {
        self.entries.len()
    }
}

impl MutableCollection for OrderedCollection {
    fn set(&mut self, key: String, value: String) {
        self.delete(&key);
        self.entries.push((key, value));
    }

    fn delete(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    fn increment(&mut self, key: &str, amount: i64) {
        let current: i64 = self
            .first(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        self.set(key.to_string(), (current + amount).to_string());
    }
}
