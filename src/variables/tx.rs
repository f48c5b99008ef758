//! TX collection and capture slots.

use super::collection::{Collection, MutableCollection, OrderedCollection};
use regex::Regex;

/// Transaction-local collection. Also holds the numeric capture slots
/// `0`..`9` bound by `@rx` with `capture`.
#[derive(Debug, Clone, Default)]
pub struct TxCollection {
    data: OrderedCollection,
}

impl TxCollection {
    /// Create an empty TX collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// First value stored under a key.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.data.first(key)
    }

    /// Bind regex captures into slots 0..9. Slots beyond the capture
    /// count are cleared, so stale bindings from earlier rules never
    /// leak through.
    pub fn bind_captures(&mut self, captures: &[String]) {
        for slot in 0..10 {
            let key = slot.to_string();
            match captures.get(slot) {
                Some(value) => self.data.set(key, value.clone()),
                None => self.data.delete(&key),
            }
        }
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl Collection for TxCollection {
    fn all(&self) -> Vec<(&str, &str)> {
        self.data.all()
    }

    fn get(&self, key: &str) -> Vec<&str> {
        self.data.get(key)
    }

    fn get_ci(&self, key: &str) -> Vec<&str> {
        self.data.get_ci(key)
    }

    fn get_regex(&self, pattern: &Regex) -> Vec<(&str, &str)> {
        self.data.get_regex(pattern)
    }

    fn count(&self) -> usize {
        self.data.count()
    }
}

impl MutableCollection for TxCollection {
    fn set(&mut self, key: String, value: String) {
        self.data.set(key, value);
    }

    fn delete(&mut self, key: &str) {
        self.data.delete(key);
    }

    fn increment(&mut self, key: &str, amount: i64) {
        self.data.increment(key, amount);
    }
}
