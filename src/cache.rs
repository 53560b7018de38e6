//! Bounded recency cache
//!
//! Fixed-capacity key/value store evicting the least-recently-used entry.
//! Each subsystem (chat responses, images, videos, TTS) owns an independent
//! instance; there is no cross-instance sharing and no expiry — eviction is
//! purely capacity-driven.
//!
//! The cache itself carries no locking. A single logical owner mutates it;
//! callers that share an instance across tasks wrap it in a mutex (see
//! [`crate::dedupe::RequestDeduper`]).

use std::collections::{HashMap, VecDeque};

/// Default number of entries per named cache instance.
pub const DEFAULT_CAPACITY: usize = 50;

/// Fixed-capacity LRU cache mapping request fingerprints to inline text or
/// artifact paths.
#[derive(Debug)]
pub struct BoundedCache {
    entries: HashMap<String, String>,
    /// Recency order, oldest at the front. Capacities are small, so the
    /// linear promotion scan is fine.
    order: VecDeque<String>,
    max_size: usize,
}

impl BoundedCache {
    /// Creates a cache holding at most `max_size` entries.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(max_size),
            order: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Returns the value for `key` and promotes it to most-recent.
    ///
    /// Absent keys return `None`, never panic.
    pub fn get(&mut self, key: &str) -> Option<String> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.promote(key);
        self.entries.get(key).cloned()
    }

    /// Inserts or overwrites `key`, promoting it to most-recent. When the
    /// insertion pushes the cache past capacity, exactly one entry — the
    /// least recently touched — is evicted.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        if self.entries.contains_key(key) {
            self.promote(key);
        } else {
            self.order.push_back(key.to_string());
        }
        self.entries.insert(key.to_string(), value.into());

        if self.entries.len() > self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    /// Removes a single entry, e.g. when its artifact file no longer exists.
    pub fn invalidate(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Current number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn promote(&mut self, key: &str) {
        self.order.retain(|k| k != key);
        self.order.push_back(key.to_string());
    }
}
