//! Bounded time-expiring cache.
//!
//! Entries live until their expiry timestamp and the cache never holds
//! more than `max_len` of them; once the bound is exceeded the oldest
//! entry goes first. Expiry is judged against an injected [`Clock`].

use crate::utils::Clock;
use chrono::{DateTime, Duration, Utc};
use std::borrow::Borrow;
use std::collections::VecDeque;
use std::sync::Arc;

struct CacheEntry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

pub struct TtlCache<K, V> {
    entries: VecDeque<(K, CacheEntry<V>)>,
    max_len: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K: PartialEq, V: Clone> TtlCache<K, V> {
    pub fn new(max_len: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { entries: VecDeque::new(), max_len: max_len.max(1), ttl, clock }
    }

    /// Look up a live entry; an expired one is removed on the way.
    pub fn get<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: PartialEq + ?Sized,
    {
        let pos = self.entries.iter().position(|(k, _)| k.borrow() == key)?;
        if self.entries[pos].1.expires_at > self.clock.now() {
            return Some(self.entries[pos].1.value.clone());
        }
        self.entries.remove(pos);
        None
    }

    /// Insert or refresh `key`, stamping a fresh expiry. Evicts the
    /// oldest entries once the bound is exceeded.
    pub fn insert(&mut self, key: K, value: V) {
        if let Some(pos) = self.entries.iter().position(|(k, _)| *k == key) {
            self.entries.remove(pos);
        }
        let expires_at = self.clock.now() + self.ttl;
        self.entries.push_back((key, CacheEntry { value, expires_at }));
        while self.entries.len() > self.max_len {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
