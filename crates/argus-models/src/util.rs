//! Small utilities shared across the workspace.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, Duration, Utc};

/// Bounded map with per-entry expiry.
///
/// Time is passed in explicitly so callers with synthetic clocks (tests,
/// replay) get deterministic behavior. When full, inserting evicts the
/// oldest entry, so long-running processes cannot grow it without bound.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, (DateTime<Utc>, V)>,
    max_entries: usize,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V> TtlCache<K, V> {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    /// Value for `key` if present and not expired at `now`.
    pub fn get(&self, key: &K, now: DateTime<Utc>) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|(inserted, _)| now - *inserted < self.ttl)
            .map(|(_, v)| v)
    }

    /// Insert or refresh an entry, evicting expired entries and, when still
    /// full, the oldest live entry.
    pub fn insert(&mut self, key: K, value: V, now: DateTime<Utc>) {
        self.entries.retain(|_, (t, _)| now - *t < self.ttl);
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (t, _))| *t)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, (now, value));
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_entry_expires() {
        let mut cache: TtlCache<u32, u32> = TtlCache::new(10, Duration::seconds(60));
        cache.insert(1, 100, t(0));
        assert_eq!(cache.get(&1, t(59)), Some(&100));
        assert_eq!(cache.get(&1, t(60)), None);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut cache: TtlCache<u32, ()> = TtlCache::new(2, Duration::seconds(3600));
        cache.insert(1, (), t(0));
        cache.insert(2, (), t(1));
        cache.insert(3, (), t(2));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&1, t(3)).is_none());
        assert!(cache.get(&2, t(3)).is_some());
        assert!(cache.get(&3, t(3)).is_some());
    }

    #[test]
    fn test_refresh_existing_key_keeps_capacity() {
        let mut cache: TtlCache<u32, u32> = TtlCache::new(2, Duration::seconds(3600));
        cache.insert(1, 1, t(0));
        cache.insert(2, 2, t(1));
        cache.insert(1, 10, t(2));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1, t(3)), Some(&10));
    }
}
