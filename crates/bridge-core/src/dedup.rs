use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks recently seen (text, timestamp) pairs so at-least-once delivery
/// from the mailbox never dispatches the same message twice. Entries expire
/// after the TTL; expired keys are purged on insert, bounding memory.
///
/// Owned exclusively by the single-threaded poll loop, so no locking.
pub struct DedupCache {
    ttl: Duration,
    seen: HashMap<String, Instant>,
}

impl DedupCache {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: HashMap::new(),
        }
    }

    /// Returns true if this (text, timestamp) pair was already seen within
    /// the TTL. Fresh pairs are recorded as seen.
    pub fn check_and_insert(&mut self, text: &str, timestamp: &str) -> bool {
        self.check_and_insert_at(text, timestamp, Instant::now())
    }

    fn check_and_insert_at(&mut self, text: &str, timestamp: &str, now: Instant) -> bool {
        self.seen.retain(|_, at| now.duration_since(*at) < self.ttl);
        let key = format!("{}|{}", text, timestamp);
        if self.seen.contains_key(&key) {
            return true;
        }
        self.seen.insert(key, now);
        false
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.len()
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TTL)
    }
}
