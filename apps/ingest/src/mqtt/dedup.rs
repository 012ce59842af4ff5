//! Short-window suppression of duplicate discrete events
//!
//! The broker delivers at-least-once and the hardware retransmits in
//! bursts, so the same SOS or fall frame can arrive several times
//! within milliseconds. Entries expire lazily on the next lookup; the
//! key space is small and self-limiting, so no sweep is needed.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Fingerprint of a discrete event: band, type code, value
type DedupKey = (String, i32, i32);

#[derive(Debug)]
pub struct DedupCache {
    window: Duration,
    seen: DashMap<DedupKey, Instant>,
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: DashMap::new(),
        }
    }

    /// Record the event fingerprint; returns false if an identical
    /// event was seen within the window.
    pub fn admit(&self, bid: &str, type_code: i32, value: i32) -> bool {
        let key = (bid.to_string(), type_code, value);
        let now = Instant::now();
        let mut fresh = true;
        self.seen
            .entry(key)
            .and_modify(|last| {
                if now.duration_since(*last) < self.window {
                    fresh = false;
                } else {
                    *last = now;
                }
            })
            .or_insert(now);
        fresh
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_event_admitted() {
        let cache = DedupCache::new(Duration::from_millis(500));
        assert!(cache.admit("12345", 6, 1));
    }

    #[test]
    fn test_duplicate_within_window_suppressed() {
        let cache = DedupCache::new(Duration::from_millis(500));
        assert!(cache.admit("12345", 6, 1));
        assert!(!cache.admit("12345", 6, 1));
    }

    #[test]
    fn test_different_fingerprints_independent() {
        let cache = DedupCache::new(Duration::from_millis(500));
        assert!(cache.admit("12345", 6, 1));
        assert!(cache.admit("12345", 7, 1));
        assert!(cache.admit("67890", 6, 1));
        assert!(cache.admit("12345", 6, 2));
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_readmitted_after_window() {
        let cache = DedupCache::new(Duration::from_millis(1));
        assert!(cache.admit("12345", 6, 1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.admit("12345", 6, 1));
    }
}
