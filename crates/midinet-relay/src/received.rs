/// Inbound-identifier dedup set with time-based eviction.
///
/// A set that was never pruned would grow for the lifetime of the process;
/// instead, entries older than `WINDOW` seconds (wall-clock arrival time)
/// are evicted, comfortably larger than any duplication-induced reordering.
use std::collections::HashMap;

use midinet_protocol::UniqueIdentifier;

/// Eviction window, in seconds. An identifier not re-observed within this
/// window is forgotten; a subsequent packet with the same identifier is then
/// treated as new (accepted again). This is a deliberate trade-off against
/// unbounded memory growth, not a correctness guarantee against replay.
pub const WINDOW: f64 = 10.0;

pub struct ReceivedSet {
    seen: HashMap<UniqueIdentifier, f64>,
    last_evict: f64,
}

impl Default for ReceivedSet {
    fn default() -> Self {
        Self {
            seen: HashMap::new(),
            last_evict: 0.0,
        }
    }
}

impl ReceivedSet {
    /// Insert `id`, recording `now` as its arrival time. Returns `true` if
    /// `id` was not already present (i.e. this packet should be accepted),
    /// `false` if it is a duplicate.
    pub fn insert_if_new(&mut self, id: UniqueIdentifier, now: f64) -> bool {
        self.maybe_evict(now);
        if self.seen.contains_key(&id) {
            false
        } else {
            self.seen.insert(id, now);
            true
        }
    }

    /// Sweep entries older than `WINDOW`. Throttled to roughly once per
    /// quarter-window so a steady stream of inbound packets doesn't turn this
    /// into an O(n) scan on every single insert.
    fn maybe_evict(&mut self, now: f64) {
        if now - self.last_evict < WINDOW / 4.0 {
            return;
        }
        self.seen.retain(|_, arrived| now - *arrived < WINDOW);
        self.last_evict = now;
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(serial: u32) -> UniqueIdentifier {
        UniqueIdentifier {
            serial,
            timestamp: serial as f64,
        }
    }

    #[test]
    fn first_observation_is_accepted_duplicate_is_not() {
        let mut set = ReceivedSet::default();
        assert!(set.insert_if_new(id(1), 0.0));
        assert!(!set.insert_if_new(id(1), 0.1));
    }

    #[test]
    fn entries_are_evicted_after_the_window_elapses() {
        let mut set = ReceivedSet::default();
        assert!(set.insert_if_new(id(1), 0.0));
        // Force an eviction sweep far enough in the future.
        assert!(set.insert_if_new(id(2), 100.0));
        assert_eq!(set.len(), 1);
        // id(1) was evicted, so it is accepted again.
        assert!(set.insert_if_new(id(1), 100.0));
    }
}
