//! Lamport logical clock
//!
//! Every outbound message ticks the clock before it is serialized; every
//! inbound message folds the remote value in. The value is ordering metadata
//! for display, not a delivery guarantee.

use std::sync::Mutex;

/// Thread-safe Lamport counter
///
/// Both operations run under a single lock, so every returned value is
/// unique and the counter never decreases. Observing the same remote value
/// twice advances the counter twice; replays are not deduplicated.
#[derive(Debug, Default)]
pub struct LamportClock {
    counter: Mutex<u64>,
}

impl LamportClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a given value
    pub fn with_value(value: u64) -> Self {
        Self {
            counter: Mutex::new(value),
        }
    }

    /// Send rule: advance by one and return the new value
    pub fn tick(&self) -> u64 {
        let mut counter = self.lock();
        *counter += 1;
        *counter
    }

    /// Receive rule: `max(local, remote) + 1`
    pub fn observe(&self, remote: u64) -> u64 {
        let mut counter = self.lock();
        *counter = (*counter).max(remote).saturating_add(1);
        *counter
    }

    /// Current value without advancing
    pub fn value(&self) -> u64 {
        *self.lock()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, u64> {
        // Poisoning cannot leave a partially written u64
        self.counter.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_tick_adds_n() {
        let clock = LamportClock::with_value(10);
        for _ in 0..5 {
            clock.tick();
        }
        assert_eq!(clock.value(), 15);
    }

    #[test]
    fn test_observe_takes_max_plus_one() {
        let clock = LamportClock::with_value(5);
        assert_eq!(clock.observe(1), 6);
        assert_eq!(clock.observe(20), 21);
    }

    #[test]
    fn test_send_receive_example() {
        // A (0) sends, B (5) receives
        let a = LamportClock::new();
        let b = LamportClock::with_value(5);
        let stamped = a.tick();
        assert_eq!(stamped, 1);
        assert_eq!(b.observe(stamped), 6);
    }

    #[test]
    fn test_observe_replay_advances_twice() {
        let clock = LamportClock::new();
        assert_eq!(clock.observe(3), 4);
        assert_eq!(clock.observe(3), 5);
    }

    #[test]
    fn test_concurrent_values_unique_and_monotonic() {
        let clock = Arc::new(LamportClock::new());
        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let clock = clock.clone();
                std::thread::spawn(move || {
                    let mut seen = Vec::new();
                    for j in 0..200u64 {
                        let v = if j % 2 == 0 {
                            clock.tick()
                        } else {
                            clock.observe(i * 10 + j)
                        };
                        seen.push(v);
                    }
                    seen
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            let seen = handle.join().unwrap();
            // Per-thread values are strictly increasing
            assert!(seen.windows(2).all(|w| w[0] < w[1]));
            for v in seen {
                assert!(all.insert(v), "duplicate clock value {}", v);
            }
        }
        assert_eq!(all.len(), 8 * 200);
    }
}
