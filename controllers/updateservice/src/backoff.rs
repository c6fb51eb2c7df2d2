//! # Fibonacci Backoff
//!
//! Requeue delays for UpdateService instances whose reconciliation keeps
//! failing. The delay grows along the Fibonacci sequence, which is gentler
//! than doubling, and is capped so a broken instance is still retried at a
//! steady cadence.
//!
//! With the default settings the sequence is 5s, 5s, 10s, 15s, 25s, 40s, ...
//! up to 300s.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, starting from `min_secs` twice.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Previous backoff value in seconds
    prev_secs: u64,
    /// Current backoff value in seconds
    current_secs: u64,
    /// Maximum backoff value in seconds
    max_secs: u64,
}

impl FibonacciBackoff {
    /// Create a backoff bounded by `min` and `max` (whole seconds; a zero
    /// minimum is raised to one second so the sequence can grow)
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let min_secs = min.as_secs().max(1);
        Self {
            prev_secs: 0,
            current_secs: min_secs,
            max_secs: max.as_secs().max(min_secs),
        }
    }

    /// Get the next delay and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current_secs;
        let next = self.prev_secs.saturating_add(self.current_secs);
        self.prev_secs = self.current_secs;
        self.current_secs = next.min(self.max_secs);
        Duration::from_secs(result)
    }
}

/// Error backoff per instance, keyed by `namespace/name`
#[derive(Debug)]
pub struct InstanceBackoffs {
    min: Duration,
    max: Duration,
    entries: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl InstanceBackoffs {
    /// Create an empty registry whose entries run from `min` to `max`
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Next delay for `key`, starting a fresh sequence on first failure
    pub fn next_backoff(&self, key: &str) -> Duration {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(key.to_string())
            .or_insert_with(|| FibonacciBackoff::new(self.min, self.max))
            .next_backoff()
    }

    /// Drop the sequence for `key` after a success or once the instance is gone
    pub fn forget(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
    }

    /// Number of instances currently backing off
    pub fn tracked(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(backoff: &mut FibonacciBackoff) -> u64 {
        backoff.next_backoff().as_secs()
    }

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::new(Duration::from_secs(5), Duration::from_secs(300));

        assert_eq!(secs(&mut backoff), 5);
        assert_eq!(secs(&mut backoff), 5);
        assert_eq!(secs(&mut backoff), 10);
        assert_eq!(secs(&mut backoff), 15);
        assert_eq!(secs(&mut backoff), 25);
        assert_eq!(secs(&mut backoff), 40);
        assert_eq!(secs(&mut backoff), 65);
    }

    #[test]
    fn test_fibonacci_backoff_caps_at_max() {
        let mut backoff = FibonacciBackoff::new(Duration::from_secs(5), Duration::from_secs(20));

        assert_eq!(secs(&mut backoff), 5);
        assert_eq!(secs(&mut backoff), 5);
        assert_eq!(secs(&mut backoff), 10);
        assert_eq!(secs(&mut backoff), 15);
        assert_eq!(secs(&mut backoff), 20);
        assert_eq!(secs(&mut backoff), 20);
    }

    #[test]
    fn test_zero_minimum_still_grows() {
        let mut backoff = FibonacciBackoff::new(Duration::ZERO, Duration::from_secs(3));
        assert_eq!(secs(&mut backoff), 1);
        assert_eq!(secs(&mut backoff), 1);
        assert_eq!(secs(&mut backoff), 2);
        assert_eq!(secs(&mut backoff), 3);
    }

    #[test]
    fn test_instance_backoffs_are_independent() {
        let backoffs = InstanceBackoffs::new(Duration::from_secs(5), Duration::from_secs(300));

        assert_eq!(backoffs.next_backoff("ns/a").as_secs(), 5);
        assert_eq!(backoffs.next_backoff("ns/a").as_secs(), 5);
        assert_eq!(backoffs.next_backoff("ns/a").as_secs(), 10);
        assert_eq!(backoffs.next_backoff("ns/b").as_secs(), 5);
        assert_eq!(backoffs.tracked(), 2);
    }

    #[test]
    fn test_forgotten_instance_starts_over() {
        let backoffs = InstanceBackoffs::new(Duration::from_secs(5), Duration::from_secs(300));
        for _ in 0..4 {
            backoffs.next_backoff("ns/a");
        }

        backoffs.forget("ns/a");
        backoffs.forget("ns/never-failed");

        assert_eq!(backoffs.tracked(), 0);
        assert_eq!(backoffs.next_backoff("ns/a").as_secs(), 5);
    }
}
