//! Infrastructure backoff for the loops.
//!
//! Separate from job retries: this only slows a loop down while the store or
//! the queue is failing, and resets after the first clean pass.

use std::time::Duration;

const INITIAL: Duration = Duration::from_millis(100);
const MAX: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct InfraBackoff {
    next: Duration,
    failures: u32,
}

impl Default for InfraBackoff {
    fn default() -> Self {
        Self {
            next: INITIAL,
            failures: 0,
        }
    }
}

impl InfraBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay to wait after a failure. Doubles on each call up to 5s.
    pub fn on_failure(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(MAX);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_cap_then_resets() {
        let mut backoff = InfraBackoff::new();
        let delays: Vec<u64> = (0..8)
            .map(|_| backoff.on_failure().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1600, 3200, 5000, 5000]);
        assert_eq!(backoff.failures(), 8);

        backoff.reset();
        assert_eq!(backoff.on_failure(), Duration::from_millis(100));
    }
}
