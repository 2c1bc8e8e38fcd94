//! Exponential backoff used between reconnect attempts.

use rand::Rng;
use std::time::Duration;

/// Share of the computed delay added as random jitter.
const JITTER_RATIO: f64 = 0.1;

/// Exponential backoff with jitter.
///
/// Delays double from `base_delay` on every failed attempt, capped at
/// `max_delay`. A successful attempt resets the sequence.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_delay: Duration,
    max_delay: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            attempts: 0,
        }
    }

    /// Delay to wait before the next attempt; advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.exponential_delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        let jitter = delay.as_secs_f64() * JITTER_RATIO * rand::thread_rng().gen::<f64>();
        (delay + Duration::from_secs_f64(jitter)).min(self.max_delay)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn exponential_delay(&self, n_attempts: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * 2_f64.powi(n_attempts.min(32) as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(10))
    }
}
