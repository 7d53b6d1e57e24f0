//! Staged poll backoff policy
//!
//! Provider settlement latency is bursty and bounded, so the schedule
//! escalates in coarse stages instead of exponentially: early attempts poll
//! at the base interval, later ones back off to two and then three times it.

use std::time::Duration;

/// Attempt thresholds are product-tuned configuration, not invariants;
/// the only guarantee is staged, non-decreasing delays.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base_interval: Duration,
    /// First attempt billed at twice the base interval
    pub stage2_after: u32,
    /// First attempt billed at three times the base interval
    pub stage3_after: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(5),
            stage2_after: 6,
            stage3_after: 12,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base_interval: Duration) -> Self {
        Self {
            base_interval,
            ..Self::default()
        }
    }

    /// Delay before the check following `attempt` completed attempts
    pub fn next_delay(&self, attempt: u32) -> Duration {
        if attempt >= self.stage3_after {
            self.base_interval * 3
        } else if attempt >= self.stage2_after {
            self.base_interval * 2
        } else {
            self.base_interval
        }
    }

    /// Sum of the delays left before the attempt ceiling.
    ///
    /// Display-only ETA for the UI; never a scheduling input.
    pub fn estimated_remaining(&self, attempt: u32, max_attempts: u32) -> Duration {
        (attempt..max_attempts)
            .map(|a| self.next_delay(a))
            .sum()
    }
}
