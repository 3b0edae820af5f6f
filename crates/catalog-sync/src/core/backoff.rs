use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Bounded exponential backoff for transient upstream failures.
///
/// `max_attempts` counts every request made for one page, the first one
/// included, so `max_attempts = 3` means two retries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Attempts are always at least one, whatever was configured.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`,
    /// capped at `max_delay_ms`, never shorter than an upstream `Retry-After`.
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let shift = retry.saturating_sub(1).min(63);
        let exp = 1u128 << shift;
        let ms = (self.base_delay_ms as u128)
            .saturating_mul(exp)
            .min(self.max_delay_ms as u128) as u64;

        let ms = if self.jitter && ms > 0 {
            ms + rand::thread_rng().gen_range(0..=ms / 4)
        } else {
            ms
        };

        let delay = Duration::from_millis(ms);
        match retry_after {
            Some(upstream) if upstream > delay => upstream,
            _ => delay,
        }
    }
}
