//! Reconnect delay policy
//!
//! Exponential growth from a base delay, optional ceiling, and symmetric
//! jitter to keep a fleet of consumers from reconnecting in lockstep.

use std::time::Duration;

use rand::Rng;

/// Baseline fixed retry delay
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(5000);

/// Delay strategy used before a reconnect attempt
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub base: Duration,

    /// Growth factor per consecutive failed attempt (1.0 = fixed delay)
    pub multiplier: f64,

    /// Upper bound on the un-jittered delay
    pub max_delay: Option<Duration>,

    /// Jitter as a fraction of the delay, e.g. 0.25 for ±25%
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_RETRY_DELAY,
            multiplier: 2.0,
            max_delay: Some(Duration::from_secs(60)),
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Same delay before every retry, no jitter
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base: delay,
            multiplier: 1.0,
            max_delay: None,
            jitter: 0.0,
        }
    }

    /// Exponential backoff from `base` with the default cap and jitter
    pub fn exponential(base: Duration) -> Self {
        Self {
            base,
            ..Default::default()
        }
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn max_delay(mut self, max: Option<Duration>) -> Self {
        self.max_delay = max;
        self
    }

    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before `attempt` (1-based) without jitter
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let millis = self.base.as_millis() as f64 * factor;

        let cap = self
            .max_delay
            .map(|max| max.as_millis() as f64)
            .unwrap_or(u64::MAX as f64);

        Duration::from_millis(millis.min(cap) as u64)
    }

    /// Delay before `attempt` (1-based) with jitter applied
    pub fn delay(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if self.jitter <= 0.0 {
            return nominal;
        }

        let spread = nominal.as_millis() as f64 * self.jitter;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        let millis = (nominal.as_millis() as f64 + offset).max(0.0);
        Duration::from_millis(millis as u64)
    }
}
