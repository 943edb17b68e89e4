//! Reconnect delay policies.
//!
//! The link state machine asks its policy how long to wait before each reconnect
//! attempt. [`Immediate`] reproduces the classic behaviour of reconnecting at once,
//! forever. [`ExponentialBackoff`] doubles the delay per consecutive failure up to a cap,
//! optionally with full jitter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Strategy for spacing reconnect attempts.
pub trait ReconnectPolicy: Send {
    /// Delay before reconnect attempt number `attempt` (1-based, reset on success).
    fn next_delay(&mut self, attempt: u32) -> Duration;
}

/// Reconnect at once, every time.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl ReconnectPolicy for Immediate {
    fn next_delay(&mut self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// Doubling delay with an upper bound.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    jitter: bool,
}

impl ExponentialBackoff {
    /// Start at `initial`, double per attempt, never exceed `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            jitter: false,
        }
    }

    /// Pick each delay uniformly from zero up to the computed value.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    fn ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt);
        if !self.jitter || ceiling.is_zero() {
            return ceiling;
        }
        let micros = u64::try_from(ceiling.as_micros()).unwrap_or(u64::MAX);
        Duration::from_micros(rand::thread_rng().gen_range(0..=micros))
    }
}

/// Reconnect policy as written in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ReconnectConfig {
    /// Reconnect at once, forever
    #[default]
    Immediate,
    /// Exponential backoff between attempts
    Backoff {
        /// First delay
        #[serde(with = "humantime_serde")]
        initial: Duration,
        /// Upper bound on any delay
        #[serde(with = "humantime_serde")]
        max: Duration,
        /// Randomise each delay below the computed value
        #[serde(default)]
        jitter: bool,
    },
}

impl ReconnectConfig {
    /// Build the configured policy.
    pub fn build(&self) -> Box<dyn ReconnectPolicy> {
        match *self {
            ReconnectConfig::Immediate => Box::new(Immediate),
            ReconnectConfig::Backoff {
                initial,
                max,
                jitter,
            } => Box::new(ExponentialBackoff::new(initial, max).with_jitter(jitter)),
        }
    }

    /// Check that the backoff bounds are ordered.
    pub fn validate(&self) -> Result<(), String> {
        if let ReconnectConfig::Backoff { initial, max, .. } = self {
            if initial > max {
                return Err(format!(
                    "link.reconnect.initial ({:?}) exceeds link.reconnect.max ({:?})",
                    initial, max
                ));
            }
        }
        Ok(())
    }
}
