//! Sender-side throughput policy.
//!
//! Providers throttle accounts that send too much too quickly. The policy
//! caps sends per rolling minute and per rolling hour, groups sends into
//! batches, and spaces individual messages apart.
//!
//! # Example
//!
//! ```text
//! max_per_minute: 30, max_per_hour: 500, batch_size: 10, delay: 2000ms
//! - a batch of up to 10 is admitted while both windows have room
//! - 2s pause between consecutive messages
//! - after 30 sends inside one minute, wait out the rest of the minute
//! - after 500 sends inside one hour, wait out the rest of the hour
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// When `false` every message is sent back-to-back with no throttling.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Pause between consecutive messages, in milliseconds.
    #[serde(default = "default_delay_ms", alias = "delay_between_emails")]
    pub delay_between_messages_ms: u64,

    /// Sends allowed per rolling minute. `0` blocks the channel entirely.
    #[serde(default = "default_max_per_minute")]
    pub max_per_minute: u32,

    /// Sends allowed per rolling hour. `0` blocks the channel entirely.
    #[serde(default = "default_max_per_hour")]
    pub max_per_hour: u32,

    /// Largest group of messages sent before quota is checked again.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            delay_between_messages_ms: default_delay_ms(),
            max_per_minute: default_max_per_minute(),
            max_per_hour: default_max_per_hour(),
            batch_size: default_batch_size(),
        }
    }
}

const fn default_enabled() -> bool {
    true
}

const fn default_delay_ms() -> u64 {
    2000
}

const fn default_max_per_minute() -> u32 {
    30
}

const fn default_max_per_hour() -> u32 {
    500
}

const fn default_batch_size() -> u32 {
    10
}

impl RateLimitPolicy {
    /// A policy that sends everything immediately.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn delay_between_messages(&self) -> Duration {
        Duration::from_millis(self.delay_between_messages_ms)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroBatchSize`] when `batch_size` is `0`.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RateLimitPolicy::default();
        assert!(policy.enabled);
        assert_eq!(policy.delay_between_messages(), Duration::from_secs(2));
        assert_eq!(policy.max_per_minute, 30);
        assert_eq!(policy.max_per_hour, 500);
        assert_eq!(policy.batch_size, 10);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let policy = RateLimitPolicy {
            batch_size: 0,
            ..RateLimitPolicy::default()
        };
        assert_eq!(policy.validate(), Err(ConfigError::ZeroBatchSize));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let policy: RateLimitPolicy = ron::from_str("(max_per_minute: 5)").unwrap();
        assert_eq!(policy.max_per_minute, 5);
        assert_eq!(policy.batch_size, 10);
        assert!(policy.enabled);
    }
}
