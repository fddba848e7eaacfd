//! Session configuration.

use std::time::Duration;

/// Configuration for a notification session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Safety-net poll interval. The poll runs regardless of
    /// subscription health to bound worst-case staleness.
    pub poll_interval: Duration,
    /// Fixed delay before a subscription reconnect attempt.
    pub reconnect_delay: Duration,
    /// Max reconnect attempts (0 = retry indefinitely).
    pub max_reconnect_attempts: u32,
    /// Cap on unread notifications fetched per poll.
    pub unread_fetch_limit: usize,
    /// Cap on orders fetched per poll.
    pub order_fetch_limit: usize,
    /// Whether audible alerts start enabled.
    pub sound_enabled: bool,
}

impl Default for SessionConfig {
    /// Storefront defaults.
    ///
    /// - 30 s poll: bounds staleness when the feed is down
    /// - 5 s reconnect, unlimited attempts: the subscription is a
    ///   convenience path, not a critical one
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 0,
            unread_fetch_limit: 50,
            order_fetch_limit: 100,
            sound_enabled: true,
        }
    }
}

impl SessionConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tight timings for demos and interactive testing.
    pub fn fast() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            reconnect_delay: Duration::from_millis(100),
            ..Self::default()
        }
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the reconnect delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the max reconnect attempts (0 = unlimited).
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set whether sound starts enabled.
    pub fn with_sound_enabled(mut self, enabled: bool) -> Self {
        self.sound_enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.max_reconnect_attempts, 0); // retry forever
        assert!(config.sound_enabled);
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::new()
            .with_poll_interval(Duration::from_secs(10))
            .with_sound_enabled(false);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert!(!config.sound_enabled);
    }
}
