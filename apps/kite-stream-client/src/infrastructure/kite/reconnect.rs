//! Reconnection Policy
//!
//! Pure backoff calculator for WebSocket reconnection: exponential delay,
//! capped, with a bounded number of attempts. Owns no timers; the
//! connection loop schedules the sleep it computes.
//!
//! Once attempts are exhausted the policy is terminal: the caller emits a
//! single `noreconnect` event and stops scheduling. Exiting the process is
//! the application's decision, never this library's.

use std::time::Duration;

/// Default maximum number of reconnection attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 50;

/// Hard ceiling on configured attempts.
pub const MAX_ATTEMPTS_CEILING: u32 = 300;

/// Default cap on the backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Hard floor on the configured delay cap.
pub const MIN_MAX_DELAY: Duration = Duration::from_secs(5);

/// Configuration for reconnection behavior.
///
/// Constructors clamp the inputs: attempts to at most
/// [`MAX_ATTEMPTS_CEILING`], the delay cap to at least [`MIN_MAX_DELAY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Whether automatic reconnection is enabled.
    pub enabled: bool,
    /// Maximum number of reconnection attempts.
    pub max_attempts: u32,
    /// Cap on the computed backoff delay.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl ReconnectConfig {
    /// Create a configuration, applying the documented clamps.
    ///
    /// `None` selects the default for either limit.
    #[must_use]
    pub fn new(enabled: bool, max_attempts: Option<u32>, max_delay: Option<Duration>) -> Self {
        Self {
            enabled,
            max_attempts: max_attempts
                .unwrap_or(DEFAULT_MAX_ATTEMPTS)
                .min(MAX_ATTEMPTS_CEILING),
            max_delay: max_delay.unwrap_or(DEFAULT_MAX_DELAY).max(MIN_MAX_DELAY),
        }
    }
}

/// Retry lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPhase {
    /// Attempts remain available.
    #[default]
    Active,
    /// Attempts exceeded the configured maximum; terminal.
    Exhausted,
}

/// Exponential backoff with bounded attempts.
///
/// Delay sequence with the default 60 s cap: 1, 2, 4, 8, 16, 32, 60, 60...
/// The first delay is 1 s unless a previous delay is carried over from an
/// earlier connection cycle.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
    last_delay: Option<Duration>,
    phase: RetryPhase,
}

impl ReconnectPolicy {
    /// Create a new policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
            last_delay: None,
            phase: RetryPhase::Active,
        }
    }

    /// Compute the delay before the next reconnection attempt.
    ///
    /// Returns `None` once attempts exceed the configured maximum, after
    /// which the policy is terminally [`RetryPhase::Exhausted`] and every
    /// further call keeps returning `None`.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.phase == RetryPhase::Exhausted {
            return None;
        }
        if self.attempt_count > self.config.max_attempts {
            self.phase = RetryPhase::Exhausted;
            return None;
        }

        let delay = if self.attempt_count > 0 {
            Duration::from_secs(1u64.checked_shl(self.attempt_count).unwrap_or(u64::MAX))
        } else {
            self.last_delay.unwrap_or(Duration::from_secs(1))
        };
        let delay = delay.min(self.config.max_delay);

        self.attempt_count += 1;
        self.last_delay = Some(delay);
        Some(delay)
    }

    /// Reset after a successful connection.
    ///
    /// Attempt accounting and the carried-over delay are cleared; an
    /// exhausted policy becomes usable again.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
        self.last_delay = None;
        self.phase = RetryPhase::Active;
    }

    /// Replace the configuration, e.g. from `configure_reconnection`.
    pub const fn reconfigure(&mut self, config: ReconnectConfig) {
        self.config = config;
    }

    /// Whether automatic reconnection is enabled.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether the policy has terminally given up.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.phase == RetryPhase::Exhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32, max_delay_secs: u64) -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig {
            enabled: true,
            max_attempts,
            max_delay: Duration::from_secs(max_delay_secs),
        })
    }

    #[test]
    fn config_clamps() {
        let config = ReconnectConfig::new(true, Some(500), Some(Duration::from_secs(1)));
        assert_eq!(config.max_attempts, 300);
        assert_eq!(config.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn config_defaults_when_unset() {
        let config = ReconnectConfig::new(true, None, None);
        assert_eq!(config.max_attempts, 50);
        assert_eq!(config.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn backoff_sequence() {
        let mut policy = policy(50, 60);
        let delays: Vec<u64> = (0..5)
            .map(|_| policy.next_delay().unwrap().as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn backoff_clamped_at_max_delay() {
        let mut policy = policy(50, 60);
        for _ in 0..7 {
            let _ = policy.next_delay();
        }
        // Attempt 7 computes 128 s, clamped to 60
        assert_eq!(policy.next_delay().unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn carried_over_delay_used_for_fresh_cycle() {
        let mut policy = policy(50, 60);
        let _ = policy.next_delay(); // 1
        let _ = policy.next_delay(); // 2
        let _ = policy.next_delay(); // 4

        // A fresh cycle with attempt_count back at zero but a carried-over
        // delay starts from that delay, not from 1 s.
        policy.attempt_count = 0;
        assert_eq!(policy.next_delay().unwrap(), Duration::from_secs(4));
    }

    #[test]
    fn exhaustion_is_terminal() {
        let mut policy = policy(3, 60);
        // max_attempts = 3 allows counts 0..=3 through, so 4 delays
        for _ in 0..4 {
            assert!(policy.next_delay().is_some());
        }
        assert!(policy.next_delay().is_none());
        assert!(policy.is_exhausted());
        // Terminal: stays None
        assert!(policy.next_delay().is_none());
    }

    #[test]
    fn reset_after_successful_open() {
        let mut policy = policy(3, 60);
        for _ in 0..5 {
            let _ = policy.next_delay();
        }
        assert!(policy.is_exhausted());

        policy.reset();
        assert!(!policy.is_exhausted());
        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay().unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn attempt_count_increments() {
        let mut policy = policy(50, 60);
        assert_eq!(policy.attempt_count(), 0);
        let _ = policy.next_delay();
        assert_eq!(policy.attempt_count(), 1);
        let _ = policy.next_delay();
        assert_eq!(policy.attempt_count(), 2);
    }
}
