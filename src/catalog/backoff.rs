//! Exponential backoff schedule for retryable fetch failures.
//!
//! [`BackoffPolicy`] is a pure description of the schedule: the delay for
//! attempt `i` is `base_delay * 2^i`, optionally capped at `max_delay`, and
//! the loop gives up after `max_attempts` retryable outcomes.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use harvester_core::catalog::BackoffPolicy;
//!
//! let policy = BackoffPolicy::uncapped();
//! assert_eq!(policy.next_delay(0), Duration::from_secs(2));
//! assert_eq!(policy.next_delay(3), Duration::from_secs(16));
//! assert_eq!(policy.max_attempts(), 10);
//! ```

use std::time::Duration;

/// Default number of retryable attempts before an ID is given up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default delay before the first retry (2 seconds).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Default ceiling on a single backoff sleep (5 minutes).
///
/// With the default base the uncapped schedule would reach 1024s on the
/// tenth attempt.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);

/// Backoff schedule and attempt budget.
///
/// # Default Values
///
/// - `max_attempts`: 10
/// - `base_delay`: 2 seconds
/// - `max_delay`: 300 seconds
///
/// # Delay Calculation
///
/// ```text
/// delay(i) = min(base_delay * 2^i, max_delay)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Retryable outcomes tolerated for one ID.
    max_attempts: u32,

    /// Delay before the first retry.
    base_delay: Duration,

    /// Ceiling on any single delay; `None` leaves growth unbounded.
    max_delay: Option<Duration>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: Some(DEFAULT_MAX_DELAY),
        }
    }
}

impl BackoffPolicy {
    /// Creates a policy with custom settings.
    ///
    /// `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Option<Duration>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Default attempt budget and base delay with no ceiling on growth.
    #[must_use]
    pub fn uncapped() -> Self {
        Self {
            max_delay: None,
            ..Self::default()
        }
    }

    /// Returns the attempt budget.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay before the first retry.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Returns the delay ceiling, if any.
    #[must_use]
    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Delay to sleep after the retryable attempt with index `attempt_index` (0-based).
    ///
    /// Saturates at `Duration::MAX` instead of overflowing when uncapped.
    #[must_use]
    pub fn next_delay(&self, attempt_index: u32) -> Duration {
        let raw = 2u32
            .checked_pow(attempt_index)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX);

        match self.max_delay {
            Some(cap) => raw.min(cap),
            None => raw,
        }
    }
}
