use std::time::Duration;

use super::error::ConfigurationError;

/// Compute the wait before the next attempt.
///
/// `attempt` is 1-based (1 = the attempt that was just throttled). A server
/// hint that parses as a positive integer is used verbatim, in milliseconds.
/// Otherwise the delay is `base_delay * 2^(attempt-1)`, saturating instead of
/// overflowing.
pub fn next_delay(attempt: u32, server_hint: Option<&str>, base_delay: Duration) -> Duration {
    if let Some(hint) = server_hint.and_then(hint_delay) {
        return hint;
    }
    match 1u32.checked_shl(attempt.saturating_sub(1)) {
        Some(factor) => base_delay.saturating_mul(factor),
        None => Duration::MAX,
    }
}

/// Parse a server hint: a positive integer number of milliseconds.
pub(crate) fn hint_delay(raw: &str) -> Option<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => None,
    }
}

/// Retry budget and base delay for throttled requests.
///
/// Both values are strictly positive; the only way to build one is through
/// [`RetryPolicy::new`], so an executor never sees an invalid policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Result<Self, ConfigurationError> {
        if max_attempts == 0 {
            return Err(ConfigurationError::ZeroAttempts);
        }
        if base_delay.is_zero() {
            return Err(ConfigurationError::ZeroBaseDelay);
        }
        Ok(Self {
            max_attempts,
            base_delay,
        })
    }

    /// Maximum number of round trips (including the first).
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Wait before the attempt following `attempt`, honoring a server hint.
    pub fn delay_for(&self, attempt: u32, server_hint: Option<&str>) -> Duration {
        next_delay(attempt, server_hint, self.base_delay)
    }
}
