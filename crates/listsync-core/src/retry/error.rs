//! Error types for retry configuration and the retrying executor.

use crate::transport::TransportError;

/// Invalid retry settings. Raised when the policy is built, before any request is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("retry budget must be greater than zero")]
    ZeroAttempts,
    #[error("base retry delay must be greater than zero")]
    ZeroBaseDelay,
}

/// Failure of one executor call.
///
/// Throttling is not listed here: it is the `Throttled` branch of a flush and
/// only becomes an error once the budget runs out.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Every attempt in the budget was throttled.
    #[error("maximum retry attempts ({attempts}) reached while throttled")]
    RetryBudgetExhausted { attempts: u32 },
    /// Non-throttling failure; returned as soon as it happens.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    /// The cancel token fired during a round trip or a backoff wait.
    #[error("request cancelled")]
    Cancelled,
}
