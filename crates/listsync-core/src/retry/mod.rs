//! Throttling-aware retry.
//!
//! This module holds the backoff policy, the status classification shared by
//! transports, and the executor that resends a throttled batch until it is
//! applied or the retry budget runs out.

mod classify;
mod error;
mod executor;
mod policy;

pub use classify::{classify_http_status, ErrorKind};
pub use error::{ConfigurationError, ExecutorError};
pub use executor::{RetryingExecutor, Sleeper, TokioSleeper};
pub use policy::{next_delay, RetryPolicy};
