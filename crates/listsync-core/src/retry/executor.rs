//! Retry loop: flush a batch, resend it while the server throttles.

use std::future::Future;
use std::time::Duration;

use super::error::ExecutorError;
use super::policy::{hint_delay, next_delay, RetryPolicy};
use crate::control::CancelToken;
use crate::transport::{FlushOutcome, RequestBatch, Response, Transport};

/// Waits between attempts. Swappable so tests can observe delays without sleeping.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, delay: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await
    }
}

/// Per-call retry bookkeeping.
#[derive(Debug)]
struct RetryState<K> {
    /// Round trips performed so far.
    attempt: u32,
    /// Exponential interval that applies when the server gives no hint.
    backoff: Duration,
    last_hint: Option<Duration>,
    /// Resumable request from the last throttled round trip.
    token: Option<K>,
}

impl<K> RetryState<K> {
    fn new(base_delay: Duration) -> Self {
        Self {
            attempt: 0,
            backoff: base_delay,
            last_hint: None,
            token: None,
        }
    }
}

/// Executes request batches, retrying through throttling.
///
/// Only throttling is retried. Every other failure is returned after the round
/// trip that produced it. A retry resends the transport's token for the
/// throttled request; the batch is never rebuilt.
pub struct RetryingExecutor<T, S = TokioSleeper> {
    transport: T,
    policy: RetryPolicy,
    sleeper: S,
    cancel: CancelToken,
}

impl<T: Transport> RetryingExecutor<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            sleeper: TokioSleeper,
            cancel: CancelToken::new(),
        }
    }
}

impl<T: Transport, S: Sleeper> RetryingExecutor<T, S> {
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> RetryingExecutor<T, S2> {
        RetryingExecutor {
            transport: self.transport,
            policy: self.policy,
            sleeper,
            cancel: self.cancel,
        }
    }

    /// Observe `cancel` at every round trip and backoff wait.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Send `batch`, resending while throttled, up to the retry budget.
    pub async fn execute(&self, batch: &RequestBatch) -> Result<Response, ExecutorError> {
        self.execute_with(batch, &self.cancel).await
    }

    /// Like `execute` but observes `cancel` instead of the executor's own token.
    pub(crate) async fn execute_with(
        &self,
        batch: &RequestBatch,
        cancel: &CancelToken,
    ) -> Result<Response, ExecutorError> {
        let budget = self.policy.max_attempts();
        let mut state = RetryState::new(self.policy.base_delay());

        loop {
            if cancel.is_cancelled() {
                return Err(ExecutorError::Cancelled);
            }
            state.attempt += 1;
            let outcome = match &state.token {
                None => settle_round_trip(cancel, self.transport.flush(batch)).await?,
                Some(token) => settle_round_trip(cancel, self.transport.resend(token)).await?,
            };

            let throttle = match outcome? {
                FlushOutcome::Applied(response) => {
                    tracing::debug!(
                        attempt = state.attempt,
                        operations = batch.len(),
                        "batch applied"
                    );
                    return Ok(response);
                }
                FlushOutcome::Throttled(throttle) => throttle,
            };

            if state.attempt >= budget {
                tracing::warn!(
                    attempts = state.attempt,
                    status = throttle.status,
                    "retry budget exhausted while throttled"
                );
                return Err(ExecutorError::RetryBudgetExhausted {
                    attempts: state.attempt,
                });
            }

            state.backoff = next_delay(state.attempt, None, self.policy.base_delay());
            state.last_hint = throttle.retry_after.as_deref().and_then(hint_delay);
            state.token = Some(throttle.token);
            let delay = state.last_hint.unwrap_or(state.backoff);

            tracing::warn!(
                attempt = state.attempt,
                status = throttle.status,
                delay_ms = millis(delay),
                server_hint = state.last_hint.is_some(),
                "throttled by server; retrying"
            );
            until_cancelled(cancel, self.sleeper.sleep(delay)).await?;
        }
    }
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

/// Run one round trip. A cancel that arrives while the request is in flight
/// does not abandon it: the round trip is awaited to completion and then
/// reported as `Cancelled`, so whatever the caller sends next (a rollback)
/// reaches the server after it.
async fn settle_round_trip<F: Future>(
    cancel: &CancelToken,
    round_trip: F,
) -> Result<F::Output, ExecutorError> {
    tokio::pin!(round_trip);
    tokio::select! {
        biased;
        out = &mut round_trip => return Ok(out),
        _ = cancel.cancelled() => {}
    }
    tracing::debug!("cancelled while a request was in flight; waiting for it to settle");
    let _ = round_trip.await;
    Err(ExecutorError::Cancelled)
}

async fn until_cancelled<F: Future>(
    cancel: &CancelToken,
    fut: F,
) -> Result<F::Output, ExecutorError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExecutorError::Cancelled),
        out = fut => Ok(out),
    }
}
