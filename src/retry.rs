//! Bounded retry with linear back-off around every remote call.

use std::time::Duration;

use tracing::{debug, warn};

use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::token::TokenManager;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub(crate) fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Total number of attempts, the first one included.
    pub(crate) fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait before the attempt following `attempt` (zero-based): `delay * (attempt + 1)`.
    pub(crate) fn backoff(&self, attempt: u32) -> Duration {
        self.delay.saturating_mul(attempt.saturating_add(1))
    }

    /// Runs `op` until it succeeds or attempts run out.
    ///
    /// Each attempt first secures a bearer token and hands it to `op`. A 401
    /// drops that token, if still cached, so the next attempt re-authenticates.
    /// Not-found, cancellation and deadline errors end the loop at once;
    /// every other failure is retried.
    pub(crate) fn run<T, F>(&self, ctx: &CallContext, tokens: &TokenManager, mut op: F) -> Result<T>
    where
        F: FnMut(Option<&str>) -> Result<T>,
    {
        let attempts = self.attempts();
        let mut attempt = 0u32;
        loop {
            ctx.check()?;
            debug!(attempt = attempt + 1, attempts, "sending request");

            let (used, outcome) = match tokens.ensure_valid_token(ctx) {
                Ok(token) => {
                    let outcome = op(token.as_deref());
                    (token, outcome)
                }
                Err(err) => (None, Err(err)),
            };
            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let has_next = attempt + 1 < attempts;
            let mut wait = self.backoff(attempt);
            match &err {
                Error::NotFound { .. }
                | Error::Cancelled
                | Error::DeadlineExceeded
                | Error::Config(_)
                | Error::RetriesExhausted { .. } => return Err(err),
                Error::Authentication { status: 401, .. } => {
                    match used.as_deref() {
                        Some(used) if has_next => tokens.invalidate(used),
                        _ => {}
                    }
                }
                Error::RateLimited { retry_after } => {
                    wait = wait.max(Duration::from_secs(*retry_after));
                }
                Error::Authentication { .. }
                | Error::Status { .. }
                | Error::EmptyResponse { .. }
                | Error::Transport(_)
                | Error::Parse(_)
                | Error::Io(_) => {}
            }

            if !has_next {
                return Err(Error::RetriesExhausted {
                    attempts,
                    source: Box::new(err),
                });
            }

            warn!(
                attempt = attempt + 1,
                attempts,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "request failed, retrying"
            );
            ctx.sleep(wait)?;
            attempt += 1;
        }
    }
}
