use std::time::Duration;

use tracing::{error, warn};

use super::{Completion, CompletionInvoker, CompletionRequest};
use crate::errors::InvocationError;

/// Delay between failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * 2^(attempt - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        }
    }
}

/// How many times to try a completion and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    /// Three attempts, 30 seconds apart.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Fixed(Duration::from_secs(30)),
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Call `invoker` until it succeeds or attempts run out.
    ///
    /// Failed attempts contribute no usage. After the last failure the error is
    /// wrapped in [`InvocationError::Exhausted`].
    pub async fn invoke(
        &self,
        invoker: &dyn CompletionInvoker,
        request: &CompletionRequest,
    ) -> Result<Completion, InvocationError> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match invoker.complete(request).await {
                Ok(completion) => return Ok(completion),
                Err(err) if attempt >= max_attempts => {
                    error!(attempts = attempt, error = %err, "completion failed, giving up");
                    return Err(InvocationError::Exhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "completion failed, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
