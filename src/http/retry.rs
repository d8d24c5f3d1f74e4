//! Retry wrapper for mutations that race with concurrent admin activity.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use log::{debug, warn};

use crate::context::{Cancelled, Context};

/// Substring identifying a concurrent-modification failure.
///
/// The gateway only reports this condition in the error text, so this is a
/// case-sensitive substring match. It depends on upstream wording and breaks
/// if the server ever rephrases the message.
pub const CONCURRENT_MODIFICATION: &str = "ConcurrentModification";

/// Total wall-clock budget for one retry loop.
pub const RETRY_TIMEOUT: Duration = Duration::from_secs(120);

/// Pause between attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Whether an error (or anything in its context chain) reports a concurrent
/// modification.
pub fn is_concurrent_modification(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.to_string().contains(CONCURRENT_MODIFICATION))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: RETRY_TIMEOUT,
            delay: RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Runs `operation` until it succeeds, fails with a non-retryable error, or
    /// the budget runs out.
    ///
    /// Non-retryable errors are returned unchanged. When this policy's own
    /// timeout elapses the last observed error is returned; when the caller's
    /// context expires first a [`Cancelled`] error is returned instead.
    pub async fn run<F, Fut>(&self, ctx: &Context, label: &str, mut operation: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let bounded = ctx.child_with_timeout(self.timeout);
        let caller_fired_first = bounded.deadline() == ctx.deadline();
        let mut last_error: Option<anyhow::Error> = None;
        let mut attempt: usize = 0;

        loop {
            attempt += 1;

            let err = match bounded.run(label, operation()).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) => err,
                Err(cancelled) => {
                    return Err(self.exhausted(label, attempt, cancelled, last_error, caller_fired_first))
                }
            };

            if !is_concurrent_modification(&err) {
                return Err(err);
            }

            debug!(
                "{}: attempt {} hit a concurrent modification ({}), retrying in {:?}...",
                label, attempt, err, self.delay
            );
            last_error = Some(err);

            if let Err(cancelled) = bounded.run(label, tokio::time::sleep(self.delay)).await {
                return Err(self.exhausted(label, attempt, cancelled, last_error, caller_fired_first));
            }
        }
    }

    fn exhausted(
        &self,
        label: &str,
        attempts: usize,
        cancelled: Cancelled,
        last_error: Option<anyhow::Error>,
        caller_fired_first: bool,
    ) -> anyhow::Error {
        if caller_fired_first {
            if let Some(err) = &last_error {
                warn!("{}: cancelled after {} attempt(s), last error: {}", label, attempts, err);
            }
            return anyhow::Error::new(cancelled);
        }

        match last_error {
            Some(err) => {
                warn!(
                    "{}: still failing after {} attempt(s) over {:?}: {}",
                    label, attempts, self.timeout, err
                );
                err
            }
            None => {
                warn!("{}: timed out after {:?}", label, self.timeout);
                anyhow::Error::new(cancelled)
            }
        }
    }
}

/// Retries `operation` on concurrent modification with the default policy.
pub async fn retry_on_concurrent_modification<F, Fut>(
    ctx: &Context,
    label: &str,
    operation: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    RetryPolicy::default().run(ctx, label, operation).await
}
