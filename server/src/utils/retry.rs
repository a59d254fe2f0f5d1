//! Async retry utilities with exponential backoff and per-attempt timeouts

use std::future::Future;
use std::time::Duration;

/// Default maximum attempts for traversal queries
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay in milliseconds for exponential backoff
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Default per-attempt timeout in seconds
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 60;

/// Retry an async operation with exponential backoff.
///
/// Errors for which `should_retry` returns false end the loop immediately.
/// Returns `Ok((value, attempts))` on success, or `Err((error, attempts))` on failure.
pub async fn retry_with_backoff_async<F, Fut, T, E, R>(
    max_attempts: u32,
    base_delay_ms: u64,
    should_retry: R,
    mut operation: F,
) -> Result<(T, u32), (E, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => return Ok((value, attempts)),
            Err(e) => {
                if attempts >= max_attempts || !should_retry(&e) {
                    return Err((e, attempts));
                }
                let delay = Duration::from_millis(
                    base_delay_ms.saturating_mul(2_u64.saturating_pow(attempts - 1)),
                );
                tracing::warn!(
                    error = %e,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Bounded retry with an optional timeout around every attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            attempt_timeout: Some(Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS)),
        }
    }
}

impl RetryPolicy {
    /// Run `operation` under this policy.
    ///
    /// An attempt that exceeds the timeout is dropped and counts as a failure
    /// carrying `on_timeout(limit)`.
    pub async fn run<F, Fut, T, E, R>(
        &self,
        mut operation: F,
        on_timeout: impl Fn(Duration) -> E,
        should_retry: R,
    ) -> Result<(T, u32), (E, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        R: Fn(&E) -> bool,
    {
        let attempt_timeout = self.attempt_timeout;
        let on_timeout = &on_timeout;
        retry_with_backoff_async(
            self.max_attempts.max(1),
            self.base_delay_ms,
            should_retry,
            || {
                let attempt = operation();
                async move {
                    match attempt_timeout {
                        Some(limit) => match tokio::time::timeout(limit, attempt).await {
                            Ok(result) => result,
                            Err(_) => Err(on_timeout(limit)),
                        },
                        None => attempt.await,
                    }
                }
            },
        )
        .await
    }
}
