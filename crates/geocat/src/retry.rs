//! Bounded exponential backoff for transient transport failures.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{Error, TransportError};

/// How often, and how patiently, to retry a call that failed with a
/// connection or timeout error.
///
/// Only [`TransportError::is_transient`] failures are retried. Anything else,
/// including every HTTP status, is returned on the first attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Policy for token endpoint calls: 3 attempts, 2s doubling, 10s cap.
    pub fn token_endpoint() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(10))
    }

    /// Policy for API calls: 5 attempts, 2s doubling, 10s cap.
    pub fn requests() -> Self {
        Self::new(5, Duration::from_secs(2), Duration::from_secs(10))
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    pub(crate) async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(Error::Transport(err)) if err.is_transient() => {
                    if attempt >= self.max_attempts {
                        return Err(TransportError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        }
                        .into());
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::requests()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn connection_error() -> Error {
        TransportError::Connection {
            message: "refused".into(),
        }
        .into()
    }

    #[test]
    fn delays_double_up_to_cap() {
        let policy = RetryPolicy::token_endpoint();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
        assert_eq!(policy.delay_for(40), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_cap() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), Error> = RetryPolicy::token_endpoint()
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(connection_error())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::RetriesExhausted { attempts: 3, .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = RetryPolicy::requests()
            .run("test", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(connection_error())
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), Error> = RetryPolicy::requests()
            .run("test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(crate::error::HttpError::new("GET", "u", 500, "").into())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
