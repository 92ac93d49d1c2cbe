//! Bounded retry with exponential backoff for external service calls

use musicren_common::config::RetryConfig;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

/// Errors that may succeed when the same request is repeated
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Retry an operation with exponential backoff until `max_attempts` is reached.
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. If the error is transient and attempts remain: log WARN, back off, retry
/// 4. Otherwise return the error (non-transient errors are never retried)
///
/// **Backoff Strategy:**
/// - Initial delay: `base_delay_ms`
/// - Max delay: `max_delay_ms`
/// - Multiplier: 2 (exponential)
pub async fn with_backoff<F, Fut, T, E>(
    operation_name: &str,
    policy: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    let start_time = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff_ms = policy.base_delay_ms;
    let mut attempt = 0;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying request");
        }

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis(),
                        "Request succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_transient() {
                    return Err(err);
                }

                if attempt >= max_attempts {
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis(),
                        error = %err,
                        "Request failed: retries exhausted"
                    );
                    return Err(err);
                }

                let delay_ms = backoff_ms.min(policy.max_delay_ms);

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = delay_ms,
                    error = %err,
                    "Transient failure, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                backoff_ms = backoff_ms.saturating_mul(2).min(policy.max_delay_ms);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Timeout,
        NotFound,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Timeout)
        }
    }

    fn fast_policy() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 4,
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let result = with_backoff("test_op", &fast_policy(), || async {
            Ok::<i32, TestError>(42)
        })
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_errors() {
        let attempts = AtomicU32::new(0);

        let result = with_backoff("test_op", &fast_policy(), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(TestError::Timeout)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);

        let result = with_backoff("test_op", &fast_policy(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, TestError>(TestError::Timeout) }
        })
        .await;

        assert!(matches!(result, Err(TestError::Timeout)));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_error_fails_immediately() {
        let attempts = AtomicU32::new(0);

        let result = with_backoff("test_op", &fast_policy(), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, TestError>(TestError::NotFound) }
        })
        .await;

        assert!(matches!(result, Err(TestError::NotFound)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
