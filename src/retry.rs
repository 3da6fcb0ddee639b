use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Bounded exponential backoff. Items are processed one at a time, so the
/// schedule is deterministic (no jitter).
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first one.
    pub max_attempts: u32,
    pub initial_wait_secs: u64,
    pub max_wait_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_wait_secs: 1,
            max_wait_secs: 60,
        }
    }
}

impl RetryConfig {
    /// Compute the wait after a failed attempt (0-indexed).
    ///
    /// Formula: `min(initial_wait * 2^attempt, max_wait)`
    pub fn delay_for_retry(&self, attempt: u32) -> Duration {
        let exp_delay = self
            .initial_wait_secs
            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        Duration::from_secs(exp_delay.min(self.max_wait_secs))
    }
}

/// Why a retried operation ultimately did not produce a value.
#[derive(Debug)]
pub enum RetryFailure<E> {
    /// The classifier rejected the error; no further attempts were made.
    Aborted(E),
    /// Every attempt failed with a retryable error.
    Exhausted { attempts: u32, last: E },
    /// Shutdown was requested before or between attempts.
    Cancelled,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryFailure<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryFailure::Aborted(e) => write!(f, "aborted: {e}"),
            RetryFailure::Exhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
            RetryFailure::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// - `config`: retry configuration
/// - `cancel`: checked before each attempt and raced against each backoff sleep
/// - `label`: identifies the operation in log lines
/// - `classifier`: inspects an error and returns `Retry` or `Abort`
/// - `operation`: the async closure to retry, given the attempt number
///
/// Returns the first `Ok` result, or a [`RetryFailure`] describing why the
/// attempt sequence ended.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    label: &str,
    classifier: C,
    mut operation: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = config.max_attempts.max(1);

    for attempt in 0..total_attempts {
        if cancel.is_cancelled() {
            return Err(RetryFailure::Cancelled);
        }
        let err = match operation(attempt).await {
            Ok(val) => return Ok(val),
            Err(e) => e,
        };
        if classifier(&err) == RetryAction::Abort {
            tracing::error!(item = label, "Non-retryable error, aborting: {}", err);
            return Err(RetryFailure::Aborted(err));
        }
        if attempt + 1 >= total_attempts {
            tracing::error!(
                item = label,
                "Max retries reached ({} attempts), skipping: {}",
                total_attempts,
                err
            );
            return Err(RetryFailure::Exhausted {
                attempts: total_attempts,
                last: err,
            });
        }
        let delay = config.delay_for_retry(attempt);
        tracing::warn!(
            item = label,
            "Retryable error (attempt {}/{}), retrying in {}s: {}",
            attempt + 1,
            total_attempts,
            delay.as_secs(),
            err
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(RetryFailure::Cancelled),
        }
    }

    // total_attempts >= 1, so the loop always returns.
    Err(RetryFailure::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn instant_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_wait_secs: 0,
            max_wait_secs: 0,
        }
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_wait_secs, 1);
        assert_eq!(config.max_wait_secs, 60);
    }

    #[test]
    fn test_backoff_schedule() {
        let config = RetryConfig::default();
        let waits: Vec<u64> = (0..6).map(|n| config.delay_for_retry(n).as_secs()).collect();
        assert_eq!(waits, vec![1, 2, 4, 8, 16, 32]);
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_retry(6).as_secs(), 60);
        assert_eq!(config.delay_for_retry(10).as_secs(), 60);
        // Shift overflow must saturate rather than panic.
        assert_eq!(config.delay_for_retry(200).as_secs(), 60);
    }

    #[test]
    fn test_delay_zero_base() {
        let config = instant_config(3);
        assert_eq!(config.delay_for_retry(0).as_secs(), 0);
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let token = CancellationToken::new();
        let result: Result<i32, RetryFailure<String>> = retry_with_backoff(
            &instant_config(3),
            &token,
            "x",
            |_| RetryAction::Retry,
            |_| async { Ok(42) },
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_abort_on_non_retryable() {
        let token = CancellationToken::new();
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();
        let result: Result<i32, RetryFailure<String>> = retry_with_backoff(
            &instant_config(3),
            &token,
            "x",
            |_| RetryAction::Abort,
            |_| {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err("fatal".to_string())
                }
            },
        )
        .await;
        assert!(matches!(result, Err(RetryFailure::Aborted(ref e)) if e == "fatal"));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let token = CancellationToken::new();
        let result: Result<u32, RetryFailure<String>> = retry_with_backoff(
            &instant_config(5),
            &token,
            "x",
            |_| RetryAction::Retry,
            |attempt| async move {
                if attempt < 2 {
                    Err("transient".to_string())
                } else {
                    Ok(attempt)
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_retry_exhausted_after_five_attempts() {
        let token = CancellationToken::new();
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();
        let result: Result<i32, RetryFailure<String>> = retry_with_backoff(
            &instant_config(5),
            &token,
            "x",
            |_| RetryAction::Retry,
            |_| {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err("still failing".to_string())
                }
            },
        )
        .await;
        match result {
            Err(RetryFailure::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 5);
                assert_eq!(last, "still failing");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        // A sixth attempt is never made.
        assert_eq!(call_count.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_all_attempts() {
        let token = CancellationToken::new();
        token.cancel();
        let result: Result<i32, RetryFailure<String>> = retry_with_backoff(
            &instant_config(5),
            &token,
            "x",
            |_| RetryAction::Retry,
            |_| async { Ok(1) },
        )
        .await;
        assert!(matches!(result, Err(RetryFailure::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff_sleep() {
        let token = CancellationToken::new();
        let config = RetryConfig {
            max_attempts: 5,
            initial_wait_secs: 3600,
            max_wait_secs: 3600,
        };
        let canceller = token.clone();
        let result: Result<i32, RetryFailure<String>> = retry_with_backoff(
            &config,
            &token,
            "x",
            |_| RetryAction::Retry,
            |_| {
                canceller.cancel();
                async { Err("boom".to_string()) }
            },
        )
        .await;
        assert!(matches!(result, Err(RetryFailure::Cancelled)));
    }
}
