//! Retry with exponential backoff for gateway calls
//!
//! Every attempt runs under the per-call timeout; an elapsed timeout is
//! reported as [`ErrorKind::Timeout`] and retried like any transient error.

use stackflow_cloud::{ErrorKind, GatewayError, GatewayResult, RetryConfig};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Result of a call together with the number of failed attempts before it
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: GatewayResult<T>,
    pub retries: u32,
}

/// Run one gateway call under `call_timeout`
pub async fn timed<T, Fut>(call_timeout: Option<Duration>, call: Fut) -> GatewayResult<T>
where
    Fut: Future<Output = GatewayResult<T>>,
{
    match call_timeout {
        Some(limit) => match timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::new(
                ErrorKind::Timeout,
                format!("call did not complete within {}s", limit.as_secs_f64()),
            )),
        },
        None => call.await,
    }
}

/// Call `operation` until it succeeds, fails with a non-transient error, or
/// the attempt budget is spent.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    call_timeout: Option<Duration>,
    what: &str,
    mut operation: F,
) -> Attempted<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GatewayResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut retries = 0;

    loop {
        match timed(call_timeout, operation()).await {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    retries,
                };
            }
            Err(err) if err.is_transient() && retries + 1 < max_attempts => {
                let delay = config.delay_for_attempt(retries);
                tracing::debug!(
                    call = what,
                    attempt = retries + 1,
                    max_attempts,
                    kind = %err.kind,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying"
                );
                retries += 1;
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
            Err(err) => {
                return Attempted {
                    result: Err(err),
                    retries,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = &AtomicU32::new(0);
        let attempted = with_retry(&RetryConfig::immediate(5), None, "delete", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(GatewayError::conflict("in use"))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(attempted.result.unwrap(), "done");
        assert_eq!(attempted.retries, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_budget_exhausted() {
        let calls = &AtomicU32::new(0);
        let attempted: Attempted<()> =
            with_retry(&RetryConfig::immediate(3), None, "delete", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::new(ErrorKind::Unknown, "boom"))
            })
            .await;

        assert_eq!(attempted.result.unwrap_err().kind, ErrorKind::Unknown);
        assert_eq!(attempted.retries, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_is_not_retried() {
        let calls = &AtomicU32::new(0);
        let attempted: Attempted<()> =
            with_retry(&RetryConfig::immediate(5), None, "create", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::validation("bad cidr"))
            })
            .await;

        assert_eq!(attempted.result.unwrap_err().kind, ErrorKind::Validation);
        assert_eq!(attempted.retries, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_transient() {
        let calls = &AtomicU32::new(0);
        let attempted = with_retry(
            &RetryConfig::immediate(2),
            Some(Duration::from_secs(1)),
            "describe",
            || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    sleep(Duration::from_secs(10)).await;
                }
                Ok(42)
            },
        )
        .await;

        assert_eq!(attempted.result.unwrap(), 42);
        assert_eq!(attempted.retries, 1);
    }
}
