use std::future::Future;
use std::time::Duration;

use crate::{Result, RpcError};

/// Deadline applied to an outbound call when none is configured.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(2000);

/// Runs an RPC future under a deadline.
///
/// An elapsed deadline becomes [`RpcError::Timeout`] for `service`.
pub async fn with_timeout<T, F>(service: &'static str, timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(service, timeout_ms = timeout.as_millis() as u64, "RPC call timed out");
            Err(RpcError::Timeout {
                service,
                after_ms: timeout.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let result = with_timeout("user", Duration::from_millis(500), async { Ok(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let result: Result<()> = with_timeout("food", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            err,
            RpcError::Timeout {
                service: "food",
                after_ms: 10
            }
        );
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let result: Result<()> = with_timeout("cart", Duration::from_millis(500), async {
            Err(RpcError::unavailable("cart"))
        })
        .await;
        assert!(matches!(result, Err(RpcError::Unavailable { .. })));
    }
}
