use std::future::Future;
use std::time::Duration;

use crate::collaborators::CallResult;
use crate::error::CollaboratorError;

/// Await a collaborator call, giving up after `limit`.
///
/// Expiry is reported as `CollaboratorError::Timeout`, which is retryable.
/// Errors returned by the collaborator itself pass through unchanged.
pub async fn bounded<T, F>(operation: &str, limit: Duration, call: F) -> CallResult<T>
where
    F: Future<Output = CallResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CollaboratorError::Timeout {
            operation: operation.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_passes_through_value() {
        let result = bounded("fast", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_bounded_passes_through_permanent_error() {
        let result: CallResult<()> = bounded("broken", Duration::from_secs(1), async {
            Err(CollaboratorError::permanent("broken", "bad input"))
        })
        .await;
        let err = result.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out_as_transient() {
        let result: CallResult<()> = bounded("slow", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            err,
            CollaboratorError::Timeout {
                operation: "slow".to_string(),
                timeout_ms: 50,
            }
        );
    }
}
