//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::KeelError;

/// Wrap a fallible future with a deadline, mapping expiry to [`KeelError::Timeout`].
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, KeelError>>,
) -> Result<T, KeelError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(KeelError::Timeout(duration.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expiry_maps_to_timeout_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, KeelError>(1)
        };
        let err = with_timeout(Duration::from_millis(20), slow).await.unwrap_err();
        assert!(matches!(err, KeelError::Timeout(20)));
    }

    #[tokio::test]
    async fn inner_result_passes_through() {
        let value = with_timeout(Duration::from_secs(1), async { Ok::<_, KeelError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
