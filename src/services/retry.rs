use std::future::Future;

use crate::core::metrics;
use crate::services::error::ReviewError;

/// Re-runs `op` while it loses write races. Exhausting `attempts` yields
/// `Transient`; any other error is returned on first sight.
pub(crate) async fn retry_on_conflict<T, F, Fut>(
    attempts: u32,
    operation: &'static str,
    mut op: F,
) -> Result<T, ReviewError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ReviewError>>,
{
    let attempts = attempts.max(1);
    for attempt in 1..=attempts {
        match op().await {
            Err(ReviewError::StorageConflict) => {
                metrics::storage_conflict();
                tracing::warn!(operation, attempt, attempts, "Storage conflict, retrying");
            }
            result => return result,
        }
    }

    tracing::error!(operation, attempts, "Storage conflict retries exhausted");
    Err(ReviewError::Transient { attempts })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::retry_on_conflict;
    use crate::services::error::ReviewError;

    #[tokio::test]
    async fn succeeds_after_transient_conflicts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_on_conflict(3, "test", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ReviewError::StorageConflict)
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.expect("value"), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn reports_transient_when_exhausted() {
        let result: Result<(), ReviewError> =
            retry_on_conflict(2, "test", || async { Err(ReviewError::StorageConflict) }).await;

        assert!(matches!(result, Err(ReviewError::Transient { attempts: 2 })));
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), ReviewError> = retry_on_conflict(5, "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(ReviewError::UserNotFound)
        })
        .await;

        assert!(matches!(result, Err(ReviewError::UserNotFound)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
