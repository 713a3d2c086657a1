//! Retrying a unit of work after losing an optimistic-concurrency race.

use std::future::Future;

use crate::error::DomainError;

/// Default number of attempts before a conflict is surfaced to the caller.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Errors that can tell a lost commit race from a real failure.
pub trait Retryable {
    fn is_conflict(&self) -> bool;
}

impl Retryable for DomainError {
    fn is_conflict(&self) -> bool {
        DomainError::is_conflict(self)
    }
}

/// Runs `operation` until it succeeds, fails with a non-conflict error, or
/// `max_attempts` attempts have been made.
///
/// Every attempt must reload the state it decides on; the attempt number
/// (starting at 1) is passed in for logging. After the last attempt the
/// conflict error itself is returned.
pub async fn retry_on_conflict<T, E, F, Fut>(max_attempts: u32, mut operation: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Err(error) if error.is_conflict() => {
                metrics::counter!("commit_conflicts_total").increment(1);
                if attempt >= max_attempts {
                    tracing::warn!(attempt, %error, "giving up after repeated commit conflicts");
                    return Err(error);
                }
                tracing::debug!(attempt, %error, "commit conflict, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Conflict,
        Fatal,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for TestError {
        fn is_conflict(&self) -> bool {
            matches!(self, TestError::Conflict)
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_on_conflict(5, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(TestError::Conflict)
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_on_conflict(4, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Conflict) }
        })
        .await;

        assert_eq!(result, Err(TestError::Conflict));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_on_conflict(5, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TestError::Fatal) }
        })
        .await;

        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let result = retry_on_conflict(0, |_| async { Ok::<_, TestError>(7) }).await;
        assert_eq!(result, Ok(7));
    }
}
