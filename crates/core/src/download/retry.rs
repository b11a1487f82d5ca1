//! Bounded retry with fixed inter-attempt delay around the fetcher.

use std::time::Duration;

use tracing::{debug, warn};

use crate::claim::{FileRef, OutcomeStatus};

use super::fetcher::{FetchError, Fetcher};

/// Result of a successful attempt sequence.
#[derive(Debug)]
pub struct FetchSuccess {
    pub bytes: Vec<u8>,
    /// Attempts consumed, including the successful one.
    pub attempts: u32,
}

/// A failed attempt sequence, distinguishing exhaustion from fatal stop.
#[derive(Debug)]
pub enum RetryError {
    /// A non-retryable failure ended the sequence immediately.
    Fatal { attempts: u32, error: FetchError },
    /// Retryable failures used up the whole attempt budget.
    Exhausted { attempts: u32, error: FetchError },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempts, .. } | RetryError::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn error(&self) -> &FetchError {
        match self {
            RetryError::Fatal { error, .. } | RetryError::Exhausted { error, .. } => error,
        }
    }

    /// The outcome classification this failure maps to.
    pub fn status(&self) -> OutcomeStatus {
        match self {
            RetryError::Fatal { .. } => OutcomeStatus::FatalFailed,
            RetryError::Exhausted { .. } => OutcomeStatus::TransientFailed,
        }
    }
}

/// Fixed-delay retry policy.
///
/// Upper bound on wall-clock time per file:
/// `max_attempts * (attempt timeout + delay)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempt the fetch up to `max_attempts` times. The delay only applies
    /// between attempts for the current file; unrelated work is not held up.
    pub async fn execute(
        &self,
        fetcher: &dyn Fetcher,
        file: &FileRef,
    ) -> Result<FetchSuccess, RetryError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(
                file_id = %file.file_id,
                attempt,
                max_attempts = self.max_attempts,
                "fetch attempt"
            );

            match fetcher.fetch(file).await {
                Ok(bytes) => {
                    return Ok(FetchSuccess {
                        bytes,
                        attempts: attempt,
                    })
                }
                Err(error) if !error.is_retryable() => {
                    warn!(
                        file_id = %file.file_id,
                        attempt,
                        %error,
                        "fatal fetch failure, not retrying"
                    );
                    return Err(RetryError::Fatal {
                        attempts: attempt,
                        error,
                    });
                }
                Err(error) => {
                    if attempt >= self.max_attempts {
                        warn!(
                            file_id = %file.file_id,
                            attempts = attempt,
                            %error,
                            "attempt budget exhausted"
                        );
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            error,
                        });
                    }
                    warn!(
                        file_id = %file.file_id,
                        attempt,
                        delay_secs = self.delay.as_secs(),
                        %error,
                        "retryable fetch failure, will retry"
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pdf_bytes, test_file_ref, MockFetcher};

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let fetcher = MockFetcher::new();
        let file = test_file_ref("F1", "C1");
        fetcher.push_response(&file.file_id, Ok(pdf_bytes(2048))).await;

        let result = policy(3).execute(&fetcher, &file).await.unwrap();
        assert_eq!(result.attempts, 1);
        assert_eq!(result.bytes.len(), 2048);
    }

    #[tokio::test]
    async fn test_two_retryable_failures_then_success() {
        let fetcher = MockFetcher::new();
        let file = test_file_ref("F1", "C1");
        fetcher
            .push_response(&file.file_id, Err(FetchError::Status(503)))
            .await;
        fetcher
            .push_response(&file.file_id, Err(FetchError::Network("reset".into())))
            .await;
        fetcher.push_response(&file.file_id, Ok(pdf_bytes(2048))).await;

        let result = policy(3).execute(&fetcher, &file).await.unwrap();
        assert_eq!(result.attempts, 3);
        assert_eq!(fetcher.fetch_count().await, 3);
    }

    #[tokio::test]
    async fn test_fatal_stops_after_one_attempt() {
        let fetcher = MockFetcher::new();
        let file = test_file_ref("F1", "C1");
        fetcher.set_default_error(FetchError::Status(404)).await;

        let err = policy(3).execute(&fetcher, &file).await.unwrap_err();
        assert!(matches!(err, RetryError::Fatal { attempts: 1, .. }));
        assert_eq!(err.status(), OutcomeStatus::FatalFailed);
        assert_eq!(fetcher.fetch_count().await, 1);
    }

    #[tokio::test]
    async fn test_exhaustion_is_transient() {
        let fetcher = MockFetcher::new();
        let file = test_file_ref("F1", "C1");
        fetcher
            .set_default_error(FetchError::Timeout(Duration::from_secs(60)))
            .await;

        let err = policy(3).execute(&fetcher, &file).await.unwrap_err();
        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));
        assert_eq!(err.status(), OutcomeStatus::TransientFailed);
        assert_eq!(fetcher.fetch_count().await, 3);
    }

    #[test]
    fn test_max_attempts_minimum_is_one() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts(), 1);
    }
}
