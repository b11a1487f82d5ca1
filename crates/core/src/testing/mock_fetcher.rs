//! Mock fetcher for testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::claim::FileRef;
use crate::download::{FetchError, Fetcher};

use super::pdf_bytes;

/// Mock implementation of the [`Fetcher`] trait.
///
/// Provides controllable behavior for testing:
/// - Script per-file response sequences (consumed in order)
/// - Set a default response for unscripted files
/// - Record every fetch for assertions
/// - Optionally delay each fetch to simulate slow transfers
pub struct MockFetcher {
    /// Scripted responses per file id, consumed front to back.
    responses: Mutex<HashMap<String, VecDeque<Result<Vec<u8>, FetchError>>>>,
    /// Fallback once a file's script is exhausted.
    default_response: Mutex<Result<Vec<u8>, FetchError>>,
    /// File ids in fetch order.
    fetched: Mutex<Vec<String>>,
    /// Artificial per-fetch delay.
    delay: Mutex<Option<Duration>>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            default_response: Mutex::new(Ok(pdf_bytes(2048))),
            fetched: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
        }
    }

    /// Queue one response for the given file id.
    pub async fn push_response(&self, file_id: &str, response: Result<Vec<u8>, FetchError>) {
        self.responses
            .lock()
            .await
            .entry(file_id.to_string())
            .or_default()
            .push_back(response);
    }

    /// Every unscripted fetch succeeds with these bytes.
    pub async fn set_default_bytes(&self, bytes: Vec<u8>) {
        *self.default_response.lock().await = Ok(bytes);
    }

    /// Every unscripted fetch fails with this error.
    pub async fn set_default_error(&self, error: FetchError) {
        *self.default_response.lock().await = Err(error);
    }

    /// Delay each fetch, to keep a cycle in flight during scheduler tests.
    pub async fn set_fetch_delay(&self, delay: Duration) {
        *self.delay.lock().await = Some(delay);
    }

    /// File ids fetched so far, in order.
    pub async fn fetched_files(&self) -> Vec<String> {
        self.fetched.lock().await.clone()
    }

    pub async fn fetch_count(&self) -> usize {
        self.fetched.lock().await.len()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, file: &FileRef) -> Result<Vec<u8>, FetchError> {
        self.fetched.lock().await.push(file.file_id.clone());

        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .responses
            .lock()
            .await
            .get_mut(&file.file_id)
            .and_then(|queue| queue.pop_front());

        match scripted {
            Some(response) => response,
            None => self.default_response.lock().await.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_file_ref;

    #[tokio::test]
    async fn test_scripted_responses_consumed_in_order() {
        let fetcher = MockFetcher::new();
        let file = test_file_ref("F1", "C1");

        fetcher
            .push_response("F1", Err(FetchError::Status(500)))
            .await;
        fetcher.push_response("F1", Ok(vec![1, 2, 3])).await;

        assert!(fetcher.fetch(&file).await.is_err());
        assert_eq!(fetcher.fetch(&file).await.unwrap(), vec![1, 2, 3]);
        // Script exhausted: default kicks in.
        assert!(fetcher.fetch(&file).await.is_ok());
        assert_eq!(fetcher.fetch_count().await, 3);
    }

    #[tokio::test]
    async fn test_default_error() {
        let fetcher = MockFetcher::new();
        fetcher.set_default_error(FetchError::Status(404)).await;

        let file = test_file_ref("F9", "C1");
        let err = fetcher.fetch(&file).await.unwrap_err();
        assert!(matches!(err, FetchError::Status(404)));
    }
}
