//! HTTP fetcher: one download attempt against the file-serving API.

use async_trait::async_trait;
use reqwest::{header, redirect, Client};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::claim::FileRef;
use crate::config::DownloadConfig;

/// Error from a single fetch attempt, tagged by failure class.
///
/// Retry policy lives with the caller; classification lives here.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The attempt exceeded the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, DNS, or transfer failure.
    #[error("network error: {0}")]
    Network(String),

    /// TLS/certificate failure. Fatal unless verification is disabled, in
    /// which case reqwest never surfaces it.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP status {0}")]
    Status(u16),
}

impl FetchError {
    /// Whether the caller's retry policy may re-attempt after this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Network(_) => true,
            FetchError::Tls(_) => false,
            FetchError::Status(code) => *code == 429 || (500..600).contains(code),
        }
    }
}

/// A single download attempt. Implementations perform no retry themselves.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, file: &FileRef) -> Result<Vec<u8>, FetchError>;
}

/// Fetcher backed by a shared reqwest client.
pub struct HttpFetcher {
    client: Client,
    base_url: String,
    app_id: String,
    api_key: String,
    user_agent: String,
    timeout: Duration,
}

impl HttpFetcher {
    /// Build the client once with the configured timeout, redirect and TLS
    /// policy.
    pub fn new(config: &DownloadConfig) -> Result<Self, FetchError> {
        let redirect_policy = if config.follow_redirects {
            redirect::Policy::limited(10)
        } else {
            redirect::Policy::none()
        };

        let client = Client::builder()
            .timeout(config.timeout())
            .redirect(redirect_policy)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            api_key: config.api_key.clone(),
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
        })
    }

    fn url_for(&self, file: &FileRef) -> String {
        format!("{}{}", self.base_url, file.url_path())
    }

    fn classify(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else if is_tls_error(&e) {
            FetchError::Tls(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, file: &FileRef) -> Result<Vec<u8>, FetchError> {
        let url = self.url_for(file);
        debug!(file_id = %file.file_id, %url, "fetching");

        let response = self
            .client
            .get(&url)
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::ACCEPT, "application/pdf")
            .header("X-App-Id", &self.app_id)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        Ok(bytes.to_vec())
    }
}

/// reqwest does not expose a dedicated TLS error kind; certificate failures
/// appear in the error chain text.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}
