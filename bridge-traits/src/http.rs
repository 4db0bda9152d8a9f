//! HTTP Client Abstraction
//!
//! The engine only reads from the network: JSON metadata lookups and cover
//! image downloads. Both are plain GETs, retried on transient failures.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Boxed byte stream handed out by [`HttpClient::download_stream`].
pub type DownloadStream = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// Whether a response status is worth another attempt.
pub fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 429
}

/// GET request description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// HTTP response
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Parse response body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON deserialization failed: {}", e))
        })
    }

    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Whether to use exponential backoff
    pub use_exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that gives up after the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if !self.use_exponential_backoff {
            return self.base_delay;
        }
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Async HTTP client trait
///
/// Implementations should handle:
/// - TLS certificate validation
/// - Connection pooling and keep-alive
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest};
///
/// async fn fetch_work(client: &dyn HttpClient) -> Result<serde_json::Value> {
///     let response = client.execute(HttpRequest::get("https://api.example.com/works/RJ000123")).await?;
///     response.json()
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute a GET request and buffer the response body.
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Execute a GET request with a custom retry policy
    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let _ = policy;
        self.execute(request).await
    }

    /// Open a GET request as a stream of bytes.
    ///
    /// Non-2xx responses are reported as [`BridgeError::HttpStatus`].
    async fn download_stream(&self, url: String) -> Result<DownloadStream>;

    /// Open a streaming GET, retrying transient failures until the body
    /// starts flowing or the policy is exhausted.
    async fn download_stream_with_retry(
        &self,
        url: String,
        policy: RetryPolicy,
    ) -> Result<DownloadStream> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.download_stream(url.clone()).await {
                Ok(stream) => return Ok(stream),
                Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                    tracing::warn!(error = %e, attempt, url = %url, "Download failed, retrying");
                    tokio::time::sleep(policy.delay_after(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
