//! Metadata provider
//!
//! The engine only needs two lookups: the full work record, used for
//! ingestion and full refreshes, and the dynamic sales/rating figures, used by
//! the lightweight refresh.
//!
//! ## API Endpoints
//!
//! [`HttpMetadataProvider`] talks to a JSON service rooted at
//! `metadata_api_url`:
//!
//! - **Work**: `GET {base}/works/RJ{code}?lang={tag_language}` → [`WorkMetadata`]
//! - **Dynamic**: `GET {base}/works/RJ{code}/dynamic` → [`DynamicMetadata`]
//!
//! A 404 is reported as [`MetadataError::NotFound`].

use crate::error::{MetadataError, Result};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use core_library::models::{DynamicMetadata, WorkId, WorkMetadata};
use core_runtime::config::TagLanguage;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Timeout for API requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Fetch the full record of a work, with tag names in `language`.
    async fn fetch_metadata(&self, id: WorkId, language: TagLanguage) -> Result<WorkMetadata>;

    /// Fetch only the sales and rating figures of a work.
    async fn fetch_dynamic_metadata(&self, id: WorkId) -> Result<DynamicMetadata>;
}

pub struct HttpMetadataProvider {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    retry_policy: RetryPolicy,
}

impl HttpMetadataProvider {
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn work_url(&self, id: WorkId) -> String {
        format!("{}/works/{}", self.base_url, id)
    }

    async fn get(&self, id: WorkId, url: String) -> Result<HttpResponse> {
        debug!(work = %id, url = %url, "Requesting work metadata");

        let request = HttpRequest::get(url)
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT);

        let response = self
            .http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await
            .map_err(|e| MetadataError::NetworkError(format!("{} request failed: {}", id, e)))?;

        if response.status == 404 {
            return Err(MetadataError::NotFound(id.to_string()));
        }
        if !response.is_success() {
            return Err(MetadataError::HttpError {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl MetadataProvider for HttpMetadataProvider {
    async fn fetch_metadata(&self, id: WorkId, language: TagLanguage) -> Result<WorkMetadata> {
        let url = format!("{}?lang={}", self.work_url(id), language.as_str());
        let response = self.get(id, url).await?;

        let metadata: WorkMetadata = response
            .json()
            .map_err(|e| MetadataError::InvalidMetadata(format!("{}: {}", id, e)))?;

        if metadata.id != id {
            return Err(MetadataError::InvalidMetadata(format!(
                "requested {} but provider returned {}",
                id, metadata.id
            )));
        }
        Ok(metadata)
    }

    async fn fetch_dynamic_metadata(&self, id: WorkId) -> Result<DynamicMetadata> {
        let url = format!("{}/dynamic", self.work_url(id));
        let response = self.get(id, url).await?;

        response
            .json()
            .map_err(|e| MetadataError::InvalidMetadata(format!("{}: {}", id, e)))
    }
}
