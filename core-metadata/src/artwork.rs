//! Cover Artwork - URL construction, download and storage
//!
//! Covers are published by the provider under a deterministic URL derived
//! from the work code and its bucket code (see [`WorkId::bucket`]). Two URL
//! families exist:
//!
//! - **modpub**: `{base}/modpub/images2/work/doujin/RJ{bucket}/RJ{code}_img_{variant}.jpg`
//! - **resize** (square thumbnails): `{base}/resize/images2/work/doujin/RJ{bucket}/RJ{code}_img_main_{variant}.jpg`
//!
//! ## Usage
//!
//! ```ignore
//! use core_metadata::artwork::{CoverFetcher, DEFAULT_COVERS};
//!
//! let fetcher = CoverFetcher::new(http_client, file_system, "https://img.dlsite.jp");
//! let missing = fetcher.missing_variants(id, DEFAULT_COVERS).await?;
//! for outcome in fetcher.fetch_covers(id, &missing).await {
//!     // log outcome.variant / outcome.result
//! }
//! ```

use crate::error::{MetadataError, Result};
use bridge_traits::filesystem::LibraryFileSystem;
use bridge_traits::http::{HttpClient, RetryPolicy};
use core_library::models::WorkId;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Published cover image variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoverVariant {
    #[serde(rename = "main")]
    Main,
    #[serde(rename = "sam")]
    Sam,
    #[serde(rename = "sam@2x")]
    Sam2x,
    #[serde(rename = "sam@3x")]
    Sam3x,
    #[serde(rename = "240x240")]
    Square240,
    #[serde(rename = "360x360")]
    Square360,
}

/// Variants every catalogued work is expected to have on disk.
pub const DEFAULT_COVERS: &[CoverVariant] =
    &[CoverVariant::Main, CoverVariant::Sam, CoverVariant::Square240];

impl CoverVariant {
    pub const ALL: [CoverVariant; 6] = [
        CoverVariant::Main,
        CoverVariant::Sam,
        CoverVariant::Sam2x,
        CoverVariant::Sam3x,
        CoverVariant::Square240,
        CoverVariant::Square360,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CoverVariant::Main => "main",
            CoverVariant::Sam => "sam",
            CoverVariant::Sam2x => "sam@2x",
            CoverVariant::Sam3x => "sam@3x",
            CoverVariant::Square240 => "240x240",
            CoverVariant::Square360 => "360x360",
        }
    }

    /// Square thumbnails are served from the resize endpoint.
    pub fn is_resized(&self) -> bool {
        matches!(self, CoverVariant::Square240 | CoverVariant::Square360)
    }
}

impl fmt::Display for CoverVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoverVariant {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self> {
        CoverVariant::ALL
            .into_iter()
            .find(|variant| variant.as_str() == s)
            .ok_or_else(|| MetadataError::InvalidMetadata(format!("unknown cover variant: {}", s)))
    }
}

/// Stored file name of a cover variant.
pub fn cover_file_name(id: WorkId, variant: CoverVariant) -> String {
    format!("{}_img_{}.jpg", id, variant)
}

/// Provider URL of a cover variant.
pub fn cover_url(base_url: &str, id: WorkId, variant: CoverVariant) -> String {
    let base = base_url.trim_end_matches('/');
    let bucket = id.bucket();
    if variant.is_resized() {
        format!(
            "{}/resize/images2/work/doujin/{}/{}_img_main_{}.jpg",
            base, bucket, id, variant
        )
    } else {
        format!(
            "{}/modpub/images2/work/doujin/{}/{}_img_{}.jpg",
            base, bucket, id, variant
        )
    }
}

/// Result of downloading one variant.
#[derive(Debug)]
pub struct CoverOutcome {
    pub variant: CoverVariant,
    pub result: Result<()>,
}

impl CoverOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Downloads covers and streams them into artwork storage.
pub struct CoverFetcher {
    http_client: Arc<dyn HttpClient>,
    file_system: Arc<dyn LibraryFileSystem>,
    base_url: String,
    retry_policy: RetryPolicy,
}

impl CoverFetcher {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        file_system: Arc<dyn LibraryFileSystem>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            file_system,
            base_url: base_url.into(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Variants from `wanted` that are not yet stored, in order.
    pub async fn missing_variants(
        &self,
        id: WorkId,
        wanted: &[CoverVariant],
    ) -> Result<Vec<CoverVariant>> {
        let code = id.code();
        let mut missing = Vec::new();
        for variant in wanted {
            if !self
                .file_system
                .cover_image_exists(&code, variant.as_str())
                .await?
            {
                missing.push(*variant);
            }
        }
        Ok(missing)
    }

    /// Download all `variants` concurrently.
    ///
    /// One outcome is returned per variant, in input order. Variants that
    /// were saved stay on disk even when a sibling fails.
    pub async fn fetch_covers(&self, id: WorkId, variants: &[CoverVariant]) -> Vec<CoverOutcome> {
        let downloads = variants.iter().map(|variant| async move {
            CoverOutcome {
                variant: *variant,
                result: self.fetch_cover(id, *variant).await,
            }
        });
        join_all(downloads).await
    }

    async fn fetch_cover(&self, id: WorkId, variant: CoverVariant) -> Result<()> {
        let url = cover_url(&self.base_url, id, variant);
        let code = id.code();
        debug!(work = %id, variant = %variant, url = %url, "Downloading cover");

        let artwork_error = |message: String| MetadataError::ArtworkError {
            code: code.clone(),
            variant: variant.to_string(),
            message,
        };

        let stream = self
            .http_client
            .download_stream_with_retry(url, self.retry_policy.clone())
            .await
            .map_err(|e| artwork_error(e.to_string()))?;

        self.file_system
            .save_cover_image(stream, &code, variant.as_str())
            .await
            .map_err(|e| {
                warn!(work = %id, variant = %variant, error = %e, "Failed to store cover");
                artwork_error(e.to_string())
            })
    }
}

/// Whether every outcome succeeded.
pub fn all_succeeded(outcomes: &[CoverOutcome]) -> bool {
    outcomes.iter().all(CoverOutcome::is_ok)
}
