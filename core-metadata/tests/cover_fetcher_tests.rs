//! Integration tests for CoverFetcher against real artwork storage
//!
//! These tests verify:
//! - Missing-variant detection on disk
//! - Concurrent download of several variants
//! - Partial failure leaves successfully saved variants in place

use async_trait::async_trait;
use bridge_desktop::TokioLibraryFileSystem;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{DownloadStream, HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use core_library::models::WorkId;
use core_metadata::artwork::{all_succeeded, CoverFetcher, CoverVariant, DEFAULT_COVERS};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Serves image bytes for every URL except those containing `fail_marker`.
struct ImageServer {
    fail_marker: Option<&'static str>,
    urls: Mutex<Vec<String>>,
}

impl ImageServer {
    fn new(fail_marker: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            fail_marker,
            urls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl HttpClient for ImageServer {
    async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
        Err(BridgeError::NotAvailable("execute".to_string()))
    }

    async fn download_stream(&self, url: String) -> BridgeResult<DownloadStream> {
        self.urls.lock().unwrap().push(url.clone());
        if let Some(marker) = self.fail_marker {
            if url.ends_with(marker) {
                return Err(BridgeError::HttpStatus { status: 404, url });
            }
        }
        Ok(Box::new(std::io::Cursor::new(b"\xFF\xD8jpeg".to_vec())))
    }
}

fn fetcher(server: Arc<ImageServer>, dir: &TempDir) -> (CoverFetcher, Arc<TokioLibraryFileSystem>) {
    let fs = Arc::new(TokioLibraryFileSystem::new(dir.path()));
    let fetcher = CoverFetcher::new(server, fs.clone(), "https://img.example.com")
        .with_retry_policy(RetryPolicy::no_retry());
    (fetcher, fs)
}

#[tokio::test]
async fn test_fetch_default_covers() {
    let dir = TempDir::new().unwrap();
    let server = ImageServer::new(None);
    let (fetcher, fs) = fetcher(server.clone(), &dir);
    let id = WorkId(123);

    let missing = fetcher.missing_variants(id, DEFAULT_COVERS).await.unwrap();
    assert_eq!(missing, DEFAULT_COVERS.to_vec());

    let outcomes = fetcher.fetch_covers(id, &missing).await;
    assert!(all_succeeded(&outcomes));
    assert_eq!(server.urls.lock().unwrap().len(), 3);

    for variant in DEFAULT_COVERS {
        assert!(fs.cover_path("000123", variant.as_str()).exists());
    }
    assert!(fetcher
        .missing_variants(id, DEFAULT_COVERS)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_only_missing_variant_is_reported() {
    let dir = TempDir::new().unwrap();
    let (fetcher, fs) = fetcher(ImageServer::new(None), &dir);
    let id = WorkId(123);

    for variant in ["main", "240x240"] {
        std::fs::write(fs.cover_path("000123", variant), b"jpeg").unwrap();
    }

    let missing = fetcher.missing_variants(id, DEFAULT_COVERS).await.unwrap();
    assert_eq!(missing, vec![CoverVariant::Sam]);
}

#[tokio::test]
async fn test_partial_failure_keeps_saved_variants() {
    let dir = TempDir::new().unwrap();
    let (fetcher, fs) = fetcher(ImageServer::new(Some("_img_sam.jpg")), &dir);
    let id = WorkId(123);

    let outcomes = fetcher.fetch_covers(id, DEFAULT_COVERS).await;

    assert!(!all_succeeded(&outcomes));
    let failed: Vec<_> = outcomes
        .iter()
        .filter(|outcome| !outcome.is_ok())
        .map(|outcome| outcome.variant)
        .collect();
    assert_eq!(failed, vec![CoverVariant::Sam]);

    assert!(fs.cover_path("000123", "main").exists());
    assert!(fs.cover_path("000123", "240x240").exists());
    assert!(!fs.cover_path("000123", "sam").exists());
}
