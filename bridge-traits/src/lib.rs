//! # Host Bridge Traits
//!
//! Collaborator contracts the library sync engine depends on.
//!
//! ## Overview
//!
//! The engine never talks to the network or the disk directly. It goes through
//! the traits defined here, which the desktop host implements in
//! `bridge-desktop` and tests replace with in-memory doubles.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP with retry and streaming downloads
//! - [`LibraryFileSystem`](filesystem::LibraryFileSystem) - Folder discovery, track
//!   listing and cover artwork storage
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should keep the underlying `std::io::Error` when one exists so callers can
//! tell a missing file apart from other failures.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single implementation can be
//! shared across every ingestion task.
//!
//! ## Examples
//!
//! ```ignore
//! use bridge_traits::http::{DownloadStream, HttpClient, HttpRequest, HttpResponse};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//!
//! pub struct MyHttpClient {
//!     client: reqwest::Client,
//! }
//!
//! #[async_trait]
//! impl HttpClient for MyHttpClient {
//!     async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
//!         todo!()
//!     }
//!
//!     async fn download_stream(&self, url: String) -> Result<DownloadStream> {
//!         todo!()
//!     }
//! }
//! ```

pub mod error;
pub mod filesystem;
pub mod http;

pub use error::BridgeError;

pub use filesystem::{DiscoveryItem, FolderDescriptor, LibraryFileSystem, RootFolder, TrackEntry};
pub use http::{DownloadStream, HttpClient, HttpRequest, HttpResponse, RetryPolicy};
