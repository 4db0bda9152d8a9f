//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, with retrying requests and downloads
//! - `LibraryFileSystem` using `tokio::fs`, with a lazy folder walk built on
//!   `async-stream`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, TokioLibraryFileSystem};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let fs = TokioLibraryFileSystem::new("/var/lib/library/covers");
//!     // Hand both to the core service
//!     Ok(())
//! }
//! ```

mod filesystem;
mod http;

pub use filesystem::{parse_work_id, TokioLibraryFileSystem, AUDIO_EXTENSIONS};
pub use http::ReqwestHttpClient;
