//! # Metadata & Artwork Module
//!
//! Fetches work metadata and cover artwork from the external provider.
//!
//! ## Overview
//!
//! This module handles:
//! - The [`MetadataProvider`] contract and its JSON-over-HTTP implementation
//! - Cover variants, deterministic cover URLs and bucket codes
//! - Concurrent cover download into artwork storage

pub mod artwork;
pub mod error;
pub mod provider;

pub use artwork::{CoverFetcher, CoverOutcome, CoverVariant, DEFAULT_COVERS};
pub use error::{MetadataError, Result};
pub use provider::{HttpMetadataProvider, MetadataProvider};
