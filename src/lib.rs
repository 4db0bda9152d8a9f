//! Library scanner.
//!
//! Catalogs work folders found under configured library roots, enriching
//! them with provider metadata and cover artwork. The `library-scanner`
//! binary drives [`core_service`]; hosts embedding the scanner depend on this
//! crate instead of wiring the workspace crates themselves.

pub use core_service::*;
