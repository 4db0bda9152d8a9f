//! # Library Sync Engine
//!
//! Keeps the work catalog in step with the configured root folders.
//!
//! ## Overview
//!
//! A scan prepares storage, reconciles vanished works, discovers work
//! folders, collapses duplicates, and ingests each folder's metadata and
//! covers under a shared concurrency budget. Progress is pushed to the
//! supervising controller as full snapshots on every change.
//!
//! ## Components
//!
//! - **Concurrency Limiter** (`limiter`): FIFO-queued, bounded execution of async calls
//! - **Scan Session** (`session`): Task, result and log sequences plus event emission
//! - **Deduplicator** (`dedup`): One canonical folder per work id
//! - **Metadata Ingestor** (`ingest`): Per-folder fetch, subtitle detection, insert and covers
//! - **Cleanup Reconciler** (`cleanup`): Transactional removal of vanished works
//! - **Scan Orchestrator** (`scan`): The full scan control loop
//! - **Update Orchestrator** (`update`): Refresh of catalogued works and the voice actor repair

pub mod cleanup;
pub mod context;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod limiter;
pub mod outcome;
pub mod scan;
pub mod session;
pub mod update;

pub use cleanup::{CleanupReconciler, CleanupReport};
pub use context::SyncContext;
pub use dedup::{deduplicate, Deduplicated};
pub use error::{Result, SyncError};
pub use ingest::MetadataIngestor;
pub use limiter::ConcurrencyLimiter;
pub use outcome::ExitStatus;
pub use scan::{summary_message, ScanOrchestrator};
pub use session::{ControlOutcome, ScanSession};
pub use update::{UpdateCounts, UpdateMode, UpdateOrchestrator};
