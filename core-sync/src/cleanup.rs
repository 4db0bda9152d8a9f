//! # Cleanup Reconciler
//!
//! Removes works whose root folder is no longer configured or whose directory
//! is gone from disk. Every removal decision and catalog delete happens inside
//! one exclusive transaction. Cover files are deleted after commit on a
//! best-effort basis: a missing file is fine, any other failure is logged and
//! the orphaned file is left behind.

use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::session::ScanSession;
use bridge_traits::filesystem::LibraryFileSystem;
use core_library::models::{WorkId, WorkLocation};
use core_library::repositories::{WorkRepository, WorkTransaction};
use core_metadata::artwork::CoverVariant;
use core_runtime::config::LibraryConfig;
use core_runtime::events::{CoreEvent, LibraryEvent};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Works removed from the catalog.
    pub removed: Vec<WorkId>,
    /// Works whose cover files could not all be deleted.
    pub artifact_errors: usize,
}

pub struct CleanupReconciler {
    config: Arc<LibraryConfig>,
    works: Arc<dyn WorkRepository>,
    file_system: Arc<dyn LibraryFileSystem>,
    session: Arc<ScanSession>,
}

impl CleanupReconciler {
    pub fn new(
        config: Arc<LibraryConfig>,
        works: Arc<dyn WorkRepository>,
        file_system: Arc<dyn LibraryFileSystem>,
        session: Arc<ScanSession>,
    ) -> Self {
        Self {
            config,
            works,
            file_system,
            session,
        }
    }

    pub fn from_context(ctx: &SyncContext) -> Self {
        Self::new(
            Arc::clone(&ctx.config),
            Arc::clone(&ctx.works),
            Arc::clone(&ctx.file_system),
            Arc::clone(&ctx.session),
        )
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<CleanupReport> {
        let mut tx = self.works.begin_transaction().await?;

        let removed = match self.remove_stale(tx.as_mut()).await {
            Ok(removed) => removed,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Cleanup rollback failed");
                }
                return Err(e);
            }
        };
        tx.commit().await?;

        let mut report = CleanupReport {
            removed,
            artifact_errors: 0,
        };

        for id in &report.removed {
            self.session
                .event_bus()
                .emit(CoreEvent::Library(LibraryEvent::WorkRemoved { id: id.0 }))
                .ok();

            if let Err(e) = self.delete_covers(*id).await {
                self.session.main_error(e.to_string());
                report.artifact_errors += 1;
            }
        }

        info!(
            removed = report.removed.len(),
            artifact_errors = report.artifact_errors,
            "Cleanup finished"
        );
        Ok(report)
    }

    async fn is_stale(&self, location: &WorkLocation) -> Result<bool> {
        match self.config.root_folder(&location.root_folder) {
            None => Ok(true),
            Some(root) => {
                let path = root.path.join(&location.dir);
                Ok(!self.file_system.exists(&path).await?)
            }
        }
    }

    async fn remove_stale(&self, tx: &mut dyn WorkTransaction) -> Result<Vec<WorkId>> {
        let locations = tx.list_locations().await?;
        let mut removed = Vec::new();

        for location in &locations {
            if self.is_stale(location).await? {
                info!(work = %location.id, root = %location.root_folder, dir = %location.dir, "Removing vanished work");
                tx.remove_work(location.id).await?;
                removed.push(location.id);
            }
        }
        Ok(removed)
    }

    async fn delete_covers(&self, id: WorkId) -> Result<()> {
        let code = id.code();
        let mut failures = Vec::new();

        for variant in CoverVariant::ALL {
            match self
                .file_system
                .delete_cover_image(&code, variant.as_str())
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => failures.push(format!("{}: {}", variant, e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(SyncError::CleanupArtifact {
                code,
                message: failures.join("; "),
            })
        }
    }
}
