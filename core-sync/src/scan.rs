//! # Scan Orchestrator
//!
//! Top-level control loop of a scan.
//!
//! ## Workflow
//!
//! 1. Ensure the artwork storage root exists
//! 2. Ensure the default administrator account exists
//! 3. Run the voice actor repair if the update lock asks for it
//! 4. Remove vanished works (unless `skip_cleanup`)
//! 5. Discover work folders under every root
//! 6. Deduplicate, counting discarded folders as skipped
//! 7. Ingest every canonical folder through the shared limiter
//! 8. Publish the summary
//!
//! Steps 1, 2, 4 and 5 are fatal: a failure is logged to the main log and the
//! run ends with [`ExitStatus::Failure`]. Item-level failures only show up in
//! the counts. A failed repair lets the scan finish but still fails the run.
//!
//! The catalog schema is applied when the connection pool is created, before
//! an orchestrator exists.

use crate::cleanup::CleanupReconciler;
use crate::context::SyncContext;
use crate::dedup::{deduplicate, Deduplicated};
use crate::error::{Result, SyncError};
use crate::ingest::MetadataIngestor;
use crate::outcome::ExitStatus;
use crate::update::UpdateOrchestrator;
use bridge_traits::filesystem::DiscoveryItem;
use core_library::models::{FolderDescriptor, NewUser, WorkId};
use core_runtime::events::{ScanCounts, TaskResult};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Summary line published with `SCAN_FINISHED`.
pub fn summary_message(counts: &ScanCounts) -> String {
    if counts.updated > 0 {
        format!(
            "Scan complete: updated {}, added {}, skipped {}, failed {}.",
            counts.updated, counts.added, counts.skipped, counts.failed
        )
    } else {
        format!(
            "Scan complete: added {}, skipped {}, failed {}.",
            counts.added, counts.skipped, counts.failed
        )
    }
}

pub struct ScanOrchestrator {
    ctx: SyncContext,
    ingestor: Arc<MetadataIngestor>,
    cleanup: CleanupReconciler,
    updater: UpdateOrchestrator,
}

impl ScanOrchestrator {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            ingestor: Arc::new(MetadataIngestor::from_context(&ctx)),
            cleanup: CleanupReconciler::from_context(&ctx),
            updater: UpdateOrchestrator::new(ctx.clone()),
            ctx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&self) -> ExitStatus {
        let session = &self.ctx.session;

        if let Err(e) = self.prepare().await {
            error!(error = %e, "Scan setup failed");
            session.main_error(e.to_string());
            return ExitStatus::Failure;
        }

        let repair_ok = self.repair_voice_actors().await;

        if self.ctx.config.skip_cleanup {
            session.main_info("Skipping cleanup as configured.");
        } else {
            session.main_info("Removing data and covers of works no longer on disk...");
            match self.cleanup.run().await {
                Ok(report) => session.main_info(format!(
                    "Cleanup complete, {} works removed. Starting scan...",
                    report.removed.len()
                )),
                Err(e) => {
                    session.main_error(format!("Cleanup failed: {}", e));
                    return ExitStatus::Failure;
                }
            }
        }

        let folders = match self.discover().await {
            Ok(folders) => folders,
            Err(e) => {
                session.main_error(e.to_string());
                return ExitStatus::Failure;
            }
        };
        session.main_info(format!("Found {} work folders.", folders.len()));

        let deduplicated = deduplicate(folders);
        self.report_duplicates(&deduplicated);

        self.ingest_all(deduplicated.canonical).await;

        let counts = session.counts();
        session.finish(summary_message(&counts));

        if repair_ok {
            ExitStatus::Success
        } else {
            ExitStatus::Failure
        }
    }

    async fn prepare(&self) -> Result<()> {
        let cover_dir = &self.ctx.config.cover_folder_dir;
        self.ctx
            .file_system
            .create_dir_all(cover_dir)
            .await
            .map_err(|e| {
                SyncError::Setup(format!(
                    "Failed to create cover folder \"{}\": {}",
                    cover_dir.display(),
                    e
                ))
            })?;

        match self.ctx.users.create_user(&NewUser::default_admin()).await {
            Ok(()) => info!("Created default administrator account"),
            Err(e) if e.is_already_exists() => {}
            Err(e) => {
                return Err(SyncError::Setup(format!(
                    "Failed to create the admin account: {}",
                    e
                )))
            }
        }
        Ok(())
    }

    /// Returns false if a requested repair did not complete.
    async fn repair_voice_actors(&self) -> bool {
        let session = &self.ctx.session;
        let lock = &self.ctx.update_lock;

        let requested = match lock.read().await {
            Ok(flags) => flags.fix_va,
            Err(e) => {
                session.main_error(format!(
                    "Failed to read update lock \"{}\": {}",
                    lock.path().display(),
                    e
                ));
                return false;
            }
        };
        if !requested {
            return true;
        }

        session.main_info("Starting voice actor repair, network access required.");
        match self.updater.fix_voice_actors().await {
            Ok(counts) if counts.failed == 0 => {
                if let Err(e) = lock.clear_fix_va().await {
                    session.main_error(format!("Failed to clear update lock: {}", e));
                    return false;
                }
                session.main_info("Voice actor repair complete.");
                true
            }
            Ok(counts) => {
                session.main_error(format!(
                    "Voice actor repair incomplete, {} works failed.",
                    counts.failed
                ));
                false
            }
            Err(e) => {
                session.main_error(format!("Voice actor repair failed: {}", e));
                false
            }
        }
    }

    async fn discover(&self) -> Result<Vec<FolderDescriptor>> {
        let session = &self.ctx.session;
        let depth = self.ctx.config.scanner_max_recursion_depth;
        let mut folders = Vec::new();

        for root in &self.ctx.config.root_folders {
            let mut items = self.ctx.file_system.list_folders(root, depth);
            while let Some(item) = items.next().await {
                match item {
                    Ok(DiscoveryItem::Folder(folder)) => folders.push(folder),
                    Ok(DiscoveryItem::Unreadable { path, reason }) => {
                        session.main_error(format!(
                            "Failed to read \"{}\": {}",
                            path.display(),
                            reason
                        ));
                    }
                    Err(e) => {
                        return Err(SyncError::Discovery {
                            root: root.name.clone(),
                            message: e.to_string(),
                        })
                    }
                }
            }
        }
        Ok(folders)
    }

    fn report_duplicates(&self, deduplicated: &Deduplicated) {
        let session = &self.ctx.session;
        let count = deduplicated.duplicate_count();
        if count == 0 {
            return;
        }

        session.main_info(format!("Found {} duplicate work folders.", count));
        for (id, discarded) in &deduplicated.duplicates {
            session.main_info(format!("[{}] has multiple folders:", WorkId(*id)));
            let kept = deduplicated.canonical_for(*id);
            // The kept folder is listed last.
            for folder in discarded.iter().chain(kept) {
                session.main_info(format!("\"{}\"", self.display_path(folder)));
            }
        }
        session.record_many(TaskResult::Skipped, count as u32);
    }

    fn display_path(&self, folder: &FolderDescriptor) -> String {
        match self.ctx.config.root_folder(&folder.root_folder_name) {
            Some(root) => root.path.join(&folder.relative_path).display().to_string(),
            None => folder.relative_path.display().to_string(),
        }
    }

    async fn ingest_all(&self, folders: Vec<FolderDescriptor>) {
        let session = &self.ctx.session;

        let mut pending: FuturesUnordered<_> = folders
            .into_iter()
            .map(|folder| {
                let id = WorkId(folder.work_id);
                let ingestor = Arc::clone(&self.ingestor);
                let submission = self
                    .ctx
                    .limiter
                    .submit(async move { ingestor.process(&folder).await });
                async move { (id, submission.await) }
            })
            .collect();

        while let Some((id, outcome)) = pending.next().await {
            let code = id.code();
            let result = match outcome {
                Ok(result) => result,
                Err(e) => {
                    session.add_task(&code);
                    session.task_error(&code, e.to_string());
                    TaskResult::Failed
                }
            };
            session.complete_task(&code, result);
        }
    }
}
