//! # Metadata Ingestor
//!
//! Per-folder pipeline. The catalog decides the branch:
//!
//! - **Unknown id**: fetch metadata, list tracks, detect subtitles, insert the
//!   work, then download the default cover set.
//! - **Known id, covers missing**: download only the missing variants.
//! - **Known id, covers present**: nothing to do, the item is skipped.
//!
//! A cover failure after a successful insert reports the item as failed. The
//! catalog row stays, so the next scan only retries the missing covers.

use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::session::ScanSession;
use bridge_traits::filesystem::LibraryFileSystem;
use core_library::models::{FolderDescriptor, WorkId, WorkLocation, WorkMetadata};
use core_library::repositories::{NewWork, WorkRepository};
use core_metadata::artwork::{cover_file_name, CoverFetcher, CoverVariant, DEFAULT_COVERS};
use core_metadata::MetadataProvider;
use core_runtime::config::LibraryConfig;
use core_runtime::events::{CoreEvent, LibraryEvent, TaskResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Subtitle files sit next to the track with this extension.
pub const SUBTITLE_EXTENSION: &str = "lrc";

pub struct MetadataIngestor {
    config: Arc<LibraryConfig>,
    works: Arc<dyn WorkRepository>,
    provider: Arc<dyn MetadataProvider>,
    covers: Arc<CoverFetcher>,
    file_system: Arc<dyn LibraryFileSystem>,
    session: Arc<ScanSession>,
}

impl MetadataIngestor {
    pub fn new(
        config: Arc<LibraryConfig>,
        works: Arc<dyn WorkRepository>,
        provider: Arc<dyn MetadataProvider>,
        covers: Arc<CoverFetcher>,
        file_system: Arc<dyn LibraryFileSystem>,
        session: Arc<ScanSession>,
    ) -> Self {
        Self {
            config,
            works,
            provider,
            covers,
            file_system,
            session,
        }
    }

    pub fn from_context(ctx: &SyncContext) -> Self {
        Self::new(
            Arc::clone(&ctx.config),
            Arc::clone(&ctx.works),
            Arc::clone(&ctx.provider),
            Arc::clone(&ctx.covers),
            Arc::clone(&ctx.file_system),
            Arc::clone(&ctx.session),
        )
    }

    /// Run the pipeline for one folder and report its outcome.
    ///
    /// Never fails: item-level errors are logged to the task and reported as
    /// [`TaskResult::Failed`].
    #[instrument(skip(self), fields(work = folder.work_id))]
    pub async fn process(&self, folder: &FolderDescriptor) -> TaskResult {
        let id = WorkId(folder.work_id);
        let code = id.code();

        match self.works.exists(id).await {
            Ok(true) => self.refresh_covers(id, &code).await,
            Ok(false) => {
                self.session.add_task(&code);
                match self.ingest_new(id, &code, folder).await {
                    Ok(result) => result,
                    Err(e) => {
                        self.session.task_error(&code, e.to_string());
                        TaskResult::Failed
                    }
                }
            }
            Err(e) => {
                self.session.add_task(&code);
                self.session
                    .task_error(&code, format!("Failed to query the catalog: {}", e));
                TaskResult::Failed
            }
        }
    }

    async fn refresh_covers(&self, id: WorkId, code: &str) -> TaskResult {
        let missing = match self.covers.missing_variants(id, DEFAULT_COVERS).await {
            Ok(missing) => missing,
            Err(e) => {
                self.session.add_task(code);
                self.session
                    .task_error(code, format!("Failed to check cover images: {}", e));
                return TaskResult::Failed;
            }
        };

        if missing.is_empty() {
            debug!(work = %id, "Already catalogued with all covers");
            return TaskResult::Skipped;
        }

        self.session.add_task(code);
        self.session
            .task_info(code, "Cover images missing, downloading them again...");
        match self.download_covers(id, code, &missing).await {
            Ok(()) => TaskResult::Added,
            Err(_) => TaskResult::Failed,
        }
    }

    async fn ingest_new(
        &self,
        id: WorkId,
        code: &str,
        folder: &FolderDescriptor,
    ) -> Result<TaskResult> {
        let absolute_path = self.resolve_path(folder)?;
        self.session
            .task_info(code, format!("Found new folder: \"{}\"", absolute_path.display()));

        self.session.task_info(code, "Fetching metadata...");
        let mut metadata = self
            .provider
            .fetch_metadata(id, self.config.tag_language)
            .await
            .map_err(|e| SyncError::Scrape {
                code: code.to_string(),
                message: format!("Failed to fetch metadata: {}", e),
            })?;

        if self.has_subtitles(code, &absolute_path).await? {
            metadata.mark_subtitled();
        }

        self.session
            .task_info(code, "Metadata fetched, adding it to the catalog...");
        self.persist(id, code, metadata, folder).await?;
        self.session.task_info(code, "Metadata added to the catalog.");
        self.session
            .event_bus()
            .emit(CoreEvent::Library(LibraryEvent::WorkAdded { id: id.0 }))
            .ok();

        match self.download_covers(id, code, DEFAULT_COVERS).await {
            Ok(()) => Ok(TaskResult::Added),
            Err(_) => Ok(TaskResult::Failed),
        }
    }

    fn resolve_path(&self, folder: &FolderDescriptor) -> Result<PathBuf> {
        let root = self
            .config
            .root_folder(&folder.root_folder_name)
            .ok_or_else(|| SyncError::Discovery {
                root: folder.root_folder_name.clone(),
                message: "root folder is not configured".to_string(),
            })?;
        Ok(root.path.join(&folder.relative_path))
    }

    /// Whether any track has a sibling subtitle file.
    async fn has_subtitles(&self, code: &str, work_path: &Path) -> Result<bool> {
        let tracks = self
            .file_system
            .list_tracks(code, work_path)
            .await
            .map_err(|e| SyncError::Scrape {
                code: code.to_string(),
                message: format!("Failed to list tracks: {}", e),
            })?;

        for track in &tracks {
            let subtitle = work_path
                .join(track.relative_path())
                .with_extension(SUBTITLE_EXTENSION);
            if self.file_system.exists(&subtitle).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn persist(
        &self,
        id: WorkId,
        code: &str,
        metadata: WorkMetadata,
        folder: &FolderDescriptor,
    ) -> Result<()> {
        let work = NewWork {
            metadata,
            location: WorkLocation::from_descriptor(folder),
        };
        self.works
            .insert(&work)
            .await
            .map_err(|e| SyncError::Persist {
                code: code.to_string(),
                message: format!("Failed to add {} to the catalog: {}", id, e),
            })
    }

    /// Download `variants` concurrently, logging each outcome to the task.
    async fn download_covers(
        &self,
        id: WorkId,
        code: &str,
        variants: &[CoverVariant],
    ) -> Result<()> {
        self.session.task_info(code, "Downloading cover images...");
        let outcomes = self.covers.fetch_covers(id, variants).await;

        let mut failed = Vec::new();
        for outcome in &outcomes {
            let file = cover_file_name(id, outcome.variant);
            match &outcome.result {
                Ok(()) => self
                    .session
                    .task_info(code, format!("Cover {} downloaded.", file)),
                Err(e) => {
                    self.session
                        .task_error(code, format!("Failed to download cover {}: {}", file, e));
                    failed.push(outcome.variant.as_str());
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Artwork {
                code: code.to_string(),
                message: format!("variants failed: {}", failed.join(", ")),
            })
        }
    }
}
