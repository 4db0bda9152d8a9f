//! # Update Orchestrator
//!
//! Refreshes already catalogued works. A refresh is a set of ids, taken from
//! any catalog query, and a per-id mode. Every id goes through the shared
//! [`ConcurrencyLimiter`](crate::limiter::ConcurrencyLimiter) and is tallied
//! as updated or failed.

use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::outcome::ExitStatus;
use core_library::models::{voice_actor_id, UpdateOptions, WorkId, COLLIDING_VOICE_ACTOR_NAMES};
use core_runtime::events::{CoreEvent, LibraryEvent, TaskResult};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// What a refresh rewrites for each work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum UpdateMode {
    /// Re-fetch metadata; refresh dynamic columns and tags.
    #[default]
    Full,
    /// Re-fetch metadata; replace voice actor relations only.
    VoiceActors,
    /// Fetch only sales and rating figures.
    Dynamic,
}

impl UpdateMode {
    pub fn options(&self) -> UpdateOptions {
        match self {
            UpdateMode::Full => UpdateOptions::full(),
            UpdateMode::VoiceActors => UpdateOptions::voice_actors(),
            UpdateMode::Dynamic => UpdateOptions::dynamic_only(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCounts {
    pub updated: u32,
    pub failed: u32,
}

impl UpdateCounts {
    fn record(&mut self, result: TaskResult) {
        if result == TaskResult::Failed {
            self.failed += 1;
        } else {
            self.updated += 1;
        }
    }
}

#[derive(Clone)]
pub struct UpdateOrchestrator {
    ctx: SyncContext,
}

impl UpdateOrchestrator {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    /// Refresh every catalogued work, publish the summary and report the
    /// exit status.
    #[instrument(skip(self))]
    pub async fn run(&self, mode: UpdateMode) -> ExitStatus {
        let ids = match self.ctx.works.list_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                self.ctx
                    .session
                    .main_error(format!("Failed to list catalogued works: {}", e));
                return ExitStatus::Failure;
            }
        };

        let counts = self.refresh(ids, mode).await;
        let message = format!(
            "Update complete: updated {}, failed {}.",
            counts.updated, counts.failed
        );
        self.ctx.session.finish(message);

        if counts.failed > 0 {
            ExitStatus::Failure
        } else {
            ExitStatus::Success
        }
    }

    /// Re-link voice actors of works tied to the known colliding names.
    #[instrument(skip(self))]
    pub async fn fix_voice_actors(&self) -> Result<UpdateCounts> {
        let va_ids: Vec<_> = COLLIDING_VOICE_ACTOR_NAMES
            .iter()
            .map(|name| voice_actor_id(name))
            .collect();
        let ids = self.ctx.works.list_ids_by_voice_actors(&va_ids).await?;
        Ok(self.refresh(ids, UpdateMode::VoiceActors).await)
    }

    /// Refresh `ids`, all dispatched through the shared limiter.
    pub async fn refresh(&self, ids: Vec<WorkId>, mode: UpdateMode) -> UpdateCounts {
        let session = &self.ctx.session;
        session.main_info(format!("{} works in total. Starting refresh.", ids.len()));

        let mut pending: FuturesUnordered<_> = ids
            .into_iter()
            .map(|id| {
                let this = self.clone();
                let submission = self
                    .ctx
                    .limiter
                    .submit(async move { this.update_one(id, mode).await });
                async move { (id, submission.await) }
            })
            .collect();

        let mut counts = UpdateCounts::default();
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
            counts.record(result);
            session.complete_task(&code, result);
        }

        session.main_info(format!(
            "Metadata refresh finished: updated {}, failed {}.",
            counts.updated, counts.failed
        ));
        counts
    }

    async fn update_one(&self, id: WorkId, mode: UpdateMode) -> TaskResult {
        let code = id.code();
        let session = &self.ctx.session;
        session.add_task(&code);

        match self.apply(id, &code, mode).await {
            Ok(()) => {
                session.task_info(&code, "Metadata updated.");
                session
                    .event_bus()
                    .emit(CoreEvent::Library(LibraryEvent::WorkUpdated {
                        id: id.0,
                        fields: mode.options().field_names(),
                    }))
                    .ok();
                TaskResult::Updated
            }
            Err(e) => {
                session.task_error(&code, format!("Failed to update metadata: {}", e));
                TaskResult::Failed
            }
        }
    }

    async fn apply(&self, id: WorkId, code: &str, mode: UpdateMode) -> Result<()> {
        let scrape_error = |e: core_metadata::MetadataError| SyncError::Scrape {
            code: code.to_string(),
            message: e.to_string(),
        };

        match mode {
            UpdateMode::Dynamic => {
                let dynamic = self
                    .ctx
                    .provider
                    .fetch_dynamic_metadata(id)
                    .await
                    .map_err(scrape_error)?;
                self.ctx
                    .session
                    .task_info(code, "Metadata fetched, updating the catalog...");
                self.ctx.works.update_dynamic(id, &dynamic).await?;
            }
            UpdateMode::Full | UpdateMode::VoiceActors => {
                let mut metadata = self
                    .ctx
                    .provider
                    .fetch_metadata(id, self.ctx.config.tag_language)
                    .await
                    .map_err(scrape_error)?;
                metadata.id = id;
                self.ctx
                    .session
                    .task_info(code, "Metadata fetched, updating the catalog...");
                self.ctx.works.update(&metadata, mode.options()).await?;
            }
        }

        info!(work = %id, ?mode, "Work refreshed");
        Ok(())
    }
}
