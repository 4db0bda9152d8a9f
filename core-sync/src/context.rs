//! Shared collaborators of the sync engine.

use crate::limiter::ConcurrencyLimiter;
use crate::session::ScanSession;
use bridge_traits::filesystem::LibraryFileSystem;
use core_library::repositories::{UserRepository, WorkRepository};
use core_metadata::{CoverFetcher, MetadataProvider};
use core_runtime::config::LibraryConfig;
use core_runtime::update_lock::UpdateLock;
use std::sync::Arc;

/// Everything the orchestrators need, cheap to clone.
///
/// One context, and therefore one [`ConcurrencyLimiter`], is shared by the
/// scan and update flows of a process.
#[derive(Clone)]
pub struct SyncContext {
    pub config: Arc<LibraryConfig>,
    pub works: Arc<dyn WorkRepository>,
    pub users: Arc<dyn UserRepository>,
    pub provider: Arc<dyn MetadataProvider>,
    pub covers: Arc<CoverFetcher>,
    pub file_system: Arc<dyn LibraryFileSystem>,
    pub session: Arc<ScanSession>,
    pub limiter: ConcurrencyLimiter,
    pub update_lock: UpdateLock,
}
