//! Core service façade and bootstrap helpers.
//!
//! This crate wires the host bridges (HTTP, library filesystem) and the
//! catalog database into the sync engine. Desktop hosts call [`bootstrap`]
//! with a validated [`LibraryConfig`]; tests and embedders can assemble a
//! [`CoreDependencies`] bundle themselves and use [`CoreService::new`].
//!
//! A service owns one [`ConcurrencyLimiter`], shared by every scan and update
//! it runs. Each run gets a fresh [`ScanSession`] on the service's event bus,
//! so counts and history never carry over from one run to the next.

pub mod error;

pub use error::{CoreError, Result};

pub use core_runtime::config::LibraryConfig;
pub use core_runtime::events::{ControlMessage, CoreEvent};
pub use core_sync::{ControlOutcome, ExitStatus, UpdateMode};

use std::sync::{Arc, RwLock};

use bridge_desktop::{ReqwestHttpClient, TokioLibraryFileSystem};
use bridge_traits::{filesystem::LibraryFileSystem, http::HttpClient};
use core_library::{create_pool, DatabaseConfig, SqliteUserRepository, SqliteWorkRepository};
use core_metadata::{CoverFetcher, HttpMetadataProvider};
use core_runtime::events::EventBus;
use core_runtime::update_lock::UpdateLock;
use core_sync::{
    ConcurrencyLimiter, ScanOrchestrator, ScanSession, SyncContext, UpdateOrchestrator,
};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tracing::info;

/// Events buffered per subscriber before the slowest one starts lagging.
pub const EVENT_BUS_CAPACITY: usize = 1024;

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub file_system: Arc<dyn LibraryFileSystem>,
    pub pool: SqlitePool,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        file_system: Arc<dyn LibraryFileSystem>,
        pool: SqlitePool,
    ) -> Self {
        Self {
            http_client,
            file_system,
            pool,
        }
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    ctx: SyncContext,
    bus: EventBus,
    current: Arc<RwLock<Arc<ScanSession>>>,
}

impl CoreService {
    /// Create a new service from the provided dependencies.
    pub fn new(config: LibraryConfig, deps: CoreDependencies) -> Self {
        let config = Arc::new(config);
        let retry_policy = config.retry_policy();
        let bus = EventBus::new(EVENT_BUS_CAPACITY);

        let provider = HttpMetadataProvider::new(
            Arc::clone(&deps.http_client),
            config.metadata_api_url.clone(),
        )
        .with_retry_policy(retry_policy.clone());
        let covers = CoverFetcher::new(
            Arc::clone(&deps.http_client),
            Arc::clone(&deps.file_system),
            config.cover_base_url.clone(),
        )
        .with_retry_policy(retry_policy);

        let session = Arc::new(ScanSession::new(bus.clone()));
        let ctx = SyncContext {
            works: Arc::new(SqliteWorkRepository::new(deps.pool.clone())),
            users: Arc::new(SqliteUserRepository::new(deps.pool)),
            provider: Arc::new(provider),
            covers: Arc::new(covers),
            file_system: deps.file_system,
            session: Arc::clone(&session),
            limiter: ConcurrencyLimiter::new(config.max_parallelism),
            update_lock: UpdateLock::new(config.update_lock_path.clone()),
            config,
        };

        Self {
            ctx,
            bus,
            current: Arc::new(RwLock::new(session)),
        }
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.ctx.config
    }

    /// Session of the current run, or of the last one to finish.
    pub fn session(&self) -> Arc<ScanSession> {
        let current = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&current)
    }

    /// Context for a new run with its own session.
    fn begin_run(&self) -> SyncContext {
        let session = Arc::new(ScanSession::new(self.bus.clone()));
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::clone(&session);
        SyncContext {
            session,
            ..self.ctx.clone()
        }
    }

    /// Subscribe to progress and catalog events.
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.bus.subscribe()
    }

    /// Run a full scan: repair, cleanup, discovery and ingestion.
    pub async fn scan(&self) -> ExitStatus {
        ScanOrchestrator::new(self.begin_run()).run().await
    }

    /// Refresh every catalogued work.
    pub async fn update(&self, mode: UpdateMode) -> ExitStatus {
        UpdateOrchestrator::new(self.begin_run()).run(mode).await
    }

    /// Answer a request from the supervising controller.
    pub fn handle_control(&self, message: ControlMessage) -> ControlOutcome {
        self.session().handle_control(message)
    }
}

/// Build a desktop service: open the catalog, create the HTTP client and the
/// library filesystem.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// use core_service::{bootstrap, LibraryConfig};
///
/// let config = LibraryConfig::from_json_file("config.json")?;
/// let core = bootstrap(config).await?;
/// let status = core.scan().await;
/// println!("scan finished with {}", status);
/// # Ok(())
/// # }
/// ```
pub async fn bootstrap(config: LibraryConfig) -> Result<CoreService> {
    config.validate()?;

    let pool = create_pool(DatabaseConfig::new(config.database_path.clone())).await?;
    let http_client = ReqwestHttpClient::new()
        .map_err(|err| CoreError::InitializationFailed(err.to_string()))?
        .with_retry_policy(config.retry_policy());
    let file_system = TokioLibraryFileSystem::new(config.cover_folder_dir.clone());

    info!(
        roots = config.root_folders.len(),
        max_parallelism = config.max_parallelism,
        database = %config.database_path.display(),
        "Core service ready"
    );

    Ok(CoreService::new(
        config,
        CoreDependencies::new(Arc::new(http_client), Arc::new(file_system), pool),
    ))
}
