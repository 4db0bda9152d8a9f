//! Shared fixtures for sync engine integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::TokioLibraryFileSystem;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::filesystem::{DiscoveryItem, LibraryFileSystem, RootFolder, TrackEntry};
use bridge_traits::http::{DownloadStream, HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use core_library::models::{
    Circle, DynamicMetadata, Tag, VoiceActor, WorkId, WorkMetadata,
};
use core_library::repositories::{SqliteUserRepository, SqliteWorkRepository};
use core_library::{create_test_pool, NewWork};
use core_metadata::{CoverFetcher, MetadataProvider};
use core_runtime::config::{LibraryConfig, TagLanguage};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, ScanEvent};
use core_runtime::update_lock::UpdateLock;
use core_sync::{ConcurrencyLimiter, ScanSession, SyncContext};
use futures::stream::{self, BoxStream, StreamExt};
use mockall::mock;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;

mock! {
    pub Provider {}

    #[async_trait]
    impl MetadataProvider for Provider {
        async fn fetch_metadata(
            &self,
            id: WorkId,
            language: TagLanguage,
        ) -> core_metadata::Result<WorkMetadata>;
        async fn fetch_dynamic_metadata(&self, id: WorkId) -> core_metadata::Result<DynamicMetadata>;
    }
}

/// Serves a tiny image for every URL, except URLs ending with a failing
/// suffix. Tracks peak concurrent downloads.
pub struct ImageServer {
    failing_suffixes: Mutex<Vec<String>>,
    pub urls: Mutex<Vec<String>>,
    active: AtomicUsize,
    pub peak: AtomicUsize,
}

impl ImageServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            failing_suffixes: Mutex::new(Vec::new()),
            urls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn fail_on(&self, suffix: &str) {
        self.failing_suffixes.lock().unwrap().push(suffix.to_string());
    }

    pub fn request_count(&self) -> usize {
        self.urls.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClient for ImageServer {
    async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
        Err(BridgeError::NotAvailable("execute".to_string()))
    }

    async fn download_stream(&self, url: String) -> BridgeResult<DownloadStream> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        self.urls.lock().unwrap().push(url.clone());
        let failing = self
            .failing_suffixes
            .lock()
            .unwrap()
            .iter()
            .any(|suffix| url.ends_with(suffix.as_str()));
        if failing {
            return Err(BridgeError::HttpStatus { status: 404, url });
        }
        Ok(Box::new(std::io::Cursor::new(b"\xFF\xD8jpeg".to_vec())))
    }
}

/// Real library filesystem with injectable faults.
pub struct FaultyFileSystem {
    inner: Arc<TokioLibraryFileSystem>,
    deny_cover_deletes: bool,
    unreadable: Option<PathBuf>,
}

impl FaultyFileSystem {
    pub fn new(inner: Arc<TokioLibraryFileSystem>) -> Self {
        Self {
            inner,
            deny_cover_deletes: false,
            unreadable: None,
        }
    }

    /// Every cover deletion fails with a permission error.
    pub fn deny_cover_deletes(mut self) -> Self {
        self.deny_cover_deletes = true;
        self
    }

    /// Discovery reports `path` as unreadable before the real items.
    pub fn unreadable(mut self, path: impl Into<PathBuf>) -> Self {
        self.unreadable = Some(path.into());
        self
    }
}

#[async_trait]
impl LibraryFileSystem for FaultyFileSystem {
    fn list_folders(
        &self,
        root: &RootFolder,
        max_depth: u32,
    ) -> BoxStream<'static, BridgeResult<DiscoveryItem>> {
        let items = self.inner.list_folders(root, max_depth);
        match &self.unreadable {
            Some(path) => {
                let unreadable = DiscoveryItem::Unreadable {
                    path: path.clone(),
                    reason: "Permission denied (os error 13)".to_string(),
                };
                stream::iter(vec![Ok(unreadable)]).chain(items).boxed()
            }
            None => items,
        }
    }

    async fn list_tracks(&self, work_code: &str, work_path: &Path) -> BridgeResult<Vec<TrackEntry>> {
        self.inner.list_tracks(work_code, work_path).await
    }

    async fn exists(&self, path: &Path) -> BridgeResult<bool> {
        self.inner.exists(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> BridgeResult<()> {
        self.inner.create_dir_all(path).await
    }

    async fn save_cover_image(
        &self,
        reader: DownloadStream,
        code: &str,
        variant: &str,
    ) -> BridgeResult<()> {
        self.inner.save_cover_image(reader, code, variant).await
    }

    async fn cover_image_exists(&self, code: &str, variant: &str) -> BridgeResult<bool> {
        self.inner.cover_image_exists(code, variant).await
    }

    async fn delete_cover_image(&self, code: &str, variant: &str) -> BridgeResult<()> {
        if self.deny_cover_deletes {
            return Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "permission denied",
            )));
        }
        self.inner.delete_cover_image(code, variant).await
    }
}

pub fn sample_metadata(id: WorkId) -> WorkMetadata {
    WorkMetadata {
        id,
        title: format!("Work {}", id),
        circle: Circle {
            id: 7,
            name: "Circle".to_string(),
        },
        nsfw: false,
        release: Some("2024-01-01".to_string()),
        dynamic: DynamicMetadata {
            dl_count: Some(100),
            ..DynamicMetadata::default()
        },
        tags: vec![Tag {
            id: 1,
            name: "ASMR".to_string(),
        }],
        vas: vec![VoiceActor::from_name("Alice")],
        has_subtitle: false,
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub config: Arc<LibraryConfig>,
    pub server: Arc<ImageServer>,
    pub bus: EventBus,
    pub file_system: Arc<TokioLibraryFileSystem>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(|builder| builder).await
    }

    pub async fn with_config(
        customize: impl FnOnce(
            core_runtime::config::LibraryConfigBuilder,
        ) -> core_runtime::config::LibraryConfigBuilder,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("library")).unwrap();

        let builder = LibraryConfig::builder()
            .root_folder("main", dir.path().join("library"))
            .max_parallelism(2)
            .cover_folder_dir(dir.path().join("covers"))
            .database_path(dir.path().join("db.sqlite3"))
            .metadata_api_url("https://api.example.com")
            .cover_base_url("https://img.example.com")
            .update_lock_path(dir.path().join("update.lock"));
        let config = Arc::new(customize(builder).build().unwrap());

        let file_system = Arc::new(TokioLibraryFileSystem::new(&config.cover_folder_dir));

        Self {
            pool: create_test_pool().await.unwrap(),
            config,
            server: ImageServer::new(),
            bus: EventBus::new(4096),
            file_system,
            dir,
        }
    }

    pub fn library(&self) -> PathBuf {
        self.dir.path().join("library")
    }

    /// Create a work folder with the given files, relative to the library.
    pub fn add_folder(&self, relative: &str, files: &[&str]) -> PathBuf {
        let path = self.library().join(relative);
        std::fs::create_dir_all(&path).unwrap();
        for file in files {
            let file_path = path.join(file);
            if let Some(parent) = file_path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(file_path, b"data").unwrap();
        }
        path
    }

    pub fn cover_exists(&self, code: &str, variant: &str) -> bool {
        self.file_system.cover_path(code, variant).exists()
    }

    pub fn write_cover(&self, code: &str, variant: &str) {
        std::fs::create_dir_all(&self.config.cover_folder_dir).unwrap();
        std::fs::write(self.file_system.cover_path(code, variant), b"jpeg").unwrap();
    }

    pub fn lock_path(&self) -> &Path {
        &self.config.update_lock_path
    }

    pub fn works(&self) -> Arc<SqliteWorkRepository> {
        Arc::new(SqliteWorkRepository::new(self.pool.clone()))
    }

    pub async fn seed(&self, work: NewWork) {
        use core_library::WorkRepository;
        self.works().insert(&work).await.unwrap();
    }

    pub fn context(&self, provider: MockProvider) -> SyncContext {
        self.context_with_file_system(provider, self.file_system.clone())
    }

    pub fn faulty_file_system(&self) -> FaultyFileSystem {
        FaultyFileSystem::new(self.file_system.clone())
    }

    pub fn context_with_file_system(
        &self,
        provider: MockProvider,
        file_system: Arc<dyn LibraryFileSystem>,
    ) -> SyncContext {
        let covers = CoverFetcher::new(
            self.server.clone(),
            Arc::clone(&file_system),
            self.config.cover_base_url.clone(),
        )
        .with_retry_policy(RetryPolicy::no_retry());

        SyncContext {
            config: Arc::clone(&self.config),
            works: self.works(),
            users: Arc::new(SqliteUserRepository::new(self.pool.clone())),
            provider: Arc::new(provider),
            covers: Arc::new(covers),
            file_system,
            session: Arc::new(ScanSession::new(self.bus.clone())),
            limiter: ConcurrencyLimiter::new(self.config.max_parallelism),
            update_lock: UpdateLock::new(&self.config.update_lock_path),
        }
    }

    pub async fn work_ids(&self) -> Vec<i64> {
        sqlx::query_as::<_, (i64,)>("SELECT id FROM t_work ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .unwrap()
            .into_iter()
            .map(|(id,)| id)
            .collect()
    }
}

/// Every event currently buffered on `rx`.
pub fn drain(rx: &mut Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn finished_message(events: &[CoreEvent]) -> Option<String> {
    events.iter().find_map(|event| match event {
        CoreEvent::Scan(ScanEvent::Finished { message, .. }) => Some(message.clone()),
        _ => None,
    })
}

pub fn library_events(events: &[CoreEvent]) -> Vec<LibraryEvent> {
    events
        .iter()
        .filter_map(|event| match event {
            CoreEvent::Library(event) => Some(event.clone()),
            _ => None,
        })
        .collect()
}
