//! # Library Configuration
//!
//! Read-only settings consumed by the sync engine.
//!
//! ## Overview
//!
//! A [`LibraryConfig`] is either deserialised from a JSON file (camelCase keys,
//! every field optional except where validation says otherwise) or assembled
//! with [`LibraryConfig::builder`]. Both paths end in [`LibraryConfig::validate`],
//! so an invalid configuration fails before any I/O happens.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{LibraryConfig, TagLanguage};
//!
//! let config = LibraryConfig::builder()
//!     .root_folder("main", "/srv/voice")
//!     .database_path("/var/lib/library/db.sqlite3")
//!     .cover_folder_dir("/var/lib/library/covers")
//!     .metadata_api_url("http://127.0.0.1:8790")
//!     .tag_language(TagLanguage::JaJp)
//!     .max_parallelism(8)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::filesystem::RootFolder;
use bridge_traits::http::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MAX_PARALLELISM: usize = 16;
pub const DEFAULT_MAX_RECURSION_DEPTH: u32 = 2;
pub const DEFAULT_RECENT_HISTORY_SIZE: usize = 20;
pub const DEFAULT_COVER_BASE_URL: &str = "https://img.dlsite.jp";

/// Language the metadata provider should use for tag names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TagLanguage {
    #[serde(rename = "ja-jp")]
    JaJp,
    #[serde(rename = "zh-tw")]
    ZhTw,
    #[default]
    #[serde(rename = "zh-cn")]
    ZhCn,
}

impl TagLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagLanguage::JaJp => "ja-jp",
            TagLanguage::ZhTw => "zh-tw",
            TagLanguage::ZhCn => "zh-cn",
        }
    }
}

/// Retry settings for outgoing HTTP requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            use_exponential_backoff: true,
        }
    }
}

/// Settings for the library sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LibraryConfig {
    /// Watched library roots.
    pub root_folders: Vec<RootFolder>,
    /// Upper bound on concurrently running ingestion operations.
    pub max_parallelism: usize,
    /// Artwork storage root.
    pub cover_folder_dir: PathBuf,
    /// SQLite catalog location.
    pub database_path: PathBuf,
    pub tag_language: TagLanguage,
    /// Skip the cleanup pass before discovery.
    pub skip_cleanup: bool,
    /// How many directory levels below a root discovery descends.
    pub scanner_max_recursion_depth: u32,
    /// Consumed by the history API, not by the scanner.
    pub recent_history_size: usize,
    /// Base URL of the JSON metadata provider.
    pub metadata_api_url: String,
    /// Base URL cover artwork is downloaded from.
    pub cover_base_url: String,
    pub retry: RetrySettings,
    /// Side-channel file that requests one-time repair passes.
    pub update_lock_path: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root_folders: Vec::new(),
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            cover_folder_dir: PathBuf::from("covers"),
            database_path: PathBuf::from("db.sqlite3"),
            tag_language: TagLanguage::default(),
            skip_cleanup: false,
            scanner_max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            recent_history_size: DEFAULT_RECENT_HISTORY_SIZE,
            metadata_api_url: String::new(),
            cover_base_url: DEFAULT_COVER_BASE_URL.to_string(),
            retry: RetrySettings::default(),
            update_lock_path: PathBuf::from("update.lock"),
        }
    }
}

impl LibraryConfig {
    pub fn builder() -> LibraryConfigBuilder {
        LibraryConfigBuilder::default()
    }

    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: LibraryConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Look up a configured root by alias.
    pub fn root_folder(&self, name: &str) -> Option<&RootFolder> {
        self.root_folders.iter().find(|root| root.name == name)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.to_policy()
    }

    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for root in &self.root_folders {
            if root.name.trim().is_empty() {
                return Err(Error::Config("Root folder name cannot be empty".to_string()));
            }
            if !names.insert(root.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate root folder name: {}",
                    root.name
                )));
            }
        }

        if self.max_parallelism == 0 {
            return Err(Error::Config(
                "maxParallelism must be at least 1".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::Config(
                "retry.maxAttempts must be at least 1".to_string(),
            ));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::Config(
                "retry.baseDelayMs cannot exceed retry.maxDelayMs".to_string(),
            ));
        }

        if self.metadata_api_url.trim().is_empty() {
            return Err(Error::Config(
                "metadataApiUrl is required".to_string(),
            ));
        }

        if self.cover_base_url.trim().is_empty() {
            return Err(Error::Config("coverBaseUrl cannot be empty".to_string()));
        }

        Ok(())
    }
}

/// Builder for [`LibraryConfig`].
#[derive(Debug, Default)]
pub struct LibraryConfigBuilder {
    config: LibraryConfig,
}

impl LibraryConfigBuilder {
    pub fn root_folder(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.config.root_folders.push(RootFolder::new(name, path));
        self
    }

    pub fn max_parallelism(mut self, max: usize) -> Self {
        self.config.max_parallelism = max;
        self
    }

    pub fn cover_folder_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cover_folder_dir = path.into();
        self
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = path.into();
        self
    }

    pub fn tag_language(mut self, language: TagLanguage) -> Self {
        self.config.tag_language = language;
        self
    }

    pub fn skip_cleanup(mut self, skip: bool) -> Self {
        self.config.skip_cleanup = skip;
        self
    }

    pub fn scanner_max_recursion_depth(mut self, depth: u32) -> Self {
        self.config.scanner_max_recursion_depth = depth;
        self
    }

    pub fn recent_history_size(mut self, size: usize) -> Self {
        self.config.recent_history_size = size;
        self
    }

    pub fn metadata_api_url(mut self, url: impl Into<String>) -> Self {
        self.config.metadata_api_url = url.into();
        self
    }

    pub fn cover_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.cover_base_url = url.into();
        self
    }

    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn update_lock_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.update_lock_path = path.into();
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<LibraryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
