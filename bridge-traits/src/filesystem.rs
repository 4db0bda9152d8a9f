//! Library Filesystem Abstraction
//!
//! Contracts for everything the sync engine needs from disk: discovering work
//! folders below the configured roots, listing the audio tracks inside a work,
//! and storing cover artwork.
//!
//! Discovery is exposed as a lazy, finite stream. The consumer pulls one item
//! at a time and each directory read is a suspension point, so a large library
//! never has to be materialised in memory before ingestion starts.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::http::DownloadStream;

/// A configured library root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFolder {
    /// Alias persisted on every work discovered below this root.
    pub name: String,
    /// Absolute location on disk.
    pub path: PathBuf,
}

impl RootFolder {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// A work folder found during discovery. Not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderDescriptor {
    /// Path relative to the root folder.
    pub relative_path: PathBuf,
    /// Alias of the root folder the work was found under.
    pub root_folder_name: String,
    /// Numeric work identifier parsed from the folder name.
    pub work_id: u32,
}

/// One element of the discovery stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryItem {
    /// A work folder.
    Folder(FolderDescriptor),
    /// A directory below the root that could not be read. Discovery continues.
    Unreadable { path: PathBuf, reason: String },
}

/// An audio track inside a work folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackEntry {
    /// File name of the track.
    pub title: String,
    /// Sub-directory relative to the work folder, if the track is nested.
    pub subtitle: Option<String>,
}

impl TrackEntry {
    /// Path of the track relative to the work folder.
    pub fn relative_path(&self) -> PathBuf {
        match &self.subtitle {
            Some(dir) => Path::new(dir).join(&self.title),
            None => PathBuf::from(&self.title),
        }
    }
}

/// Filesystem access used by the library sync engine.
///
/// # Artwork naming
///
/// Cover files live directly under the artwork root and are named
/// `RJ{code}_img_{variant}.jpg`. Implementations own that scheme so callers
/// only deal in `(code, variant)` pairs.
#[async_trait]
pub trait LibraryFileSystem: Send + Sync {
    /// Walk `root` looking for work folders, descending at most `max_depth`
    /// levels.
    ///
    /// The first item is an error if the root itself cannot be read.
    fn list_folders(
        &self,
        root: &RootFolder,
        max_depth: u32,
    ) -> BoxStream<'static, Result<DiscoveryItem>>;

    /// List the audio tracks of a work, sorted by relative path.
    async fn list_tracks(&self, work_code: &str, work_path: &Path) -> Result<Vec<TrackEntry>>;

    /// Check whether a path exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Create a directory and all of its parents.
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Stream a cover image to artwork storage.
    async fn save_cover_image(
        &self,
        reader: DownloadStream,
        code: &str,
        variant: &str,
    ) -> Result<()>;

    /// Check whether a cover variant is already stored.
    async fn cover_image_exists(&self, code: &str, variant: &str) -> Result<bool>;

    /// Delete one stored cover variant.
    ///
    /// A missing file is reported as an error for which
    /// [`BridgeError::is_not_found`](crate::error::BridgeError::is_not_found)
    /// returns true.
    async fn delete_cover_image(&self, code: &str, variant: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_relative_path() {
        let flat = TrackEntry {
            title: "01.mp3".to_string(),
            subtitle: None,
        };
        let nested = TrackEntry {
            title: "01.mp3".to_string(),
            subtitle: Some("mp3".to_string()),
        };

        assert_eq!(flat.relative_path(), PathBuf::from("01.mp3"));
        assert_eq!(nested.relative_path(), Path::new("mp3").join("01.mp3"));
    }
}
