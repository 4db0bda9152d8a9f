//! Library filesystem implementation using Tokio

use async_stream::stream;
use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    filesystem::{DiscoveryItem, FolderDescriptor, LibraryFileSystem, RootFolder, TrackEntry},
    http::DownloadStream,
};
use futures::stream::BoxStream;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// File extensions treated as audio tracks.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "ogg", "opus", "wav", "aac", "flac", "webm", "mp4", "m4a",
];

/// Tokio-based library filesystem
///
/// Discovery walks directories lazily with `tokio::fs`; cover artwork is
/// stored flat under `cover_dir`.
pub struct TokioLibraryFileSystem {
    cover_dir: PathBuf,
}

impl TokioLibraryFileSystem {
    pub fn new(cover_dir: impl Into<PathBuf>) -> Self {
        Self {
            cover_dir: cover_dir.into(),
        }
    }

    /// Absolute path of a stored cover variant.
    pub fn cover_path(&self, code: &str, variant: &str) -> PathBuf {
        self.cover_dir.join(format!("RJ{}_img_{}.jpg", code, variant))
    }
}

/// Parse a work identifier out of a folder name.
///
/// Matches `RJ` (any case) followed by exactly 6 or 8 digits.
pub fn parse_work_id(name: &str) -> Option<u32> {
    let bytes = name.as_bytes();
    let mut start = 0;
    while start + 2 <= bytes.len() {
        if bytes[start].eq_ignore_ascii_case(&b'R') && bytes[start + 1].eq_ignore_ascii_case(&b'J') {
            let digits = bytes[start + 2..]
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .count();
            if digits == 6 || digits == 8 {
                let end = start + 2 + digits;
                if let Ok(id) = name[start + 2..end].parse() {
                    return Some(id);
                }
            }
        }
        start += 1;
    }
    None
}

async fn read_sorted_subdirs(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut read_dir = fs::read_dir(dir).await?;
    let mut names = Vec::new();

    while let Some(entry) = read_dir.next_entry().await? {
        // Follow symlinks so linked work folders are discovered.
        let is_dir = match fs::metadata(entry.path()).await {
            Ok(metadata) => metadata.is_dir(),
            Err(_) => false,
        };
        if !is_dir {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => debug!(name = ?name, "Skipping directory with non UTF-8 name"),
        }
    }

    names.sort();
    Ok(names)
}

/// Copy a download into `file` and flush it. The file is closed on return.
async fn write_partial(reader: &mut DownloadStream, mut file: fs::File) -> std::io::Result<u64> {
    let written = tokio::io::copy(reader, &mut file).await?;
    file.flush().await?;
    Ok(written)
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            AUDIO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[async_trait]
impl LibraryFileSystem for TokioLibraryFileSystem {
    fn list_folders(
        &self,
        root: &RootFolder,
        max_depth: u32,
    ) -> BoxStream<'static, Result<DiscoveryItem>> {
        let root = root.clone();

        Box::pin(stream! {
            let mut pending = vec![(PathBuf::new(), 0u32)];

            while let Some((relative, depth)) = pending.pop() {
                let dir = root.path.join(&relative);
                let names = match read_sorted_subdirs(&dir).await {
                    Ok(names) => names,
                    Err(e) if depth == 0 => {
                        yield Err(BridgeError::Io(e));
                        return;
                    }
                    Err(e) => {
                        warn!(path = ?dir, error = %e, "Cannot read directory");
                        yield Ok(DiscoveryItem::Unreadable { path: dir, reason: e.to_string() });
                        continue;
                    }
                };

                let mut nested = Vec::new();
                for name in names {
                    let child = relative.join(&name);
                    if let Some(work_id) = parse_work_id(&name) {
                        yield Ok(DiscoveryItem::Folder(FolderDescriptor {
                            relative_path: child,
                            root_folder_name: root.name.clone(),
                            work_id,
                        }));
                    } else if depth < max_depth {
                        nested.push((child, depth + 1));
                    }
                }
                // Keep depth-first order: the first child is popped next.
                pending.extend(nested.into_iter().rev());
            }
        })
    }

    async fn list_tracks(&self, work_code: &str, work_path: &Path) -> Result<Vec<TrackEntry>> {
        let mut tracks = Vec::new();
        let mut pending = vec![PathBuf::new()];

        while let Some(relative) = pending.pop() {
            let mut read_dir = fs::read_dir(work_path.join(&relative)).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                let metadata = fs::metadata(&path).await?;
                let name = entry.file_name().to_string_lossy().into_owned();

                if metadata.is_dir() {
                    pending.push(relative.join(&name));
                } else if is_audio_file(&path) {
                    let subtitle = if relative.as_os_str().is_empty() {
                        None
                    } else {
                        Some(relative.to_string_lossy().into_owned())
                    };
                    tracks.push(TrackEntry {
                        title: name,
                        subtitle,
                    });
                }
            }
        }

        tracks.sort_by(|a, b| a.relative_path().cmp(&b.relative_path()));
        debug!(code = work_code, count = tracks.len(), "Listed tracks");
        Ok(tracks)
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn save_cover_image(
        &self,
        mut reader: DownloadStream,
        code: &str,
        variant: &str,
    ) -> Result<()> {
        let target = self.cover_path(code, variant);
        let partial = target.with_extension("jpg.part");

        let file = fs::File::create(&partial).await?;
        let saved = match write_partial(&mut reader, file).await {
            Ok(written) => fs::rename(&partial, &target).await.map(|()| written),
            Err(e) => Err(e),
        };

        match saved {
            Ok(written) => {
                debug!(path = ?target, size = written, "Saved cover image");
                Ok(())
            }
            Err(e) => {
                if let Err(remove_err) = fs::remove_file(&partial).await {
                    debug!(path = ?partial, error = %remove_err, "Partial cover not removed");
                }
                Err(BridgeError::Io(e))
            }
        }
    }

    async fn cover_image_exists(&self, code: &str, variant: &str) -> Result<bool> {
        Ok(fs::try_exists(self.cover_path(code, variant)).await?)
    }

    async fn delete_cover_image(&self, code: &str, variant: &str) -> Result<()> {
        let path = self.cover_path(code, variant);
        fs::remove_file(&path).await?;
        debug!(path = ?path, "Deleted cover image");
        Ok(())
    }
}
