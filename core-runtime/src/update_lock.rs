//! Side-channel lock file requesting one-time repair passes.
//!
//! An upgrade drops a small JSON file next to the catalog, e.g.
//! `{"fixVA": true}`. The scanner checks for it before cleanup, runs every
//! flagged repair, and clears the flag once that repair succeeds. The file is
//! removed when no flags remain.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Flags stored in the lock file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockFileConfig {
    /// Re-link voice actors whose name-derived ids collided.
    #[serde(rename = "fixVA", default)]
    pub fix_va: bool,
}

impl LockFileConfig {
    pub fn is_empty(&self) -> bool {
        !self.fix_va
    }
}

#[derive(Debug, Clone)]
pub struct UpdateLock {
    path: PathBuf,
}

impl UpdateLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn is_present(&self) -> Result<bool> {
        Ok(fs::try_exists(&self.path).await?)
    }

    /// Read the flags. A missing file reads as no flags.
    pub async fn read(&self) -> Result<LockFileConfig> {
        match fs::read(&self.path).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LockFileConfig::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write(&self, config: &LockFileConfig) -> Result<()> {
        fs::write(&self.path, serde_json::to_vec_pretty(config)?).await?;
        debug!(path = ?self.path, "Wrote update lock");
        Ok(())
    }

    /// Clear the repair flag; delete the file when nothing is left to do.
    pub async fn clear_fix_va(&self) -> Result<()> {
        let mut config = self.read().await?;
        config.fix_va = false;
        if config.is_empty() {
            self.remove().await
        } else {
            self.write(&config).await
        }
    }

    pub async fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = ?self.path, "Removed update lock");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_lock_reads_empty() {
        let dir = TempDir::new().unwrap();
        let lock = UpdateLock::new(dir.path().join("update.lock"));

        assert!(!lock.is_present().await.unwrap());
        assert_eq!(lock.read().await.unwrap(), LockFileConfig::default());
        lock.remove().await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_fix_va_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("update.lock");
        std::fs::write(&path, br#"{"fixVA": true}"#).unwrap();
        let lock = UpdateLock::new(&path);

        assert!(lock.is_present().await.unwrap());
        assert!(lock.read().await.unwrap().fix_va);

        lock.clear_fix_va().await.unwrap();
        assert!(!lock.is_present().await.unwrap());
    }
}
