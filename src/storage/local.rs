//! Local filesystem progress store.
//!
//! The progress file is always rewritten whole: the new content goes to a
//! sibling `.tmp` file which is then renamed over the old one, so a crash
//! leaves either the previous or the new marks, never a mix.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::{Progress, ProgressStore};

/// JSON file progress store.
#[derive(Debug, Clone)]
pub struct LocalProgressStore {
    path: PathBuf,
}

impl LocalProgressStore {
    /// Create a store backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.ensure_dir().await?;

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[async_trait]
impl ProgressStore for LocalProgressStore {
    async fn load(&self) -> Result<Progress> {
        match self.read_bytes().await? {
            Some(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Progress::default()),
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => {
                log::warn!(
                    "No progress file at {}, starting fresh",
                    self.path.display()
                );
                Ok(Progress::default())
            }
        }
    }

    async fn save(&self, progress: &Progress) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(progress)?;
        self.write_bytes(&bytes).await?;
        log::debug!(
            "Saved {} mark(s) to {}",
            progress.len(),
            self.path.display()
        );
        Ok(())
    }
}
