//! Moves picked images out of the transient staging area into durable
//! storage before a post references them.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("source file does not exist: {0}")]
    SourceMissing(PathBuf),

    #[error("invalid media name: {0}")]
    InvalidName(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MediaError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
pub trait MediaRelocator: Send + Sync {
    /// Move `source` into durable storage and return the new path.
    async fn relocate(&self, source: &Path) -> Result<PathBuf, MediaError>;

    /// Remove a durable file. Removing a missing file is not an error.
    async fn remove(&self, path: &Path) -> Result<(), MediaError>;

    /// Write uploaded bytes into the staging area.
    async fn stage(&self, file_name: &str, data: &[u8]) -> Result<PathBuf, MediaError>;

    /// Resolve a durable file by name, if it exists.
    async fn open(&self, file_name: &str) -> Result<Option<PathBuf>, MediaError>;
}

pub type DynMediaRelocator = Arc<dyn MediaRelocator>;

/// Media kept on the local filesystem.
pub struct LocalMediaStore {
    media_dir: PathBuf,
    staging_dir: PathBuf,
}

impl LocalMediaStore {
    pub fn new(media_dir: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            media_dir: media_dir.into(),
            staging_dir: staging_dir.into(),
        }
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    async fn destination_for(&self, file_name: &str) -> Result<PathBuf, MediaError> {
        let candidate = self.media_dir.join(file_name);
        match tokio::fs::try_exists(&candidate).await {
            Ok(false) => Ok(candidate),
            Ok(true) => {
                let prefixed = format!("{}-{}", uuid::Uuid::now_v7(), file_name);
                Ok(self.media_dir.join(prefixed))
            }
            Err(e) => Err(MediaError::io(&candidate, e)),
        }
    }
}

#[async_trait]
impl MediaRelocator for LocalMediaStore {
    async fn relocate(&self, source: &Path) -> Result<PathBuf, MediaError> {
        let file_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MediaError::InvalidName(source.display().to_string()))?;

        match tokio::fs::metadata(source).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(MediaError::SourceMissing(source.to_path_buf())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(MediaError::SourceMissing(source.to_path_buf()))
            }
            Err(e) => return Err(MediaError::io(source, e)),
        }

        tokio::fs::create_dir_all(&self.media_dir)
            .await
            .map_err(|e| MediaError::io(&self.media_dir, e))?;

        let destination = self.destination_for(file_name).await?;

        if let Err(rename_err) = tokio::fs::rename(source, &destination).await {
            // Staging and media may live on different filesystems
            tracing::debug!(error = %rename_err, "rename failed, falling back to copy");
            tokio::fs::copy(source, &destination)
                .await
                .map_err(|e| MediaError::io(&destination, e))?;
            tokio::fs::remove_file(source)
                .await
                .map_err(|e| MediaError::io(source, e))?;
        }

        tracing::info!(
            from = %source.display(),
            to = %destination.display(),
            "media relocated"
        );
        Ok(destination)
    }

    async fn remove(&self, path: &Path) -> Result<(), MediaError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "media removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MediaError::io(path, e)),
        }
    }

    async fn stage(&self, file_name: &str, data: &[u8]) -> Result<PathBuf, MediaError> {
        let name = safe_file_name(file_name)?;
        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(|e| MediaError::io(&self.staging_dir, e))?;

        // Concurrent uploads may share a client-side name
        let path = self
            .staging_dir
            .join(format!("{}-{}", uuid::Uuid::now_v7(), name));
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| MediaError::io(&path, e))?;
        Ok(path)
    }

    async fn open(&self, file_name: &str) -> Result<Option<PathBuf>, MediaError> {
        let name = safe_file_name(file_name)?;
        let path = self.media_dir.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(path)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MediaError::io(&path, e)),
        }
    }
}

/// Accept a bare file name only: no separators, no parent references.
fn safe_file_name(name: &str) -> Result<&str, MediaError> {
    let name = name.trim();
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(MediaError::InvalidName(name.to_string()));
    }
    Ok(name)
}
