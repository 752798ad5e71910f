//! File operations

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::PublishError;

/// A file wrapper with path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, PublishError> {
        Ok(fs::read_to_string(&self.path).await?)
    }

    /// Read file as JSON
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, PublishError> {
        let contents = self.read_string().await?;
        let value = serde_json::from_str(&contents)?;
        Ok(value)
    }

    /// Read file as JSON, falling back to the default value when it does not exist
    pub async fn read_json_or_default<T: DeserializeOwned + Default>(
        &self,
    ) -> Result<T, PublishError> {
        if !self.exists().await {
            return Ok(T::default());
        }
        self.read_json().await
    }

    /// Write JSON through a temporary sibling so readers never see a partial document
    pub async fn write_json<T: Serialize>(&self, value: &T) -> Result<(), PublishError> {
        let contents = serde_json::to_string_pretty(value)?;
        self.write_atomic(contents.as_bytes(), None).await
    }

    /// Like [`File::write_json`], for documents holding credentials: the file
    /// is readable only by its owner (0o600 on Unix) from the moment it is
    /// created.
    pub async fn write_json_private<T: Serialize>(&self, value: &T) -> Result<(), PublishError> {
        let contents = serde_json::to_string_pretty(value)?;
        self.write_atomic(contents.as_bytes(), Some(0o600)).await
    }

    /// Hidden sibling used while writing, `.<name>.tmp`
    pub fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path.with_file_name(format!(".{}.tmp", name))
    }

    /// Atomic write using a temporary file created with `mode` on Unix
    async fn write_atomic(&self, contents: &[u8], mode: Option<u32>) -> Result<(), PublishError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.temp_path();
        // left behind by an interrupted write
        if fs::metadata(&temp_path).await.is_ok() {
            fs::remove_file(&temp_path).await?;
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        if let Some(mode) = mode {
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;

        let mut file = options.open(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
