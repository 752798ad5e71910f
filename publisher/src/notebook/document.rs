//! `.ipynb` document on disk

use std::path::Path;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::PublishError;
use crate::filesys::file::File;
use crate::notebook::NotebookHost;

/// A notebook file opened from the local filesystem
pub struct NotebookDocument {
    file: File,
    server_path: String,
    document: RwLock<Value>,
}

impl NotebookDocument {
    /// Open a notebook.
    ///
    /// `server_path` is the path the notebook server knows the file by;
    /// `os_path` is resolved to an absolute path.
    pub async fn open(
        os_path: impl AsRef<Path>,
        server_path: impl Into<String>,
    ) -> Result<Self, PublishError> {
        let file = File::new(tokio::fs::canonicalize(os_path.as_ref()).await?);
        let document: Value = file.read_json().await?;
        if !document.is_object() {
            return Err(PublishError::NotFound(format!(
                "{} is not a notebook document",
                file.path().display()
            )));
        }

        Ok(Self {
            file,
            server_path: server_path.into(),
            document: RwLock::new(document),
        })
    }

    pub fn file(&self) -> &File {
        &self.file
    }
}

#[async_trait]
impl NotebookHost for NotebookDocument {
    fn path(&self) -> &str {
        &self.server_path
    }

    fn local_path(&self) -> &Path {
        self.file.path()
    }

    fn name(&self) -> String {
        self.file
            .path()
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.server_path.clone())
    }

    async fn metadata(&self, key: &str) -> Option<Value> {
        let document = self.document.read().await;
        document.get("metadata").and_then(|m| m.get(key)).cloned()
    }

    async fn save_metadata(&self, key: &str, value: Value) -> Result<(), PublishError> {
        let snapshot = {
            let mut document = self.document.write().await;
            let Some(root) = document.as_object_mut() else {
                return Err(PublishError::Internal("notebook root is not an object".into()));
            };
            let metadata = root
                .entry("metadata")
                .or_insert_with(|| Value::Object(Map::new()));
            if !metadata.is_object() {
                *metadata = Value::Object(Map::new());
            }
            if let Some(metadata) = metadata.as_object_mut() {
                metadata.insert(key.to_string(), value);
            }
            document.clone()
        };

        // the in-memory copy stays updated even if the file is read-only
        self.file.write_json(&snapshot).await?;
        debug!("Saved notebook metadata to {}", self.file.path().display());
        Ok(())
    }
}
