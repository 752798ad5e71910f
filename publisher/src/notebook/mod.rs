//! The notebook being published

use std::path::Path;

use async_trait::async_trait;

use crate::errors::PublishError;

pub mod document;

/// Accessor for the current notebook document
#[async_trait]
pub trait NotebookHost: Send + Sync {
    /// Path of the notebook relative to the notebook server root
    fn path(&self) -> &str;

    /// Absolute location of the notebook file on the local filesystem
    fn local_path(&self) -> &Path;

    /// Notebook name without its extension, the default content title
    fn name(&self) -> String;

    /// Current value of a top-level metadata key
    async fn metadata(&self, key: &str) -> Option<serde_json::Value>;

    /// Replace a top-level metadata key and save the document
    async fn save_metadata(&self, key: &str, value: serde_json::Value)
        -> Result<(), PublishError>;
}
