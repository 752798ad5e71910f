//! File-backed server config store

use async_trait::async_trait;
use connect_api::ServerConfigMap;
use tracing::debug;

use crate::errors::PublishError;
use crate::filesys::file::File;
use crate::http::ConfigStore;

/// Keeps the server list in a local JSON file readable only by its owner
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    file: File,
}

impl FileConfigStore {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn fetch(&self) -> Result<ServerConfigMap, PublishError> {
        self.file
            .read_json_or_default()
            .await
            .map_err(|e| PublishError::ConfigPersistence(e.to_string()))
    }

    async fn save(&self, config: &ServerConfigMap) -> Result<(), PublishError> {
        let result = self.file.write_json_private(config).await;

        debug!("Saved {} server(s) to {}", config.len(), self.file.path().display());
        result.map_err(|e| PublishError::ConfigPersistence(e.to_string()))
    }
}
