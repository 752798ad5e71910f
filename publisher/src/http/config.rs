//! Notebook server config section holding the server list

use async_trait::async_trait;
use connect_api::ServerConfigMap;
use tracing::debug;

use crate::errors::PublishError;
use crate::http::client::HttpClient;
use crate::http::ConfigStore;

const CONFIG_SECTION_PATH: &str = "/api/config/rsconnect_jupyter";

#[async_trait]
impl ConfigStore for HttpClient {
    async fn fetch(&self) -> Result<ServerConfigMap, PublishError> {
        let config: ServerConfigMap = self
            .get(CONFIG_SECTION_PATH)
            .await
            .map_err(|e| PublishError::ConfigPersistence(e.server_message()))?;
        debug!("Fetched {} server(s) from the notebook server config", config.len());
        Ok(config)
    }

    async fn save(&self, config: &ServerConfigMap) -> Result<(), PublishError> {
        self.put(CONFIG_SECTION_PATH, config)
            .await
            .map_err(|e| PublishError::ConfigPersistence(e.server_message()))
    }
}
