//! Search for existing content

use std::sync::Arc;

use connect_api::{AppId, AppSearchRequest};
use tracing::debug;

use crate::errors::PublishError;
use crate::http::ConnectApi;
use crate::models::deployment::SearchResult;
use crate::registry::ServerRegistry;

/// Finds content on a server that a deploy could overwrite
pub struct ContentSearch {
    api: Arc<dyn ConnectApi>,
}

impl ContentSearch {
    pub fn new(api: Arc<dyn ConnectApi>) -> Self {
        Self { api }
    }

    /// Content on `server_id` matching `title`, plus `current_app_id` when the
    /// server still has it. An empty list means the deploy is new content.
    pub async fn search(
        &self,
        registry: &ServerRegistry,
        server_id: &str,
        title: &str,
        current_app_id: Option<&AppId>,
    ) -> Result<Vec<SearchResult>, PublishError> {
        let entry = registry
            .get(server_id)
            .ok_or_else(|| PublishError::NotFound(format!("server {}", server_id)))?;
        let connection = registry
            .connection(server_id)
            .ok_or_else(|| PublishError::Search(format!("no API key for {}", entry.address)))?;

        let request = AppSearchRequest {
            notebook_title: title.to_string(),
            app_id: current_app_id.cloned(),
            server_address: connection.address,
            api_key: connection.api_key,
            tls: connection.tls,
        };

        let results = self
            .api
            .app_search(&request)
            .await
            .map_err(|e| PublishError::Search(e.server_message()))?;

        debug!("Search for '{}' on {} found {} result(s)", title, entry.address, results.len());
        Ok(results.into_iter().map(SearchResult::from).collect())
    }
}
