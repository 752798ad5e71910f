//! HTTP access to the notebook server

use async_trait::async_trait;
use connect_api::{
    AppConfigRequest, AppConfigResponse, AppGetRequest, AppInfo, AppSearchRequest,
    AppSearchResult, DeployRequest, DeployResponse, LogPollRequest, LogPollResponse,
    ServerConfigMap, VerifyServerRequest, VerifyServerResponse, WriteManifestRequest,
    WriteManifestResponse,
};

use crate::errors::PublishError;

pub mod client;
pub mod config;
pub mod connect;

/// Publishing endpoints, one method per request/response pair.
///
/// Implemented by [`client::HttpClient`]; tests substitute recording fakes.
#[async_trait]
pub trait ConnectApi: Send + Sync {
    async fn verify_server(
        &self,
        request: &VerifyServerRequest,
    ) -> Result<VerifyServerResponse, PublishError>;

    async fn app_get(&self, request: &AppGetRequest) -> Result<AppInfo, PublishError>;

    async fn app_search(
        &self,
        request: &AppSearchRequest,
    ) -> Result<Vec<AppSearchResult>, PublishError>;

    async fn deploy(&self, request: &DeployRequest) -> Result<DeployResponse, PublishError>;

    async fn get_log(&self, request: &LogPollRequest) -> Result<LogPollResponse, PublishError>;

    async fn app_config(&self, request: &AppConfigRequest)
        -> Result<AppConfigResponse, PublishError>;

    async fn write_manifest(
        &self,
        request: &WriteManifestRequest,
    ) -> Result<WriteManifestResponse, PublishError>;
}

/// Key/value store for the server list, credentials included
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn fetch(&self) -> Result<ServerConfigMap, PublishError>;

    async fn save(&self, config: &ServerConfigMap) -> Result<(), PublishError>;
}
