//! Publishing endpoint client

use async_trait::async_trait;
use connect_api::{
    AppConfigRequest, AppConfigResponse, AppGetRequest, AppInfo, AppSearchRequest,
    AppSearchResult, DeployRequest, DeployResponse, LogPollRequest, LogPollResponse,
    VerifyServerRequest, VerifyServerResponse, WriteManifestRequest, WriteManifestResponse,
};

use crate::errors::PublishError;
use crate::http::client::HttpClient;
use crate::http::ConnectApi;

const VERIFY_SERVER_PATH: &str = "/rsconnect_jupyter/verify_server";
const APP_GET_PATH: &str = "/rsconnect_jupyter/app_get";
const APP_SEARCH_PATH: &str = "/rsconnect_jupyter/app_search";
const DEPLOY_PATH: &str = "/rsconnect_jupyter/deploy";
const GET_LOG_PATH: &str = "/rsconnect_jupyter/get_log";
const APP_CONFIG_PATH: &str = "/rsconnect_jupyter/app_config";
const WRITE_MANIFEST_PATH: &str = "/rsconnect_jupyter/write_manifest";

#[async_trait]
impl ConnectApi for HttpClient {
    async fn verify_server(
        &self,
        request: &VerifyServerRequest,
    ) -> Result<VerifyServerResponse, PublishError> {
        self.post(VERIFY_SERVER_PATH, request).await
    }

    async fn app_get(&self, request: &AppGetRequest) -> Result<AppInfo, PublishError> {
        self.post(APP_GET_PATH, request).await
    }

    async fn app_search(
        &self,
        request: &AppSearchRequest,
    ) -> Result<Vec<AppSearchResult>, PublishError> {
        self.post(APP_SEARCH_PATH, request).await
    }

    async fn deploy(&self, request: &DeployRequest) -> Result<DeployResponse, PublishError> {
        self.post(DEPLOY_PATH, request).await
    }

    async fn get_log(&self, request: &LogPollRequest) -> Result<LogPollResponse, PublishError> {
        self.post(GET_LOG_PATH, request).await
    }

    async fn app_config(
        &self,
        request: &AppConfigRequest,
    ) -> Result<AppConfigResponse, PublishError> {
        self.post(APP_CONFIG_PATH, request).await
    }

    async fn write_manifest(
        &self,
        request: &WriteManifestRequest,
    ) -> Result<WriteManifestResponse, PublishError> {
        self.post(WRITE_MANIFEST_PATH, request).await
    }
}
