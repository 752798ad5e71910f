//! Publish session for one open notebook

use std::sync::Arc;

use connect_api::{AppGetRequest, TlsOptions};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::app::options::SessionOptions;
use crate::deploy::fsm::DeployState;
use crate::deploy::orchestrator::{DeploymentOrchestrator, PublishFlow, PublishRequest};
use crate::deploy::poller::SleepFn;
use crate::environment::Kernel;
use crate::errors::PublishError;
use crate::http::{ConfigStore, ConnectApi};
use crate::notebook::NotebookHost;
use crate::registry::ServerRegistry;
use crate::verify::Verifier;

/// Everything a user action needs: the notebook, its registry of servers,
/// and the orchestrator that deploys it.
pub struct PublishSession {
    api: Arc<dyn ConnectApi>,
    notebook: Arc<dyn NotebookHost>,
    registry: ServerRegistry,
    verifier: Verifier,
    orchestrator: DeploymentOrchestrator,
}

impl PublishSession {
    /// Load the registry from the notebook and merge the config store into it.
    ///
    /// An unreachable config store leaves the registry as the notebook
    /// describes it.
    pub async fn open(
        api: Arc<dyn ConnectApi>,
        config_store: Arc<dyn ConfigStore>,
        notebook: Arc<dyn NotebookHost>,
        kernel: Arc<dyn Kernel>,
        options: SessionOptions,
    ) -> Self {
        let mut registry = ServerRegistry::load(notebook.clone(), config_store).await;
        if let Err(e) = registry.fetch_config().await {
            warn!("Unable to fetch server configuration: {}", e);
        }

        info!(
            "Opened {} with {} server(s)",
            notebook.path(),
            registry.len()
        );
        Self {
            verifier: Verifier::new(api.clone()),
            orchestrator: DeploymentOrchestrator::new(api.clone(), kernel, options.poller),
            api,
            notebook,
            registry,
        }
    }

    /// Replace the delay used between poll requests
    pub fn with_sleep(mut self, sleep_fn: SleepFn) -> Self {
        self.orchestrator = self.orchestrator.with_sleep(sleep_fn);
        self
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    pub fn notebook(&self) -> &Arc<dyn NotebookHost> {
        &self.notebook
    }

    pub fn deploy_state(&self) -> DeployState {
        self.orchestrator.state()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.orchestrator.last_error()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<String> {
        self.orchestrator.subscribe_status()
    }

    pub async fn add_server(
        &mut self,
        address: &str,
        name: &str,
        api_key: &str,
    ) -> Result<String, PublishError> {
        self.registry
            .add_server(&self.verifier, address, name, api_key)
            .await
    }

    /// Register a server with its own certificate settings
    pub async fn add_server_with_tls(
        &mut self,
        address: &str,
        name: &str,
        api_key: &str,
        tls: TlsOptions,
    ) -> Result<String, PublishError> {
        self.registry
            .add_server_with_tls(&self.verifier, address, name, api_key, tls)
            .await
    }

    pub async fn remove_server(&mut self, id: &str) -> bool {
        self.registry.remove_server(id).await
    }

    /// Server to preselect: the last deploy target, else the only server
    pub fn default_server_id(&self) -> Option<String> {
        if let Some(id) = self.registry.previous_server_id() {
            return Some(id.to_string());
        }
        if self.registry.len() == 1 {
            return self.registry.servers().next().map(|e| e.id.clone());
        }
        None
    }

    /// Title to prefill for a deploy to `server_id`
    pub fn default_title(&self, server_id: Option<&str>) -> String {
        self.registry.notebook_title(server_id)
    }

    /// Title of the content last deployed to `server_id`, as the server has it now.
    ///
    /// `None` when nothing was deployed there yet.
    pub async fn remote_title(&self, server_id: &str) -> Result<Option<String>, PublishError> {
        let entry = self
            .registry
            .get(server_id)
            .ok_or_else(|| PublishError::NotFound(format!("server {}", server_id)))?;
        let Some(app_id) = entry.last_app_id.clone() else {
            return Ok(None);
        };
        let connection = self.registry.connection(server_id).ok_or_else(|| {
            PublishError::ConfigError(format!("no API key for {}", entry.address))
        })?;

        let app = self
            .api
            .app_get(&AppGetRequest {
                app_id,
                server_address: connection.address,
                api_key: connection.api_key,
                tls: connection.tls,
            })
            .await?;

        debug!("Remote content {} is titled {:?}", app.id, app.title);
        Ok(app.title.filter(|t| !t.is_empty()).or(app.name))
    }

    /// Write the deploy manifest for the notebook without publishing it
    pub async fn write_manifest(&self, title: &str) -> Result<Vec<String>, PublishError> {
        self.orchestrator
            .write_manifest(self.notebook.as_ref(), title)
            .await
    }

    /// Publish the notebook, or return the existing content the user has
    /// to choose between
    pub async fn publish(&mut self, request: PublishRequest) -> Result<PublishFlow, PublishError> {
        self.orchestrator
            .publish_or_search(&mut self.registry, self.notebook.as_ref(), request)
            .await
    }
}
