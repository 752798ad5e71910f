//! Deployment orchestration

use std::sync::Arc;

use connect_api::{AppConfigRequest, AppMode, DeployRequest, WriteManifestRequest};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::deploy::fsm::{DeployEvent, DeployFsm, DeployState};
use crate::deploy::poller::{self, SleepFn};
use crate::environment::{EnvironmentInspector, Kernel};
use crate::errors::PublishError;
use crate::http::ConnectApi;
use crate::models::deployment::{
    DeployLocation, DeployOutcome, DeployTask, EnvironmentSnapshot, SearchResult,
};
use crate::models::server::ServerConnection;
use crate::notebook::NotebookHost;
use crate::registry::ServerRegistry;
use crate::search::ContentSearch;
use crate::utils::{encode_notebook_path, generate_content_name};

/// What a publish should do with the requested target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetDecision {
    /// Deploy can go ahead
    Resolved(DeployLocation),

    /// Existing content matches; the user has to pick one or choose new content
    NeedsSelection(Vec<SearchResult>),
}

/// A user's publish action
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub server_id: String,
    pub title: String,
    pub app_mode: AppMode,
    /// Target chosen by the user, if any
    pub location: Option<DeployLocation>,
    /// Extra files to ship, relative to the notebook's directory
    pub files: Vec<String>,
}

/// Result of a publish action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishFlow {
    Published(DeployOutcome),
    NeedsSelection(Vec<SearchResult>),
}

/// Drives one publish attempt at a time through the deploy FSM
pub struct DeploymentOrchestrator {
    api: Arc<dyn ConnectApi>,
    inspector: EnvironmentInspector,
    search: ContentSearch,
    options: poller::Options,
    fsm: DeployFsm,
    status_tx: watch::Sender<String>,
    sleep_fn: SleepFn,
}

impl DeploymentOrchestrator {
    pub fn new(
        api: Arc<dyn ConnectApi>,
        kernel: Arc<dyn Kernel>,
        options: poller::Options,
    ) -> Self {
        let (status_tx, _) = watch::channel(String::new());
        Self {
            inspector: EnvironmentInspector::new(kernel),
            search: ContentSearch::new(api.clone()),
            api,
            options,
            fsm: DeployFsm::new(),
            status_tx,
            sleep_fn: poller::tokio_sleep(),
        }
    }

    /// Replace the delay used between poll requests
    pub fn with_sleep(mut self, sleep_fn: SleepFn) -> Self {
        self.sleep_fn = sleep_fn;
        self
    }

    /// Latest deploy status text; each new snapshot replaces the previous one
    pub fn subscribe_status(&self) -> watch::Receiver<String> {
        self.status_tx.subscribe()
    }

    pub fn state(&self) -> DeployState {
        self.fsm.state()
    }

    pub fn fsm(&self) -> &DeployFsm {
        &self.fsm
    }

    /// Error of the last failed attempt
    pub fn last_error(&self) -> Option<&str> {
        self.fsm.error()
    }

    /// Decide between new content and overwriting existing content.
    ///
    /// A redeploy under the title last used on this server goes straight to
    /// the recorded content. Otherwise the server is searched; no match means
    /// new content, any match needs the user's choice.
    pub async fn resolve_target(
        &self,
        registry: &ServerRegistry,
        server_id: &str,
        title: &str,
        selection: Option<DeployLocation>,
    ) -> Result<TargetDecision, PublishError> {
        if let Some(location) = selection {
            return Ok(TargetDecision::Resolved(location));
        }

        let entry = registry
            .get(server_id)
            .ok_or_else(|| PublishError::NotFound(format!("server {}", server_id)))?;

        if let (Some(app_id), Some(last_title)) = (&entry.last_app_id, &entry.last_title) {
            if last_title == title {
                debug!("Redeploying '{}' to content {}", title, app_id);
                return Ok(TargetDecision::Resolved(DeployLocation::Existing(app_id.clone())));
            }
        }

        let results = self
            .search
            .search(registry, server_id, title, entry.last_app_id.as_ref())
            .await?;

        if results.is_empty() {
            Ok(TargetDecision::Resolved(DeployLocation::New))
        } else {
            Ok(TargetDecision::NeedsSelection(results))
        }
    }

    /// Publish to a location that is already known
    pub async fn publish(
        &mut self,
        registry: &mut ServerRegistry,
        notebook: &dyn NotebookHost,
        request: PublishRequest,
    ) -> Result<DeployOutcome, PublishError> {
        let location = request.location.clone().unwrap_or(DeployLocation::New);
        let request = PublishRequest {
            location: Some(location),
            ..request
        };

        match self.publish_or_search(registry, notebook, request).await? {
            PublishFlow::Published(outcome) => Ok(outcome),
            PublishFlow::NeedsSelection(_) => Err(PublishError::Internal(
                "target selection requested for a resolved location".to_string(),
            )),
        }
    }

    /// Run a publish action: inspect the environment for source deploys,
    /// resolve the target, then deploy, poll, and record the result.
    pub async fn publish_or_search(
        &mut self,
        registry: &mut ServerRegistry,
        notebook: &dyn NotebookHost,
        request: PublishRequest,
    ) -> Result<PublishFlow, PublishError> {
        if self.fsm.state().is_busy() {
            return Err(PublishError::Internal(format!(
                "a deploy is already running ({:?})",
                self.fsm.state()
            )));
        }
        if matches!(self.fsm.state(), DeployState::Succeeded | DeployState::Failed) {
            self.transition(DeployEvent::Reset)?;
        }

        let entry = registry
            .get(&request.server_id)
            .ok_or_else(|| PublishError::NotFound(format!("server {}", request.server_id)))?;
        let connection = registry.connection(&request.server_id).ok_or_else(|| {
            PublishError::ConfigError(format!("no API key for {}", entry.address))
        })?;

        let environment = match request.app_mode {
            AppMode::DocumentWithSource => {
                self.transition(DeployEvent::Inspect)?;
                match self.inspector.inspect(notebook.local_path()).await {
                    Ok(snapshot) => Some(snapshot),
                    Err(e) => return Err(self.fail(e)),
                }
            }
            AppMode::Static => None,
        };

        let decision = self
            .resolve_target(
                registry,
                &request.server_id,
                &request.title,
                request.location.clone(),
            )
            .await;
        let location = match decision {
            Ok(TargetDecision::Resolved(location)) => location,
            Ok(TargetDecision::NeedsSelection(results)) => {
                if self.fsm.state() == DeployState::InspectingEnvironment {
                    self.transition(DeployEvent::Reset)?;
                }
                info!("{} existing item(s) match '{}'", results.len(), request.title);
                return Ok(PublishFlow::NeedsSelection(results));
            }
            Err(e) => return Err(self.fail(e)),
        };

        match self
            .deploy(registry, notebook, &connection, &request, location, environment)
            .await
        {
            Ok(outcome) => Ok(PublishFlow::Published(outcome)),
            Err(e) => Err(self.fail(e)),
        }
    }

    async fn deploy(
        &mut self,
        registry: &mut ServerRegistry,
        notebook: &dyn NotebookHost,
        connection: &ServerConnection,
        request: &PublishRequest,
        location: DeployLocation,
        environment: Option<EnvironmentSnapshot>,
    ) -> Result<DeployOutcome, PublishError> {
        self.transition(DeployEvent::Submit)?;
        self.status_tx.send_replace(String::new());

        let deploy_request = DeployRequest {
            notebook_path: encode_notebook_path(notebook.path()),
            notebook_title: request.title.clone(),
            notebook_name: generate_content_name(&request.title),
            app_id: location.target_app_id().cloned(),
            server_address: connection.address.clone(),
            api_key: connection.api_key.clone(),
            app_mode: request.app_mode,
            environment: environment.map(EnvironmentSnapshot::into_value),
            files: request.files.clone(),
            tls: connection.tls.clone(),
        };

        info!(
            "Deploying '{}' to {} ({:?})",
            request.title, connection.address, location
        );
        let response = self
            .api
            .deploy(&deploy_request)
            .await
            .map_err(|e| PublishError::DeploySubmission(e.server_message()))?;

        let mut task = DeployTask::new(response.task_id, response.app_id, response.cookies);
        self.transition(DeployEvent::Submitted)?;

        let log = poller::poll_until_finished(
            self.api.as_ref(),
            connection,
            &mut task,
            &self.options,
            &self.sleep_fn,
            &self.status_tx,
        )
        .await?;
        self.transition(DeployEvent::TaskSucceeded)?;

        let config = self
            .api
            .app_config(&AppConfigRequest {
                server_address: connection.address.clone(),
                api_key: connection.api_key.clone(),
                app_id: task.app_id.clone(),
                tls: connection.tls.clone(),
            })
            .await
            .map_err(|e| PublishError::DeployExecution(e.server_message()))?;

        registry.set_previous_server(&request.server_id);
        registry
            .update_server(
                &request.server_id,
                task.app_id.clone(),
                &request.title,
                request.app_mode,
                Some(config.config_url.clone()),
            )
            .await;
        self.transition(DeployEvent::Finalized)?;

        info!("Deployed '{}' to {}", request.title, config.config_url);
        Ok(DeployOutcome {
            server_id: request.server_id.clone(),
            app_id: task.app_id,
            title: request.title.clone(),
            app_mode: request.app_mode,
            config_url: config.config_url,
            log,
        })
    }

    /// Capture the environment and have the notebook server write the
    /// deploy manifest next to the notebook, without publishing.
    ///
    /// Returns the files the server reports writing.
    pub async fn write_manifest(
        &self,
        notebook: &dyn NotebookHost,
        title: &str,
    ) -> Result<Vec<String>, PublishError> {
        if self.fsm.state().is_busy() {
            return Err(PublishError::Internal(format!(
                "a deploy is already running ({:?})",
                self.fsm.state()
            )));
        }

        let snapshot = self.inspector.inspect(notebook.local_path()).await?;
        let response = self
            .api
            .write_manifest(&WriteManifestRequest {
                notebook_path: encode_notebook_path(notebook.path()),
                notebook_name: generate_content_name(title),
                environment: snapshot.into_value(),
            })
            .await
            .map_err(|e| PublishError::DeploySubmission(e.server_message()))?;

        info!("Wrote manifest for {}: {:?}", notebook.path(), response.created);
        Ok(response.created)
    }

    fn transition(&mut self, event: DeployEvent) -> Result<(), PublishError> {
        self.fsm.process(event).map_err(PublishError::Internal)
    }

    /// Record a failure and return to idle
    fn fail(&mut self, err: PublishError) -> PublishError {
        error!("Deploy failed: {}", err);
        if self.fsm.state().is_busy() {
            let _ = self.fsm.process(DeployEvent::Fail(err.server_message()));
            let _ = self.fsm.process(DeployEvent::Reset);
        }
        err
    }
}
