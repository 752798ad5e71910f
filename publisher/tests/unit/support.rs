//! Test doubles for the publisher's trait seams

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use connect_api::{
    AppConfigRequest, AppConfigResponse, AppGetRequest, AppId, AppInfo, AppSearchRequest,
    AppSearchResult, DeployRequest, DeployResponse, LogPollRequest, LogPollResponse,
    ServerConfigMap, VerifyServerRequest, VerifyServerResponse, WriteManifestRequest,
    WriteManifestResponse,
};
use futures::future::BoxFuture;
use nbpublish::deploy::poller::SleepFn;
use nbpublish::environment::{Kernel, KernelCommand, KernelOutput};
use nbpublish::errors::PublishError;
use nbpublish::http::{ConfigStore, ConnectApi};
use nbpublish::notebook::NotebookHost;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

/// Address hash the fake server hands out for `address`
pub fn address_hash(address: &str) -> String {
    let digest = Sha256::digest(address.as_bytes());
    format!("{:x}", digest)[..16].to_string()
}

pub fn poll_response(
    last_status: Option<u64>,
    status: &[&str],
    finished: bool,
    code: i64,
) -> LogPollResponse {
    LogPollResponse {
        last_status,
        status: status.iter().map(|s| s.to_string()).collect(),
        finished,
        code,
        error: None,
    }
}

pub fn search_result(id: u64, title: &str) -> AppSearchResult {
    AppSearchResult {
        id: AppId::from(id),
        name: Some(format!("{}-1700000000000", title)),
        title: Some(title.to_string()),
        config_url: Some(format!("https://connect.example.com/connect/#/apps/{}", id)),
        app_mode: None,
    }
}

/// Recording fake of the publishing endpoints
#[derive(Default)]
pub struct FakeApi {
    pub verify_calls: Mutex<Vec<VerifyServerRequest>>,
    pub get_calls: Mutex<Vec<AppGetRequest>>,
    pub search_calls: Mutex<Vec<AppSearchRequest>>,
    pub deploy_calls: Mutex<Vec<DeployRequest>>,
    pub poll_calls: Mutex<Vec<LogPollRequest>>,
    pub config_calls: Mutex<Vec<AppConfigRequest>>,
    pub manifest_calls: Mutex<Vec<WriteManifestRequest>>,

    pub search_results: Mutex<Vec<AppSearchResult>>,
    pub poll_responses: Mutex<VecDeque<LogPollResponse>>,
    pub app_info: Mutex<Option<AppInfo>>,
    pub verify_error: Mutex<Option<String>>,
    pub deploy_error: Mutex<Option<String>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a task that reports progress twice, then succeeds
    pub fn queue_successful_task(&self) {
        let mut responses = self.poll_responses.lock().unwrap();
        responses.push_back(poll_response(Some(1), &["Building"], false, 0));
        responses.push_back(poll_response(Some(2), &["Building", "Bundling"], false, 0));
        responses.push_back(poll_response(
            Some(3),
            &["Building", "Bundling", "Deployed"],
            true,
            0,
        ));
    }

    pub fn queue_poll(&self, response: LogPollResponse) {
        self.poll_responses.lock().unwrap().push_back(response);
    }

    pub fn set_search_results(&self, results: Vec<AppSearchResult>) {
        *self.search_results.lock().unwrap() = results;
    }

    pub fn fail_verify(&self, message: &str) {
        *self.verify_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_deploy(&self, message: &str) {
        *self.deploy_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn verify_count(&self) -> usize {
        self.verify_calls.lock().unwrap().len()
    }

    pub fn search_count(&self) -> usize {
        self.search_calls.lock().unwrap().len()
    }

    pub fn deploy_requests(&self) -> Vec<DeployRequest> {
        self.deploy_calls.lock().unwrap().clone()
    }

    pub fn poll_requests(&self) -> Vec<LogPollRequest> {
        self.poll_calls.lock().unwrap().clone()
    }

    pub fn config_count(&self) -> usize {
        self.config_calls.lock().unwrap().len()
    }

    pub fn config_requests(&self) -> Vec<AppConfigRequest> {
        self.config_calls.lock().unwrap().clone()
    }

    pub fn search_requests(&self) -> Vec<AppSearchRequest> {
        self.search_calls.lock().unwrap().clone()
    }
}

fn remote(status: u16, message: &str) -> PublishError {
    PublishError::Remote {
        status,
        message: message.to_string(),
    }
}

#[async_trait]
impl ConnectApi for FakeApi {
    async fn verify_server(
        &self,
        request: &VerifyServerRequest,
    ) -> Result<VerifyServerResponse, PublishError> {
        self.verify_calls.lock().unwrap().push(request.clone());
        if let Some(message) = self.verify_error.lock().unwrap().clone() {
            return Err(remote(400, &message));
        }
        Ok(VerifyServerResponse {
            address_hash: address_hash(&request.server_address),
            server_address: request.server_address.clone(),
            status: None,
        })
    }

    async fn app_get(&self, request: &AppGetRequest) -> Result<AppInfo, PublishError> {
        self.get_calls.lock().unwrap().push(request.clone());
        self.app_info
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| remote(404, "content not found"))
    }

    async fn app_search(
        &self,
        request: &AppSearchRequest,
    ) -> Result<Vec<AppSearchResult>, PublishError> {
        self.search_calls.lock().unwrap().push(request.clone());
        Ok(self.search_results.lock().unwrap().clone())
    }

    async fn deploy(&self, request: &DeployRequest) -> Result<DeployResponse, PublishError> {
        self.deploy_calls.lock().unwrap().push(request.clone());
        if let Some(message) = self.deploy_error.lock().unwrap().clone() {
            return Err(remote(500, &message));
        }
        Ok(DeployResponse {
            task_id: "task-1".to_string(),
            app_id: request.app_id.clone().unwrap_or_else(|| AppId::from(42)),
            cookies: vec!["session=abc".to_string()],
        })
    }

    async fn get_log(&self, request: &LogPollRequest) -> Result<LogPollResponse, PublishError> {
        self.poll_calls.lock().unwrap().push(request.clone());
        Ok(self
            .poll_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| poll_response(None, &[], false, 0)))
    }

    async fn app_config(
        &self,
        request: &AppConfigRequest,
    ) -> Result<AppConfigResponse, PublishError> {
        self.config_calls.lock().unwrap().push(request.clone());
        Ok(AppConfigResponse {
            config_url: format!("{}connect/#/apps/{}", request.server_address, request.app_id),
            logs_url: None,
        })
    }

    async fn write_manifest(
        &self,
        request: &WriteManifestRequest,
    ) -> Result<WriteManifestResponse, PublishError> {
        self.manifest_calls.lock().unwrap().push(request.clone());
        Ok(WriteManifestResponse {
            created: vec!["manifest.json".to_string(), "requirements.txt".to_string()],
        })
    }
}

/// In-memory config store
#[derive(Default)]
pub struct FakeStore {
    pub stored: Mutex<ServerConfigMap>,
    pub saves: AtomicUsize,
    pub failing: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_config(config: ServerConfigMap) -> Arc<Self> {
        let store = Self::default();
        *store.stored.lock().unwrap() = config;
        Arc::new(store)
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ServerConfigMap {
        self.stored.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigStore for FakeStore {
    async fn fetch(&self) -> Result<ServerConfigMap, PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::ConfigPersistence("store offline".to_string()));
        }
        Ok(self.snapshot())
    }

    async fn save(&self, config: &ServerConfigMap) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::ConfigPersistence("store offline".to_string()));
        }
        *self.stored.lock().unwrap() = config.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Notebook kept in memory
pub struct FakeNotebook {
    path: String,
    local_path: PathBuf,
    pub metadata: Mutex<Map<String, Value>>,
    pub saves: AtomicUsize,
    pub failing: AtomicBool,
}

impl FakeNotebook {
    /// Notebook the server knows as `path`, stored under `/srv/notebooks`
    pub fn new(path: &str) -> Arc<Self> {
        Self::at(path, Path::new("/srv/notebooks").join(path))
    }

    /// Notebook whose server path and local file differ
    pub fn at(path: &str, local_path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            path: path.to_string(),
            local_path: local_path.into(),
            metadata: Mutex::new(Map::new()),
            saves: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        })
    }

    pub fn with_metadata(path: &str, key: &str, value: Value) -> Arc<Self> {
        let notebook = Self::new(path);
        notebook
            .metadata
            .lock()
            .unwrap()
            .insert(key.to_string(), value);
        notebook
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.metadata.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl NotebookHost for FakeNotebook {
    fn path(&self) -> &str {
        &self.path
    }

    fn local_path(&self) -> &Path {
        &self.local_path
    }

    fn name(&self) -> String {
        let file = self.path.rsplit('/').next().unwrap_or(&self.path);
        file.strip_suffix(".ipynb").unwrap_or(file).to_string()
    }

    async fn metadata(&self, key: &str) -> Option<Value> {
        self.get(key)
    }

    async fn save_metadata(&self, key: &str, value: Value) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::IoError(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only notebook",
            )));
        }
        self.metadata.lock().unwrap().insert(key.to_string(), value);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Kernel replaying canned output
pub struct FakeKernel {
    output: Vec<KernelOutput>,
    pub commands: Mutex<Vec<KernelCommand>>,
}

impl FakeKernel {
    /// Kernel printing `fragments` on stdout, then exiting cleanly
    pub fn new(fragments: &[&str]) -> Arc<Self> {
        let mut output: Vec<KernelOutput> = fragments
            .iter()
            .map(|f| KernelOutput::Stdout(f.to_string()))
            .collect();
        output.push(KernelOutput::Exited(Some(0)));
        Self::replaying(output)
    }

    pub fn replaying(output: Vec<KernelOutput>) -> Arc<Self> {
        Arc::new(Self {
            output,
            commands: Mutex::new(Vec::new()),
        })
    }

    pub fn last_command(&self) -> Option<KernelCommand> {
        self.commands.lock().unwrap().last().cloned()
    }

    pub fn command_count(&self) -> usize {
        self.commands.lock().unwrap().len()
    }
}

#[async_trait]
impl Kernel for FakeKernel {
    async fn interpreter(&self) -> Result<String, PublishError> {
        Ok("/opt/python/bin/python3".to_string())
    }

    async fn execute(
        &self,
        command: KernelCommand,
    ) -> Result<mpsc::Receiver<KernelOutput>, PublishError> {
        self.commands.lock().unwrap().push(command);
        let (tx, rx) = mpsc::channel(self.output.len() + 1);
        for chunk in &self.output {
            let _ = tx.try_send(chunk.clone());
        }
        Ok(rx)
    }
}

/// Sleep that returns at once and records the requested delays
pub fn recording_sleep() -> (SleepFn, Arc<Mutex<Vec<Duration>>>) {
    let delays = Arc::new(Mutex::new(Vec::new()));
    let recorded = delays.clone();
    let sleep_fn: SleepFn = Arc::new(move |duration: Duration| -> BoxFuture<'static, ()> {
        recorded.lock().unwrap().push(duration);
        Box::pin(async {})
    });
    (sleep_fn, delays)
}
