//! Log polling for a running deploy task

use std::sync::Arc;
use std::time::Duration;

use connect_api::LogPollRequest;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::errors::PublishError;
use crate::http::ConnectApi;
use crate::models::deployment::DeployTask;
use crate::models::server::ServerConnection;

/// Injected delay between poll requests
pub type SleepFn = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

/// Sleep on the tokio timer
pub fn tokio_sleep() -> SleepFn {
    Arc::new(|duration: Duration| -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    })
}

/// Poller options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delay between a response and the next request
    pub interval: Duration,

    /// Polls in a row without a new status before giving up
    pub max_idle_polls: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_idle_polls: 600,
        }
    }
}

/// Poll the task's log until it finishes.
///
/// Requests never overlap: the next one is sent after the previous response
/// and one `interval`. Every response that moves the status cursor replaces
/// the snapshot in `status_tx`. Returns the last snapshot when the task
/// exits with code 0.
pub async fn poll_until_finished(
    api: &dyn ConnectApi,
    connection: &ServerConnection,
    task: &mut DeployTask,
    options: &Options,
    sleep_fn: &SleepFn,
    status_tx: &watch::Sender<String>,
) -> Result<Vec<String>, PublishError> {
    let mut idle_polls: u32 = 0;
    let mut snapshot: Vec<String> = Vec::new();

    loop {
        let request = LogPollRequest {
            server_address: connection.address.clone(),
            api_key: connection.api_key.clone(),
            task_id: task.task_id.clone(),
            last_status: task.last_status,
            cookies: task.cookies.clone(),
            tls: connection.tls.clone(),
        };

        let response = api
            .get_log(&request)
            .await
            .map_err(|e| PublishError::DeployExecution(e.server_message()))?;

        if task.advance(response.last_status) {
            idle_polls = 0;
            let text = response.status.join("\n");
            info!("Task {}: {}", task.task_id, text);
            status_tx.send_replace(text);
            snapshot = response.status;
        } else {
            idle_polls += 1;
        }

        if response.finished {
            if response.code != 0 {
                let reason = response
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| format!("task exited with code {}", response.code));
                warn!("Task {} failed: {}", task.task_id, reason);
                return Err(PublishError::DeployExecution(format!(
                    "Failed to deploy successfully: {}",
                    reason
                )));
            }
            debug!("Task {} finished", task.task_id);
            return Ok(snapshot);
        }

        if idle_polls >= options.max_idle_polls {
            return Err(PublishError::DeployExecution(format!(
                "timed out waiting for task {} after {} polls without new status",
                task.task_id, idle_polls
            )));
        }

        sleep_fn(options.interval).await;
    }
}
