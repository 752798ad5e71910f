//! Deployment models

use connect_api::{AppId, AppMode, AppSearchResult};
use serde::{Deserialize, Serialize};

/// Language and package manifest captured from the kernel.
///
/// Opaque to the publisher and forwarded as-is in the deploy request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentSnapshot(pub serde_json::Value);

impl EnvironmentSnapshot {
    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

/// An existing piece of content that may be overwritten
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: AppId,
    pub title: String,
    pub config_url: Option<String>,
    pub app_mode: Option<AppMode>,
}

impl From<AppSearchResult> for SearchResult {
    fn from(result: AppSearchResult) -> Self {
        let title = result
            .title
            .filter(|t| !t.is_empty())
            .or(result.name)
            .unwrap_or_default();
        Self {
            id: result.id,
            title,
            config_url: result.config_url,
            app_mode: result.app_mode,
        }
    }
}

/// Where a deploy lands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployLocation {
    /// Create new content
    New,

    /// Overwrite the content with this id
    Existing(AppId),
}

impl DeployLocation {
    pub fn target_app_id(&self) -> Option<&AppId> {
        match self {
            DeployLocation::New => None,
            DeployLocation::Existing(id) => Some(id),
        }
    }
}

/// A running server-side deploy task.
///
/// Lives for one deploy only and is never persisted.
#[derive(Debug, Clone)]
pub struct DeployTask {
    pub task_id: String,
    pub app_id: AppId,
    pub cookies: Vec<String>,
    /// Cursor of the last status line already seen
    pub last_status: Option<u64>,
}

impl DeployTask {
    pub fn new(task_id: String, app_id: AppId, cookies: Vec<String>) -> Self {
        Self {
            task_id,
            app_id,
            cookies,
            last_status: None,
        }
    }

    /// Move the cursor forward. Returns whether it changed.
    pub fn advance(&mut self, last_status: Option<u64>) -> bool {
        if last_status.is_some() && last_status != self.last_status {
            self.last_status = last_status;
            true
        } else {
            false
        }
    }
}

/// Result of a successful deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub server_id: String,
    pub app_id: AppId,
    pub title: String,
    pub app_mode: AppMode,
    pub config_url: String,
    /// Last status snapshot reported by the task
    pub log: Vec<String>,
}
