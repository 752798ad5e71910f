//! Settings file management

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Publisher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Notebook server hosting the publishing endpoints
    #[serde(default)]
    pub notebook_server: NotebookServerSettings,

    /// Where the server list and API keys are kept
    #[serde(default)]
    pub config_store: ConfigStoreKind,

    /// Seconds between task log polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Polls without progress before a deploy is abandoned
    #[serde(default = "default_max_idle_polls")]
    pub max_idle_polls: u32,

    /// Interpreter used to inspect the notebook environment
    #[serde(default = "default_python")]
    pub python: String,
}

fn default_poll_interval() -> u64 {
    1
}

fn default_max_idle_polls() -> u32 {
    600
}

fn default_python() -> String {
    "python3".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            log_json: false,
            notebook_server: NotebookServerSettings::default(),
            config_store: ConfigStoreKind::default(),
            poll_interval_secs: default_poll_interval(),
            max_idle_polls: default_max_idle_polls(),
            python: default_python(),
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Notebook server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookServerSettings {
    /// Base URL of the notebook server
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Notebook server token, sent as `Authorization: token ...`
    #[serde(default)]
    pub token: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8888".to_string()
}

impl Default for NotebookServerSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
        }
    }
}

/// Backing store for the server list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigStoreKind {
    /// The notebook server's config API
    #[default]
    Remote,

    /// `servers.json` in the storage directory
    File,
}
