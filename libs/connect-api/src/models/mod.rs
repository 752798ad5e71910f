//! API models

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of a piece of published content.
///
/// The remote service issues numeric ids but some endpoints echo them back
/// as strings, so both forms are accepted. Numeric ids are written as JSON
/// numbers since the notebook server formats them with `%d`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppId(String);

impl AppId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for AppId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for AppId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Serialize for AppId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.0.parse::<u64>() {
            Ok(n) => serializer.serialize_u64(n),
            Err(_) => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for AppId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(AppId(n.to_string())),
            Raw::Text(s) => Ok(AppId(s)),
        }
    }
}

/// How a notebook is published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppMode {
    /// Rendered document only
    #[serde(rename = "static")]
    Static,

    /// Rendered document plus the source and its environment
    #[serde(rename = "jupyter-static")]
    DocumentWithSource,
}

impl AppMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppMode::Static => "static",
            AppMode::DocumentWithSource => "jupyter-static",
        }
    }
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(AppMode::Static),
            "jupyter-static" | "source" => Ok(AppMode::DocumentWithSource),
            _ => Err(format!("Invalid app mode: {}", s)),
        }
    }
}

/// How the notebook server checks the content server's certificate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsOptions {
    #[serde(default)]
    pub disable_tls_check: bool,

    /// PEM bundle of extra certificate authorities
    #[serde(default)]
    pub cadata: Option<String>,
}

/// Server verification request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyServerRequest {
    pub server_address: String,
    pub api_key: String,
    #[serde(flatten)]
    pub tls: TlsOptions,
}

/// Server verification response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyServerResponse {
    pub address_hash: String,
    pub server_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// One server as kept in the external config store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfigEntry {
    pub server: String,
    #[serde(rename = "serverName")]
    pub server_name: String,
    #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(rename = "disableTLSCheck", default)]
    pub disable_tls_check: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cadata: Option<String>,
}

/// Config store document, keyed by server id
pub type ServerConfigMap = BTreeMap<String, ServerConfigEntry>;

/// Content lookup request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppGetRequest {
    pub app_id: AppId,
    pub server_address: String,
    pub api_key: String,
    #[serde(flatten)]
    pub tls: TlsOptions,
}

/// Content details returned by the remote service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
    pub id: AppId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Content search request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSearchRequest {
    pub notebook_title: String,
    pub app_id: Option<AppId>,
    pub server_address: String,
    pub api_key: String,
    #[serde(flatten)]
    pub tls: TlsOptions,
}

/// A candidate returned by content search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSearchResult {
    pub id: AppId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub config_url: Option<String>,
    #[serde(default)]
    pub app_mode: Option<AppMode>,
}

/// Deploy request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub notebook_path: String,
    pub notebook_title: String,
    pub notebook_name: String,
    /// `None` creates new content
    pub app_id: Option<AppId>,
    pub server_address: String,
    pub api_key: String,
    pub app_mode: AppMode,
    pub environment: Option<serde_json::Value>,
    /// Extra files shipped with the notebook, relative to its directory
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(flatten)]
    pub tls: TlsOptions,
}

/// Deploy response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployResponse {
    pub task_id: String,
    pub app_id: AppId,
    #[serde(default)]
    pub cookies: Vec<String>,
}

/// Task log poll request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPollRequest {
    pub server_address: String,
    pub api_key: String,
    pub task_id: String,
    pub last_status: Option<u64>,
    pub cookies: Vec<String>,
    #[serde(flatten)]
    pub tls: TlsOptions,
}

/// Task log poll response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPollResponse {
    #[serde(default)]
    pub last_status: Option<u64>,
    #[serde(default)]
    pub status: Vec<String>,
    pub finished: bool,
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub error: Option<String>,
}

/// Content configuration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfigRequest {
    pub server_address: String,
    pub api_key: String,
    pub app_id: AppId,
    #[serde(flatten)]
    pub tls: TlsOptions,
}

/// Content configuration response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfigResponse {
    pub config_url: String,
    #[serde(default)]
    pub logs_url: Option<String>,
}

/// Manifest request: writes the deploy manifest next to the notebook
/// without publishing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteManifestRequest {
    pub notebook_path: String,
    pub notebook_name: String,
    pub environment: serde_json::Value,
}

/// Manifest response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteManifestResponse {
    /// Files the notebook server wrote
    #[serde(default)]
    pub created: Vec<String>,
}

/// Error response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorResponse {
    /// The most specific message the body carries
    pub fn into_message(self) -> Option<String> {
        self.message
            .filter(|m| !m.is_empty())
            .or(self.error.filter(|e| !e.is_empty()))
    }
}
