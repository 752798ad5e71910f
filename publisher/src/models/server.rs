//! Server registry models

use std::collections::{BTreeMap, HashMap};

use connect_api::{AppId, AppMode, ServerConfigEntry, TlsOptions};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::errors::PublishError;

/// Key under which the registry lives in the notebook's metadata block
pub const METADATA_KEY: &str = "rsconnect";

/// Current notebook metadata layout version
pub const METADATA_VERSION: u32 = 1;

/// Validate a server address and make sure it ends with `/`.
///
/// Normalizing an already normalized address returns it unchanged.
pub fn normalize_address(address: &str) -> Result<String, PublishError> {
    let trimmed = address.trim();
    let parsed = url::Url::parse(trimmed).map_err(|e| PublishError::Verification {
        address: trimmed.to_string(),
        message: e.to_string(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(PublishError::Verification {
            address: trimmed.to_string(),
            message: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }

    let mut normalized = trimmed.to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Ok(normalized)
}

/// A registered publishing target.
///
/// Never carries a credential: entries are written verbatim into notebook
/// metadata, which is routinely shared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    /// Server id, the map key in every persisted form
    #[serde(skip)]
    pub id: String,

    #[serde(rename = "server")]
    pub address: String,

    #[serde(rename = "serverName")]
    pub display_name: String,

    #[serde(rename = "appId", default, skip_serializing_if = "Option::is_none")]
    pub last_app_id: Option<AppId>,

    #[serde(rename = "notebookTitle", default, skip_serializing_if = "Option::is_none")]
    pub last_title: Option<String>,

    #[serde(rename = "appMode", default, skip_serializing_if = "Option::is_none")]
    pub app_mode: Option<AppMode>,

    #[serde(rename = "configUrl", default, skip_serializing_if = "Option::is_none")]
    pub config_url: Option<String>,

    /// Skip certificate verification when talking to this server
    #[serde(rename = "disableTLSCheck", default)]
    pub disable_tls_check: bool,
}

impl ServerEntry {
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            display_name: display_name.into(),
            last_app_id: None,
            last_title: None,
            app_mode: None,
            config_url: None,
            disable_tls_check: false,
        }
    }

    /// Config store form, with the credentials attached
    pub fn to_config_entry(&self, api_key: Option<&str>, cadata: Option<&str>) -> ServerConfigEntry {
        ServerConfigEntry {
            server: self.address.clone(),
            server_name: self.display_name.clone(),
            api_key: api_key.map(str::to_string),
            disable_tls_check: self.disable_tls_check,
            cadata: cadata.map(str::to_string),
        }
    }
}

/// Address, API key and TLS settings sent with every request to one server
#[derive(Clone)]
pub struct ServerConnection {
    pub address: String,
    pub api_key: String,
    pub tls: TlsOptions,
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("address", &self.address)
            .field("disable_tls_check", &self.tls.disable_tls_check)
            .finish()
    }
}

/// Deployment state embedded in the notebook document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookDeploymentMetadata {
    pub version: u32,

    #[serde(rename = "previousServerId", default)]
    pub previous_server_id: Option<String>,

    #[serde(default)]
    pub servers: BTreeMap<String, ServerEntry>,
}

impl Default for NotebookDeploymentMetadata {
    fn default() -> Self {
        Self {
            version: METADATA_VERSION,
            previous_server_id: None,
            servers: BTreeMap::new(),
        }
    }
}

impl NotebookDeploymentMetadata {
    /// Parse the metadata blob, filling entry ids from their keys and
    /// dropping a previous-server pointer that names an unknown server.
    pub fn from_value(value: serde_json::Value) -> Result<Self, PublishError> {
        let mut metadata: Self = serde_json::from_value(value)?;
        for (id, entry) in metadata.servers.iter_mut() {
            entry.id = id.clone();
        }
        metadata.normalize();
        Ok(metadata)
    }

    /// Coerce a dangling previous-server pointer to `None`
    pub fn normalize(&mut self) {
        let dangling = self
            .previous_server_id
            .as_ref()
            .is_some_and(|id| !self.servers.contains_key(id));
        if dangling {
            self.previous_server_id = None;
        }
    }
}

/// API keys and CA bundles keyed by normalized server address
#[derive(Default)]
pub struct CredentialStore {
    keys: HashMap<String, SecretString>,
    certificates: HashMap<String, SecretString>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &str) -> Option<&str> {
        self.keys.get(address).map(|key| key.expose_secret())
    }

    pub fn set(&mut self, address: impl Into<String>, api_key: &str) {
        self.keys
            .insert(address.into(), SecretString::from(api_key.to_string()));
    }

    pub fn ca_data(&self, address: &str) -> Option<&str> {
        self.certificates.get(address).map(|data| data.expose_secret())
    }

    /// Replace the CA bundle for `address`; `None` or an empty bundle clears it
    pub fn set_ca_data(&mut self, address: impl Into<String>, cadata: Option<&str>) {
        let address = address.into();
        match cadata.filter(|data| !data.trim().is_empty()) {
            Some(data) => {
                self.certificates
                    .insert(address, SecretString::from(data.to_string()));
            }
            None => {
                self.certificates.remove(&address);
            }
        }
    }

    /// Insert only when the address has no key yet
    pub fn set_if_absent(&mut self, address: &str, api_key: &str, cadata: Option<&str>) {
        if !self.contains(address) {
            self.set(address, api_key);
            self.set_ca_data(address, cadata);
        }
    }

    pub fn remove(&mut self, address: &str) {
        self.keys.remove(address);
        self.certificates.remove(address);
    }

    pub fn contains(&self, address: &str) -> bool {
        self.keys.contains_key(address)
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("addresses", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}
