//! Registry of publishing targets for one notebook

use std::collections::BTreeMap;
use std::sync::Arc;

use connect_api::{AppId, AppMode, ServerConfigMap, TlsOptions};
use tracing::{debug, info, warn};

use crate::errors::PublishError;
use crate::http::ConfigStore;
use crate::models::server::{
    normalize_address, CredentialStore, NotebookDeploymentMetadata, ServerConnection, ServerEntry,
    METADATA_KEY, METADATA_VERSION,
};
use crate::notebook::NotebookHost;
use crate::verify::Verifier;

/// Known servers, their credentials, and the last server deployed to.
///
/// Entries are mirrored into the notebook metadata (without credentials)
/// and into the config store (with credentials). Persistence failures are
/// logged and never undo an in-memory change.
pub struct ServerRegistry {
    servers: BTreeMap<String, ServerEntry>,
    credentials: CredentialStore,
    previous_server_id: Option<String>,
    notebook: Arc<dyn NotebookHost>,
    config_store: Arc<dyn ConfigStore>,
}

impl ServerRegistry {
    /// Create an empty registry
    pub fn new(notebook: Arc<dyn NotebookHost>, config_store: Arc<dyn ConfigStore>) -> Self {
        Self {
            servers: BTreeMap::new(),
            credentials: CredentialStore::new(),
            previous_server_id: None,
            notebook,
            config_store,
        }
    }

    /// Create a registry from the notebook's deployment metadata.
    ///
    /// Unreadable metadata is ignored; a previous-server pointer naming an
    /// unknown server is dropped. Addresses are normalized so they match the
    /// keys credentials are stored under; entries with an invalid address
    /// are skipped.
    pub async fn load(
        notebook: Arc<dyn NotebookHost>,
        config_store: Arc<dyn ConfigStore>,
    ) -> Self {
        let mut registry = Self::new(notebook, config_store);

        if let Some(value) = registry.notebook.metadata(METADATA_KEY).await {
            match NotebookDeploymentMetadata::from_value(value) {
                Ok(metadata) => {
                    for (id, mut entry) in metadata.servers {
                        match normalize_address(&entry.address) {
                            Ok(address) => {
                                entry.address = address;
                                registry.servers.insert(id, entry);
                            }
                            Err(e) => warn!("Skipping server {} from notebook metadata: {}", id, e),
                        }
                    }
                    registry.previous_server_id = metadata.previous_server_id;
                    registry.drop_dangling_previous();
                }
                Err(e) => warn!("Ignoring unreadable notebook deployment metadata: {}", e),
            }
        }

        debug!("Loaded {} server(s) from notebook metadata", registry.servers.len());
        registry
    }

    pub fn servers(&self) -> impl Iterator<Item = &ServerEntry> {
        self.servers.values()
    }

    pub fn get(&self, id: &str) -> Option<&ServerEntry> {
        self.servers.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn previous_server_id(&self) -> Option<&str> {
        self.previous_server_id.as_deref()
    }

    /// Remember `id` as the last deploy target; ignored for unknown ids
    pub fn set_previous_server(&mut self, id: &str) {
        if self.servers.contains_key(id) {
            self.previous_server_id = Some(id.to_string());
        }
    }

    pub fn get_api_key(&self, address: &str) -> Option<&str> {
        self.credentials.get(address)
    }

    pub fn set_api_key(&mut self, address: &str, api_key: &str) {
        self.credentials.set(address, api_key);
    }

    pub fn get_ca_data(&self, address: &str) -> Option<&str> {
        self.credentials.ca_data(address)
    }

    /// Address, key and TLS settings for requests to server `id`.
    ///
    /// `None` when the server is unknown or has no API key.
    pub fn connection(&self, id: &str) -> Option<ServerConnection> {
        let entry = self.servers.get(id)?;
        let api_key = self.credentials.get(&entry.address)?;
        Some(ServerConnection {
            address: entry.address.clone(),
            api_key: api_key.to_string(),
            tls: TlsOptions {
                disable_tls_check: entry.disable_tls_check,
                cadata: self.credentials.ca_data(&entry.address).map(str::to_string),
            },
        })
    }

    /// API key of a registered server
    pub fn api_key_for(&self, id: &str) -> Option<&str> {
        self.servers
            .get(id)
            .and_then(|entry| self.credentials.get(&entry.address))
    }

    /// Title to offer for the next deploy: the last title published to
    /// `id`, else the notebook name.
    pub fn notebook_title(&self, id: Option<&str>) -> String {
        id.and_then(|id| self.servers.get(id))
            .and_then(|entry| entry.last_title.clone())
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| self.notebook.name())
    }

    /// Verify and register a server that uses the default TLS checks
    pub async fn add_server(
        &mut self,
        verifier: &Verifier,
        address: &str,
        name: &str,
        api_key: &str,
    ) -> Result<String, PublishError> {
        self.add_server_with_tls(verifier, address, name, api_key, TlsOptions::default())
            .await
    }

    /// Verify and register a server, returning its id.
    ///
    /// Nothing is changed when verification fails. The CA bundle is kept
    /// with the API key and never written to the notebook.
    pub async fn add_server_with_tls(
        &mut self,
        verifier: &Verifier,
        address: &str,
        name: &str,
        api_key: &str,
        tls: TlsOptions,
    ) -> Result<String, PublishError> {
        let address = normalize_address(address)?;
        let verified = verifier.verify(&address, api_key, &tls).await?;

        let id = verified.server_id;
        let address = verified.canonical_address;

        let mut entry = match self.servers.remove(&id) {
            // re-adding keeps the deployment history of the entry
            Some(mut existing) => {
                existing.address = address.clone();
                existing.display_name = name.to_string();
                existing
            }
            None => ServerEntry::new(id.clone(), address.clone(), name),
        };
        entry.disable_tls_check = tls.disable_tls_check;
        self.servers.insert(id.clone(), entry);
        self.credentials.set(address.as_str(), api_key);
        self.credentials.set_ca_data(address.as_str(), tls.cadata.as_deref());

        info!("Added server {} ({}) as {}", name, address, id);
        self.persist().await;
        Ok(id)
    }

    /// Forget a server. Returns whether it was known.
    pub async fn remove_server(&mut self, id: &str) -> bool {
        let Some(removed) = self.servers.remove(id) else {
            return false;
        };

        if self.previous_server_id.as_deref() == Some(id) {
            self.previous_server_id = None;
        }

        let address_in_use = self.servers.values().any(|e| e.address == removed.address);
        if !address_in_use {
            self.credentials.remove(&removed.address);
        }

        info!("Removed server {} ({})", removed.display_name, removed.address);
        self.persist().await;
        true
    }

    /// Merge the config store into memory.
    ///
    /// Entries already in memory win. Stored entries without an API key
    /// cannot be published to; they are dropped and the store is rewritten.
    pub async fn fetch_config(&mut self) -> Result<(), PublishError> {
        let fetched = self.config_store.fetch().await?;
        let mut dropped = false;

        for (id, stored) in fetched {
            let Some(api_key) = stored.api_key.filter(|k| !k.is_empty()) else {
                info!("Dropping server {} ({}) without an API key", id, stored.server);
                dropped = true;
                continue;
            };

            let address = match normalize_address(&stored.server) {
                Ok(address) => address,
                Err(e) => {
                    warn!("Skipping stored server {}: {}", id, e);
                    continue;
                }
            };

            self.credentials
                .set_if_absent(&address, &api_key, stored.cadata.as_deref());
            let disable_tls_check = stored.disable_tls_check;
            self.servers.entry(id.clone()).or_insert_with(|| ServerEntry {
                disable_tls_check,
                ..ServerEntry::new(id, address, stored.server_name)
            });
        }

        if dropped {
            self.persist().await;
        }
        Ok(())
    }

    /// Config store form of the registry, credentials attached
    pub fn to_config(&self) -> ServerConfigMap {
        self.servers
            .iter()
            .map(|(id, entry)| {
                let api_key = self.credentials.get(&entry.address);
                let cadata = self.credentials.ca_data(&entry.address);
                (id.clone(), entry.to_config_entry(api_key, cadata))
            })
            .collect()
    }

    /// Write the server list and credentials to the config store
    pub async fn save_config(&self) -> Result<(), PublishError> {
        self.config_store.save(&self.to_config()).await
    }

    /// Notebook metadata form of the registry, no credentials
    pub fn to_metadata(&self) -> NotebookDeploymentMetadata {
        let mut metadata = NotebookDeploymentMetadata {
            version: METADATA_VERSION,
            previous_server_id: self.previous_server_id.clone(),
            servers: self.servers.clone(),
        };
        metadata.normalize();
        metadata
    }

    /// Write the registry into the notebook document.
    ///
    /// A failed save leaves the registry usable in memory.
    pub async fn save_notebook_metadata(&self) -> Result<(), PublishError> {
        let value = serde_json::to_value(self.to_metadata())?;
        self.notebook
            .save_metadata(METADATA_KEY, value)
            .await
            .map_err(|e| PublishError::ConfigPersistence(e.to_string()))
    }

    /// Record where the notebook was last deployed on server `id`.
    ///
    /// Unknown ids are ignored: the entry may have been removed while the
    /// deploy was running.
    pub async fn update_server(
        &mut self,
        id: &str,
        app_id: AppId,
        title: &str,
        app_mode: AppMode,
        config_url: Option<String>,
    ) {
        let Some(entry) = self.servers.get_mut(id) else {
            debug!("Server {} is no longer registered, not recording deploy", id);
            return;
        };

        entry.last_app_id = Some(app_id);
        entry.last_title = Some(title.to_string());
        entry.app_mode = Some(app_mode);
        entry.config_url = config_url;

        if let Err(e) = self.save_notebook_metadata().await {
            warn!("{}", e);
        }
    }

    fn drop_dangling_previous(&mut self) {
        let dangling = self
            .previous_server_id
            .as_ref()
            .is_some_and(|id| !self.servers.contains_key(id));
        if dangling {
            self.previous_server_id = None;
        }
    }

    async fn persist(&self) {
        if let Err(e) = self.save_config().await {
            warn!("{}", e);
        }
        if let Err(e) = self.save_notebook_metadata().await {
            warn!("{}", e);
        }
    }
}
