//! Server registry tests

use std::collections::BTreeMap;

use connect_api::{AppId, AppMode, ServerConfigEntry, TlsOptions};
use nbpublish::errors::PublishError;
use nbpublish::models::server::METADATA_KEY;
use nbpublish::registry::ServerRegistry;
use nbpublish::verify::Verifier;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use crate::support::{address_hash, FakeApi, FakeNotebook, FakeStore};

fn stored(address: &str, name: &str, api_key: Option<&str>) -> ServerConfigEntry {
    ServerConfigEntry {
        server: address.to_string(),
        server_name: name.to_string(),
        api_key: api_key.map(str::to_string),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_add_server_normalizes_and_is_reproducible() {
    let api = FakeApi::new();
    let verifier = Verifier::new(api.clone());
    let notebook = FakeNotebook::new("work/report.ipynb");
    let store = FakeStore::new();
    let mut registry = ServerRegistry::new(notebook.clone(), store.clone());

    let id = assert_ok!(
        registry
            .add_server(&verifier, "https://connect.example.com", "dev", "key-1")
            .await
    );

    assert_eq!(registry.len(), 1);
    let entry = registry.get(&id).unwrap();
    assert_eq!(entry.address, "https://connect.example.com/");
    assert_eq!(entry.display_name, "dev");
    assert_eq!(id, address_hash("https://connect.example.com/"));
    assert_eq!(
        api.verify_calls.lock().unwrap()[0].server_address,
        "https://connect.example.com/"
    );

    // same address again, already normalized
    let again = assert_ok!(
        registry
            .add_server(&verifier, "https://connect.example.com/", "dev", "key-1")
            .await
    );
    assert_eq!(again, id);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_failed_verification_changes_nothing() {
    let api = FakeApi::new();
    api.fail_verify("connection refused");
    let verifier = Verifier::new(api.clone());
    let store = FakeStore::new();
    let notebook = FakeNotebook::new("report.ipynb");
    let mut registry = ServerRegistry::new(notebook.clone(), store.clone());

    let err = assert_err!(
        registry
            .add_server(&verifier, "https://connect.example.com", "dev", "key-1")
            .await
    );
    match err {
        PublishError::Verification { address, message } => {
            assert_eq!(address, "https://connect.example.com/");
            assert_eq!(message, "connection refused");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert!(registry.is_empty());
    assert_eq!(store.save_count(), 0);
    assert!(notebook.get(METADATA_KEY).is_none());
}

#[tokio::test]
async fn test_invalid_address_is_rejected_before_verification() {
    let api = FakeApi::new();
    let verifier = Verifier::new(api.clone());
    let mut registry = ServerRegistry::new(FakeNotebook::new("a.ipynb"), FakeStore::new());

    let result = registry
        .add_server(&verifier, "ftp://connect.example.com", "dev", "key")
        .await;
    assert!(matches!(result, Err(PublishError::Verification { .. })));
    assert_eq!(api.verify_count(), 0);
}

#[tokio::test]
async fn test_credentials_stay_out_of_notebook_metadata() {
    let api = FakeApi::new();
    let verifier = Verifier::new(api.clone());
    let notebook = FakeNotebook::new("report.ipynb");
    let store = FakeStore::new();
    let mut registry = ServerRegistry::new(notebook.clone(), store.clone());

    let id = registry
        .add_server(&verifier, "https://connect.example.com", "dev", "s3cret-key")
        .await
        .unwrap();

    let metadata = notebook.get(METADATA_KEY).unwrap();
    assert!(!metadata.to_string().contains("s3cret-key"));
    assert_eq!(metadata["version"], json!(1));
    assert_eq!(
        metadata["servers"][&id]["server"],
        json!("https://connect.example.com/")
    );
    assert!(metadata["servers"][&id].get("apiKey").is_none());

    let config = store.snapshot();
    assert_eq!(config[&id].api_key.as_deref(), Some("s3cret-key"));
    assert_eq!(config[&id].server_name, "dev");
}

#[tokio::test]
async fn test_load_drops_dangling_previous_server() {
    let notebook = FakeNotebook::with_metadata(
        "report.ipynb",
        METADATA_KEY,
        json!({
            "version": 1,
            "previousServerId": "gone",
            "servers": {
                "abc": {"server": "https://a.example.com/", "serverName": "a"}
            }
        }),
    );
    let registry = ServerRegistry::load(notebook, FakeStore::new()).await;

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get("abc").unwrap().id, "abc");
    assert!(registry.previous_server_id().is_none());
}

#[tokio::test]
async fn test_load_ignores_unreadable_metadata() {
    let notebook =
        FakeNotebook::with_metadata("report.ipynb", METADATA_KEY, json!({"servers": 12}));
    let registry = ServerRegistry::load(notebook, FakeStore::new()).await;
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_fetch_config_keeps_in_memory_entries() {
    let notebook = FakeNotebook::with_metadata(
        "report.ipynb",
        METADATA_KEY,
        json!({
            "version": 1,
            "previousServerId": "abc",
            "servers": {
                "abc": {"server": "https://a.example.com/", "serverName": "mine", "appId": 7}
            }
        }),
    );
    let mut config = BTreeMap::new();
    config.insert(
        "abc".to_string(),
        stored("https://a.example.com/", "theirs", Some("key-a")),
    );
    config.insert(
        "def".to_string(),
        stored("https://b.example.com", "other", Some("key-b")),
    );
    let store = FakeStore::with_config(config);

    let mut registry = ServerRegistry::load(notebook, store.clone()).await;
    assert_ok!(registry.fetch_config().await);

    assert_eq!(registry.len(), 2);
    let abc = registry.get("abc").unwrap();
    assert_eq!(abc.display_name, "mine");
    assert_eq!(abc.last_app_id, Some(AppId::from(7)));
    assert_eq!(registry.api_key_for("abc"), Some("key-a"));

    let def = registry.get("def").unwrap();
    assert_eq!(def.address, "https://b.example.com/");
    assert_eq!(registry.api_key_for("def"), Some("key-b"));

    // nothing was pruned, so nothing was written back
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn test_fetch_config_prunes_entries_without_key() {
    let mut config = BTreeMap::new();
    config.insert(
        "abc".to_string(),
        stored("https://a.example.com/", "a", Some("key-a")),
    );
    config.insert("nokey".to_string(), stored("https://b.example.com/", "b", None));
    let store = FakeStore::with_config(config);

    let mut registry = ServerRegistry::new(FakeNotebook::new("r.ipynb"), store.clone());
    registry.fetch_config().await.unwrap();

    assert_eq!(registry.len(), 1);
    assert!(registry.get("nokey").is_none());
    assert_eq!(store.save_count(), 1);
    assert!(!store.snapshot().contains_key("nokey"));
}

#[tokio::test]
async fn test_fetch_config_keeps_local_credential() {
    let api = FakeApi::new();
    let verifier = Verifier::new(api);
    let mut config = BTreeMap::new();
    let address = "https://connect.example.com/";
    config.insert(
        address_hash(address),
        stored(address, "dev", Some("stale-key")),
    );
    let store = FakeStore::with_config(config);
    let mut registry = ServerRegistry::new(FakeNotebook::new("r.ipynb"), store.clone());

    registry
        .add_server(&verifier, address, "dev", "fresh-key")
        .await
        .unwrap();
    // the add overwrote the store, put the stale copy back
    store
        .stored
        .lock()
        .unwrap()
        .insert(address_hash(address), stored(address, "dev", Some("stale-key")));

    registry.fetch_config().await.unwrap();
    assert_eq!(registry.get_api_key(address), Some("fresh-key"));
}

#[tokio::test]
async fn test_remove_server_clears_previous_and_credential() {
    let api = FakeApi::new();
    let verifier = Verifier::new(api);
    let notebook = FakeNotebook::new("report.ipynb");
    let store = FakeStore::new();
    let mut registry = ServerRegistry::new(notebook.clone(), store.clone());

    let id = registry
        .add_server(&verifier, "https://connect.example.com", "dev", "key-1")
        .await
        .unwrap();
    registry.set_previous_server(&id);
    assert_eq!(registry.previous_server_id(), Some(id.as_str()));

    assert!(registry.remove_server(&id).await);
    assert!(registry.is_empty());
    assert!(registry.previous_server_id().is_none());
    assert!(registry.get_api_key("https://connect.example.com/").is_none());
    assert!(store.snapshot().is_empty());

    let metadata = notebook.get(METADATA_KEY).unwrap();
    assert_eq!(metadata["previousServerId"], json!(null));

    assert!(!registry.remove_server(&id).await);
}

#[tokio::test]
async fn test_persistence_failure_keeps_memory_state() {
    let api = FakeApi::new();
    let verifier = Verifier::new(api);
    let notebook = FakeNotebook::new("report.ipynb");
    notebook.fail();
    let store = FakeStore::new();
    store.fail();
    let mut registry = ServerRegistry::new(notebook, store);

    let id = assert_ok!(
        registry
            .add_server(&verifier, "https://connect.example.com", "dev", "key-1")
            .await
    );
    assert!(registry.get(&id).is_some());
    assert_eq!(registry.api_key_for(&id), Some("key-1"));

    let err = assert_err!(registry.save_config().await);
    assert!(err.is_recoverable());
    let err = assert_err!(registry.save_notebook_metadata().await);
    assert!(matches!(err, PublishError::ConfigPersistence(_)));
}

#[tokio::test]
async fn test_update_server_records_deploy() {
    let api = FakeApi::new();
    let verifier = Verifier::new(api);
    let notebook = FakeNotebook::new("report.ipynb");
    let mut registry = ServerRegistry::new(notebook.clone(), FakeStore::new());
    let id = registry
        .add_server(&verifier, "https://connect.example.com", "dev", "key-1")
        .await
        .unwrap();

    registry
        .update_server(
            &id,
            AppId::from(42),
            "Quarterly Report",
            AppMode::DocumentWithSource,
            Some("https://connect.example.com/connect/#/apps/42".to_string()),
        )
        .await;

    let entry = registry.get(&id).unwrap();
    assert_eq!(entry.last_app_id, Some(AppId::from(42)));
    assert_eq!(registry.notebook_title(Some(&id)), "Quarterly Report");

    let metadata = notebook.get(METADATA_KEY).unwrap();
    assert_eq!(metadata["servers"][&id]["appId"], json!(42));
    assert_eq!(metadata["servers"][&id]["appMode"], json!("jupyter-static"));
    assert_eq!(metadata["servers"][&id]["notebookTitle"], json!("Quarterly Report"));

    // unknown ids are ignored
    registry
        .update_server("missing", AppId::from(1), "x", AppMode::Static, None)
        .await;
    assert!(registry.get("missing").is_none());
}

#[tokio::test]
async fn test_notebook_title_defaults_to_notebook_name() {
    let registry = ServerRegistry::new(FakeNotebook::new("work/report.ipynb"), FakeStore::new());
    assert_eq!(registry.notebook_title(None), "report");
    assert_eq!(registry.notebook_title(Some("unknown")), "report");
}

#[tokio::test]
async fn test_readding_server_keeps_history() {
    let api = FakeApi::new();
    let verifier = Verifier::new(api);
    let mut registry = ServerRegistry::new(FakeNotebook::new("report.ipynb"), FakeStore::new());
    let id = registry
        .add_server(&verifier, "https://connect.example.com", "dev", "key-1")
        .await
        .unwrap();
    registry
        .update_server(&id, AppId::from(9), "Report", AppMode::Static, None)
        .await;

    registry
        .add_server(&verifier, "https://connect.example.com", "prod", "key-2")
        .await
        .unwrap();

    let entry = registry.get(&id).unwrap();
    assert_eq!(entry.display_name, "prod");
    assert_eq!(entry.last_app_id, Some(AppId::from(9)));
    assert_eq!(registry.api_key_for(&id), Some("key-2"));
}

#[tokio::test]
async fn test_tls_settings_are_verified_and_stored() {
    let api = FakeApi::new();
    let verifier = Verifier::new(api.clone());
    let notebook = FakeNotebook::new("report.ipynb");
    let store = FakeStore::new();
    let mut registry = ServerRegistry::new(notebook.clone(), store.clone());
    let tls = TlsOptions {
        disable_tls_check: true,
        cadata: Some("-----BEGIN CERTIFICATE-----\nabc".to_string()),
    };

    let id = assert_ok!(
        registry
            .add_server_with_tls(
                &verifier,
                "https://connect.internal",
                "internal",
                "key-1",
                tls.clone()
            )
            .await
    );

    assert_eq!(api.verify_calls.lock().unwrap()[0].tls, tls);
    assert!(registry.get(&id).unwrap().disable_tls_check);
    assert_eq!(registry.connection(&id).unwrap().tls, tls);

    // the CA bundle travels with the key, never into the notebook
    let config = store.snapshot();
    assert!(config[&id].disable_tls_check);
    assert_eq!(config[&id].cadata, tls.cadata);
    let metadata = notebook.get(METADATA_KEY).unwrap();
    assert_eq!(metadata["servers"][&id]["disableTLSCheck"], json!(true));
    assert!(!metadata.to_string().contains("BEGIN CERTIFICATE"));
}

#[tokio::test]
async fn test_fetch_config_restores_tls_settings() {
    let mut config = BTreeMap::new();
    config.insert(
        "abc".to_string(),
        ServerConfigEntry {
            disable_tls_check: true,
            cadata: Some("PEM".to_string()),
            ..stored("https://connect.internal/", "internal", Some("key-a"))
        },
    );
    let mut registry =
        ServerRegistry::new(FakeNotebook::new("report.ipynb"), FakeStore::with_config(config));
    assert_ok!(registry.fetch_config().await);

    assert!(registry.get("abc").unwrap().disable_tls_check);
    assert_eq!(registry.get_ca_data("https://connect.internal/"), Some("PEM"));
    let connection = registry.connection("abc").unwrap();
    assert_eq!(connection.api_key, "key-a");
    assert_eq!(connection.tls.cadata.as_deref(), Some("PEM"));
}

#[tokio::test]
async fn test_load_normalizes_metadata_addresses() {
    let notebook = FakeNotebook::with_metadata(
        "report.ipynb",
        METADATA_KEY,
        json!({
            "version": 1,
            "previousServerId": "bad",
            "servers": {
                "abc": {"server": "https://a.example.com", "serverName": "a"},
                "bad": {"server": "not an address", "serverName": "b"}
            }
        }),
    );
    let mut config = BTreeMap::new();
    config.insert(
        "abc".to_string(),
        stored("https://a.example.com/", "a", Some("key-a")),
    );

    let mut registry = ServerRegistry::load(notebook, FakeStore::with_config(config)).await;
    assert_ok!(registry.fetch_config().await);

    assert_eq!(registry.get("abc").unwrap().address, "https://a.example.com/");
    assert_eq!(registry.api_key_for("abc"), Some("key-a"));
    assert!(registry.get("bad").is_none());
    assert!(registry.previous_server_id().is_none());
}
