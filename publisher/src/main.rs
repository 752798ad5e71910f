//! Notebook Publisher - Entry Point
//!
//! Registers content servers for a notebook and publishes it to them
//! through the notebook server's publishing endpoints.

use std::collections::HashMap;
use std::env;
use std::process;
use std::sync::Arc;

use colored::Colorize;
use connect_api::{AppId, AppMode, TlsOptions};
use nbpublish::app::options::SessionOptions;
use nbpublish::app::session::PublishSession;
use nbpublish::deploy::orchestrator::{PublishFlow, PublishRequest};
use nbpublish::environment::ProcessKernel;
use nbpublish::http::client::HttpClient;
use nbpublish::http::{ConfigStore, ConnectApi};
use nbpublish::logs::{init_logging, LogOptions};
use nbpublish::models::deployment::DeployLocation;
use nbpublish::notebook::document::NotebookDocument;
use nbpublish::storage::config_store::FileConfigStore;
use nbpublish::storage::layout::StorageLayout;
use nbpublish::storage::settings::{ConfigStoreKind, Settings};
use nbpublish::utils::version_info;

use tracing::{debug, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => println!("{}", version),
            Err(e) => exit_with(&e.to_string()),
        }
        return;
    }

    // Retrieve the settings file
    let layout = StorageLayout::default();
    let settings_file = layout.settings_file();
    let settings = match settings_file.read_json_or_default::<Settings>().await {
        Ok(settings) => settings,
        Err(e) => exit_with(&format!("Unable to read settings file: {}", e)),
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level,
        json_format: settings.log_json,
    };
    if let Err(e) = init_logging(log_options) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let Some(notebook_path) = cli_args.get("notebook") else {
        print_usage();
        process::exit(2);
    };

    let session = match open_session(&settings, &layout, notebook_path, &cli_args).await {
        Ok(session) => session,
        Err(e) => exit_with(&e),
    };

    let result = if cli_args.contains_key("list") {
        list_servers(&session);
        Ok(())
    } else if cli_args.contains_key("add-server") {
        add_server(session, &cli_args).await
    } else if cli_args.contains_key("remove-server") {
        remove_server(session, &cli_args).await
    } else if cli_args.contains_key("publish") {
        publish(session, &cli_args).await
    } else if cli_args.contains_key("write-manifest") {
        write_manifest(&session, &cli_args).await
    } else {
        print_usage();
        Ok(())
    };

    if let Err(e) = result {
        exit_with(&e);
    }
}

async fn open_session(
    settings: &Settings,
    layout: &StorageLayout,
    notebook_path: &str,
    cli_args: &HashMap<String, String>,
) -> Result<PublishSession, String> {
    let client = Arc::new(
        HttpClient::new(
            &settings.notebook_server.base_url,
            settings.notebook_server.token.clone(),
        )
        .map_err(|e| e.to_string())?,
    );

    let config_store: Arc<dyn ConfigStore> = match settings.config_store {
        ConfigStoreKind::Remote => client.clone(),
        ConfigStoreKind::File => Arc::new(FileConfigStore::new(layout.servers_file())),
    };

    // path the notebook server knows the file by, relative to its root
    let server_path = cli_args
        .get("notebook-path")
        .cloned()
        .unwrap_or_else(|| notebook_path.to_string());
    let notebook = NotebookDocument::open(notebook_path, server_path)
        .await
        .map_err(|e| format!("Unable to open notebook {}: {}", notebook_path, e))?;

    debug!(
        "Using {} with {:?} config store",
        client.base_url(),
        settings.config_store
    );
    let api: Arc<dyn ConnectApi> = client;
    let kernel = Arc::new(ProcessKernel::new(settings.python.clone()));

    Ok(PublishSession::open(
        api,
        config_store,
        Arc::new(notebook),
        kernel,
        SessionOptions::from(settings),
    )
    .await)
}

fn list_servers(session: &PublishSession) {
    let registry = session.registry();
    if registry.is_empty() {
        println!("No servers registered. Add one with --add-server.");
        return;
    }

    for entry in registry.servers() {
        let marker = if registry.previous_server_id() == Some(entry.id.as_str()) {
            "*".green().bold().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "{} {}  {}  {}",
            marker,
            entry.id.dimmed(),
            entry.display_name.bold(),
            entry.address
        );
        if let (Some(title), Some(url)) = (&entry.last_title, &entry.config_url) {
            println!("    last deployed '{}' at {}", title, url);
        }
    }
}

async fn add_server(
    mut session: PublishSession,
    cli_args: &HashMap<String, String>,
) -> Result<(), String> {
    let server = required(cli_args, "server")?;
    let name = required(cli_args, "name")?;
    let api_key = required(cli_args, "api-key")?;

    let cadata = match cli_args.get("cadata-file") {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| format!("Unable to read CA bundle {}: {}", path, e))?,
        ),
        None => None,
    };
    let tls = TlsOptions {
        disable_tls_check: cli_args.contains_key("disable-tls-check"),
        cadata,
    };

    let id = session
        .add_server_with_tls(server, name, api_key, tls)
        .await
        .map_err(|e| e.server_message())?;
    println!("{} {} as {}", "Added".green(), name.bold(), id);
    Ok(())
}

async fn remove_server(
    mut session: PublishSession,
    cli_args: &HashMap<String, String>,
) -> Result<(), String> {
    let id = required(cli_args, "id")?;
    if session.remove_server(id).await {
        println!("{} {}", "Removed".green(), id);
        Ok(())
    } else {
        Err(format!("No server with id {}", id))
    }
}

async fn publish(
    mut session: PublishSession,
    cli_args: &HashMap<String, String>,
) -> Result<(), String> {
    let server_id = match cli_args.get("server-id") {
        Some(id) => id.clone(),
        None => session
            .default_server_id()
            .ok_or("No default server, pick one with --server-id")?,
    };

    let title = match cli_args.get("title") {
        Some(title) => title.clone(),
        None => session.default_title(Some(&server_id)),
    };

    let app_mode = match cli_args.get("mode") {
        Some(mode) => mode.parse::<AppMode>()?,
        None => AppMode::Static,
    };

    let location = if let Some(app_id) = cli_args.get("app-id") {
        Some(DeployLocation::Existing(AppId::from(app_id.as_str())))
    } else if cli_args.contains_key("new") {
        Some(DeployLocation::New)
    } else {
        None
    };

    let files: Vec<String> = cli_args
        .get("files")
        .map(|files| {
            files
                .split(',')
                .map(str::trim)
                .filter(|file| !file.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    // show the latest task status as it arrives
    let mut status_rx = session.subscribe_status();
    let printer = tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            if let Some(line) = status.lines().last() {
                println!("{}", line.dimmed());
            }
        }
    });

    info!("Publishing '{}' to {} as {}", title, server_id, app_mode);
    let flow = session
        .publish(PublishRequest {
            server_id,
            title,
            app_mode,
            location,
            files,
        })
        .await;
    printer.abort();

    match flow.map_err(|e| e.server_message())? {
        PublishFlow::Published(outcome) => {
            println!(
                "{} '{}' to {}",
                "Published".green().bold(),
                outcome.title,
                outcome.config_url
            );
        }
        PublishFlow::NeedsSelection(results) => {
            println!("{}", "Existing content matches this title:".yellow());
            for result in results {
                let url = result.config_url.unwrap_or_default();
                println!("  --app-id={}  {}  {}", result.id, result.title.bold(), url);
            }
            println!("Re-run with --app-id=<id> to overwrite, or --new to create new content.");
        }
    }
    Ok(())
}

async fn write_manifest(
    session: &PublishSession,
    cli_args: &HashMap<String, String>,
) -> Result<(), String> {
    let title = match cli_args.get("title") {
        Some(title) => title.clone(),
        None => session.default_title(None),
    };

    let created = session
        .write_manifest(&title)
        .await
        .map_err(|e| e.server_message())?;
    println!("{} {}", "Wrote".green(), created.join(", "));
    Ok(())
}

fn required<'a>(cli_args: &'a HashMap<String, String>, key: &str) -> Result<&'a str, String> {
    cli_args
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| format!("Missing --{}=<value>", key))
}

fn print_usage() {
    println!("Usage:");
    println!("  nbpublish --version");
    println!("  nbpublish --notebook=<file> [--notebook-path=<server path>] --list");
    println!(
        "  nbpublish --notebook=<file> --add-server --server=<url> --name=<name> \
         --api-key=<key> [--disable-tls-check] [--cadata-file=<pem file>]"
    );
    println!("  nbpublish --notebook=<file> --remove-server --id=<server id>");
    println!(
        "  nbpublish --notebook=<file> --publish [--server-id=<id>] [--title=<title>] \
         [--mode=static|jupyter-static] [--app-id=<id>|--new] [--files=<a,b>]"
    );
    println!("  nbpublish --notebook=<file> --write-manifest [--title=<title>]");
}

fn exit_with(message: &str) -> ! {
    eprintln!("{} {}", "error:".red().bold(), message);
    process::exit(1);
}
