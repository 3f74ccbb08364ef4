mod api;
mod config;
mod orchestrator;

use crate::config::ConfigStore;
use crate::orchestrator::AppState;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use ig_graph::{GraphClient, GraphConfig};
use ig_storage::InsightsStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ig-server", about = "Instagram insights collection service")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "ig-server.toml")]
    config: PathBuf,

    /// Listen address override, e.g. 127.0.0.1:8870.
    #[arg(long)]
    addr: Option<String>,

    /// Verbose logging.
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    let config = match ConfigStore::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!(event = "config_load_failed", path = %args.config.display(), error = %err);
            std::process::exit(1);
        }
    };
    let settings = config.snapshot();

    let addr_text = args.addr.unwrap_or_else(|| settings.addr.clone());
    let addr: SocketAddr = match addr_text.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(event = "listen_addr_invalid", addr = %addr_text, error = %err);
            std::process::exit(1);
        }
    };

    if let Some(parent) = std::path::Path::new(&settings.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                error!(event = "db_dir_create_failed", path = %parent.display(), error = %err);
                std::process::exit(1);
            }
        }
    }
    let store = match InsightsStore::open(&settings.db_path) {
        Ok(store) => store,
        Err(err) => {
            error!(event = "db_open_failed", path = %settings.db_path, error = %err);
            std::process::exit(1);
        }
    };

    let graph = match GraphClient::new(GraphConfig {
        base_url: settings.base_url.clone(),
        oauth_url: settings.oauth_url.clone(),
        account_id: settings.account_id.clone(),
        app_id: settings.app_id.clone(),
        app_secret: settings.app_secret.clone(),
        ..GraphConfig::default()
    }) {
        Ok(graph) => graph,
        Err(err) => {
            error!(event = "graph_client_init_failed", error = %err);
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState {
        graph,
        store: Mutex::new(store),
        config,
    });

    let app = Router::new()
        .route("/api/insights", get(api::account_insights))
        .route("/api/demographics", get(api::demographics))
        .route("/api/posts", get(api::posts))
        .route("/health", get(api::health))
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(event = "bind_failed", addr = %addr, error = %err);
            std::process::exit(1);
        }
    };
    info!(event = "server_listening", addr = %addr, account = %settings.account_id);

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(event = "server_error", error = %err);
        std::process::exit(1);
    }
    info!(event = "server_stopped");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(event = "shutdown_signal_error", error = %err);
        return;
    }
    info!(event = "shutdown_requested");
}

fn init_logging(debug: bool) {
    let default_directive = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
