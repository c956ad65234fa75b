//! qit-server - Carton quality-inspection tracker
//!
//! Serves the draft-batch workflow, the committed record collection and
//! image analysis over HTTP (default port 5780).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use qit_common::catalog::CartonCatalog;
use qit_common::config::{load_config, resolve_config_path, StoreBackend, TomlConfig};
use qit_server::api::buildinfo;
use qit_server::classifier::build_classifier;
use qit_server::store::{RecordStore, SheetApiStore, SqliteStore};
use qit_server::workbook::Workbook;
use qit_server::{build_router, AppState};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for qit-server
#[derive(Parser, Debug)]
#[command(name = "qit-server")]
#[command(about = "Carton quality-inspection tracker")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "QIT_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "QIT_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides the config file)
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing starts so its log level applies
    let config_result = load_config(args.config.as_deref());
    let default_level = config_result
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},tower_http=info", default_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        revision = buildinfo::GIT_REVISION,
        built = buildinfo::BUILD_TIME,
        profile = buildinfo::BUILD_PROFILE,
        "Starting QIT server"
    );

    match resolve_config_path(args.config.as_deref()) {
        Some(path) if path.exists() => info!("Configuration: {}", path.display()),
        Some(path) => warn!(
            "Config file {} not found, using compiled defaults",
            path.display()
        ),
        None => warn!("No config file location, using compiled defaults"),
    }
    let mut config = config_result.context("Failed to load configuration")?;
    // Command line beats environment beats file
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    let state = build_state(&config).await?;
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.bind, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind, config.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("qit-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wire up store, classifier, catalog and workbook from configuration
async fn build_state(config: &TomlConfig) -> Result<AppState> {
    let catalog = match &config.catalog_path {
        Some(path) => CartonCatalog::load(path).context("Failed to load carton catalog")?,
        None => {
            info!("Using built-in carton catalog");
            CartonCatalog::builtin()
        }
    };

    let timeout = Duration::from_secs(config.store.timeout_secs);
    let store: Arc<dyn RecordStore> = match config.store.backend {
        StoreBackend::Sqlite => Arc::new(
            SqliteStore::connect(config.store.database_path.as_deref())
                .await
                .context("Failed to open SQLite record store")?,
        ),
        StoreBackend::SheetApi => {
            let url = config
                .store
                .sheet_api_url
                .as_deref()
                .context("store.sheet_api_url is required for the sheet_api backend")?;
            info!("Record store: sheet API at {}", url);
            Arc::new(SheetApiStore::new(url, timeout).context("Failed to set up sheet API store")?)
        }
    };

    let classifier =
        build_classifier(&config.classifier).context("Failed to set up defect classifier")?;

    let mut state = AppState::new(store, classifier, catalog);
    if let Some(source) = &config.workbook.source {
        let workbook = Workbook::new(source, &config.workbook.sheet, timeout)
            .context("Failed to set up workbook source")?;
        info!(
            "Workbook import source: {} (sheet {})",
            workbook.source(),
            workbook.sheet()
        );
        state = state.with_workbook(workbook);
    }
    Ok(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
