mod analyzer;
mod chart;
mod config;
mod directory;
mod model;
mod normalizer;
mod parser;
mod provider;
mod storage;
mod utils;
mod web;

use analyzer::CupHandleAnalyzer;
use chart::SvgChartRenderer;
use config::{apply_env_overrides, load_config, AppConfig};
use directory::TickerDirectory;
use provider::{build_client, KrxListingClient, YahooProvider};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use storage::SqliteStorage;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};
use web::AppState;

const CHART_PRUNE_INTERVAL_SECS: u64 = 60 * 60;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Set panic hook to log details about any panic
    std::panic::set_hook(Box::new(|panic_info| {
        error!("Panic occurred: {}", panic_info);
    }));

    // Load configuration; a missing file means defaults
    let mut config = if Path::new("config.json").exists() {
        match load_config("config.json") {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("Config load error: {}", e);
                return;
            }
        }
    } else {
        warn!("config.json not found, using defaults");
        AppConfig::default()
    };
    if let Err(e) = apply_env_overrides(&mut config) {
        error!("Invalid environment override: {}", e);
        return;
    }
    let config = Arc::new(config);

    if let Err(e) = fs::create_dir_all(&config.static_dir) {
        error!("Failed to create {}: {}", config.static_dir.display(), e);
        return;
    }
    if let Some(parent) = config.database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent) {
            error!("Failed to create {}: {}", parent.display(), e);
            return;
        }
    }

    let client = match build_client(&config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            return;
        }
    };

    // Initialize storage (SQLite) with async access (wrapped in a Mutex)
    let storage = match SqliteStorage::new(&config.database_path) {
        Ok(s) => Arc::new(Mutex::new(s)),
        Err(e) => {
            error!("Failed to initialize storage: {:?}", e);
            return;
        }
    };

    let directory = TickerDirectory::new(
        storage,
        Arc::new(KrxListingClient::new(client.clone())),
        config.tickers_dir.clone(),
        config.listing_ttl(),
    );

    // Charts accumulate in the static directory; prune them periodically
    let renderer = Arc::new(SvgChartRenderer::new(config.static_dir.clone()));
    let pruner = renderer.clone();
    let retention = config.chart_retention();
    tokio::spawn(async move {
        loop {
            if let Err(e) = pruner.prune(retention) {
                warn!("Chart pruning failed: {}", e);
            }
            sleep(Duration::from_secs(CHART_PRUNE_INTERVAL_SECS)).await;
        }
    });

    let state = AppState {
        config: config.clone(),
        directory: Arc::new(directory),
        provider: Arc::new(YahooProvider::new(client)),
        analyzer: Arc::new(CupHandleAnalyzer::new()),
        renderer,
    };
    let app = web::router(state);

    let addr = config.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };

    info!("cup-handle-scout v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);
    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}
