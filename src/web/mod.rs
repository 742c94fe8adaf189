pub mod handler;
pub mod page;

use crate::analyzer::Analyzer;
use crate::chart::ChartRenderer;
use crate::config::AppConfig;
use crate::directory::TickerDirectory;
use crate::provider::MarketDataProvider;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Shared handles for every request; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub directory: Arc<TickerDirectory>,
    pub provider: Arc<dyn MarketDataProvider>,
    pub analyzer: Arc<dyn Analyzer + Send + Sync>,
    pub renderer: Arc<dyn ChartRenderer>,
}

pub fn router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.config.static_dir);
    Router::new()
        .route("/", get(handler::index_get).post(handler::index_post))
        .route("/api/analyze", get(handler::analyze_api))
        .route("/health", get(handler::health))
        .nest_service("/static", static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
