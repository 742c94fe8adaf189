use super::page::{self, IndexView};
use super::AppState;
use crate::analyzer::report::FailureKind;
use crate::analyzer::{AnalysisError, AnalysisReport};
use crate::model::{Market, Series};
use crate::normalizer::{normalize_ticker, pad_code};
use axum::extract::{Form, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::{Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Fields posted by the form; the same names work as query parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AnalyzeForm {
    pub market: String,
    pub ticker: String,
    pub custom_ticker: String,
}

impl AnalyzeForm {
    fn market(&self) -> Market {
        if self.market.trim().is_empty() {
            return Market::default();
        }
        self.market.parse().unwrap_or_else(|e| {
            warn!("{}, using {}", e, Market::default());
            Market::default()
        })
    }

    /// Free-text input wins over the list selection.
    fn requested_ticker(&self) -> Option<&str> {
        [self.custom_ticker.trim(), self.ticker.trim()]
            .into_iter()
            .find(|t| !t.is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct Analysis {
    pub symbol: String,
    pub name: Option<String>,
    pub chart_url: Option<String>,
    pub report: AnalysisReport,
}

#[derive(Debug, Serialize)]
pub struct ApiFailure {
    pub kind: FailureKind,
    pub message: String,
}

pub async fn index_get(
    State(state): State<AppState>,
    Query(form): Query<AnalyzeForm>,
) -> Html<String> {
    render_index(&state, &form, false).await
}

pub async fn index_post(State(state): State<AppState>, Form(form): Form<AnalyzeForm>) -> Html<String> {
    render_index(&state, &form, true).await
}

async fn render_index(state: &AppState, form: &AnalyzeForm, submitted: bool) -> Html<String> {
    let market = form.market();
    let tickers = state.directory.tickers(market).await;

    let outcome = match form.requested_ticker() {
        Some(raw) if submitted => Some(run_analysis(state, market, raw).await),
        _ => None,
    };

    Html(page::render(&IndexView {
        market,
        tickers: &tickers,
        selected_ticker: form.ticker.trim(),
        custom_ticker: form.custom_ticker.trim(),
        outcome: outcome.as_ref(),
    }))
}

pub async fn analyze_api(
    State(state): State<AppState>,
    Query(form): Query<AnalyzeForm>,
) -> Response {
    let Some(raw) = form.requested_ticker() else {
        let failure = ApiFailure {
            kind: FailureKind::AnalysisFailed,
            message: "ticker is required".into(),
        };
        return (StatusCode::BAD_REQUEST, Json(failure)).into_response();
    };

    match run_analysis(&state, form.market(), raw).await {
        Ok(analysis) => Json(analysis).into_response(),
        Err(e) => {
            let status = match e.kind() {
                FailureKind::BenchmarkUnavailable => StatusCode::BAD_GATEWAY,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            let failure = ApiFailure {
                kind: e.kind(),
                message: e.message().to_string(),
            };
            (status, Json(failure)).into_response()
        }
    }
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn lookback_range(end: NaiveDate, years: u32) -> (NaiveDate, NaiveDate) {
    let start = end
        .checked_sub_months(Months::new(12 * years))
        .unwrap_or(NaiveDate::MIN);
    (start, end)
}

/// Fetches target and benchmark together, analyzes, then draws the chart.
pub async fn run_analysis(
    state: &AppState,
    market: Market,
    raw_ticker: &str,
) -> Result<Analysis, AnalysisError> {
    let symbol = normalize_ticker(raw_ticker, market);
    let benchmark_symbol = state.config.benchmark_symbol.as_str();
    let (start, end) = lookback_range(Utc::now().date_naive(), state.config.lookback_years);
    info!("Analyzing {} ({}) over {} .. {}", symbol, market, start, end);

    let (prices, benchmark) = futures::join!(
        state.provider.fetch_daily(&symbol, start, end),
        state.provider.fetch_daily(benchmark_symbol, start, end)
    );

    let prices = prices.map_err(|e| {
        warn!("Price fetch failed for {}: {}", symbol, e);
        AnalysisError::InsufficientData(format!("no price data for {}: {}", symbol, e))
    })?;
    let benchmark = benchmark.unwrap_or_else(|e| {
        warn!("Benchmark {} unavailable: {}", benchmark_symbol, e);
        Series::empty(benchmark_symbol)
    });

    let (report, chart) = state
        .analyzer
        .analyze(&symbol, &prices, &benchmark)
        .inspect_err(|e| warn!("Analysis of {} failed: {}", symbol, e))?;
    info!("{}: verdict = {}", symbol, report.verdict);

    let chart_url = match state.renderer.render(&chart) {
        Ok(path) => path
            .file_name()
            .map(|name| format!("/static/{}", name.to_string_lossy())),
        Err(e) => {
            error!("Chart rendering failed for {}: {}", symbol, e);
            None
        }
    };

    let lookup_key = pad_code(&raw_ticker.trim().to_uppercase());
    let name = state.directory.display_name(market, &lookup_key).await;

    Ok(Analysis {
        symbol,
        name,
        chart_url,
        report,
    })
}
