use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Index the relative-strength condition compares against.
    pub benchmark_symbol: String,
    pub lookback_years: u32,
    pub static_dir: PathBuf,
    /// Rendered charts older than this are deleted.
    pub chart_retention_hours: u64,
    /// Directory holding the `*_tickers.txt` fallback lists.
    pub tickers_dir: PathBuf,
    pub database_path: PathBuf,
    pub listing_ttl_seconds: i64,
    pub user_agent: String,
    pub request_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 10000,
            benchmark_symbol: "^GSPC".into(),
            lookback_years: 2,
            static_dir: PathBuf::from("static"),
            chart_retention_hours: 24,
            tickers_dir: PathBuf::from("."),
            database_path: PathBuf::from("data/listings.db"),
            listing_ttl_seconds: 24 * 60 * 60,
            user_agent: "Mozilla/5.0".into(),
            request_timeout_seconds: 20,
        }
    }
}

impl AppConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn chart_retention(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.chart_retention_hours * 60 * 60)
    }

    pub fn listing_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.listing_ttl_seconds)
    }
}

pub fn load_config(path: &str) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}

/// Applies the `PORT` variable some hosts inject.
pub fn apply_env_overrides(config: &mut AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Ok(port) = std::env::var("PORT") {
        config.port = port.trim().parse()?;
    }
    Ok(())
}
