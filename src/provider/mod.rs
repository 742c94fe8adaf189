// Remote data: daily bars and exchange listings

pub mod krx;
pub mod traits;
pub mod yahoo;

pub use krx::KrxListingClient;
pub use traits::{ListingSource, MarketDataProvider};
pub use yahoo::YahooProvider;

use crate::config::AppConfig;
use crate::model::FetchError;
use reqwest::Client;
use std::time::Duration;

/// Shared HTTP client for every remote call.
pub fn build_client(config: &AppConfig) -> Result<Client, FetchError> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(Duration::from_secs(config.request_timeout_seconds))
        .build()
        .map_err(FetchError::from)
}
