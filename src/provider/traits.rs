use crate::model::{FetchError, Market, Series, TickerEntry};
use chrono::NaiveDate;

/// Source of daily bars for a symbol over an inclusive date range.
#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Series, FetchError>;
}

/// Remote exchange listing (code + company name) for one market.
#[async_trait::async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch_listing(&self, market: Market) -> Result<Vec<TickerEntry>, FetchError>;
}
