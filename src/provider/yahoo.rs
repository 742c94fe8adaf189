use crate::model::{Bar, FetchError, Series};
use crate::provider::traits::MarketDataProvider;
use chrono::{DateTime, NaiveDate};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Daily bars from the Yahoo Finance v8 chart endpoint, split/dividend adjusted.
pub struct YahooProvider {
    client: Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn build_url(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let period1 = start.and_hms_opt(0, 0, 0).map(|d| d.and_utc().timestamp()).unwrap_or(0);
        let period2 = end
            .succ_opt()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc().timestamp())
            .unwrap_or(period1);
        format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=history&includeAdjustedClose=true",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(symbol),
            period1,
            period2
        )
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for YahooProvider {
    async fn fetch_daily(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Series, FetchError> {
        let url = self.build_url(symbol, start, end);
        info!("Fetching daily bars for {} ({} .. {})", symbol, start, end);

        let response = self
            .client
            .get(&url)
            .header("referer", "https://finance.yahoo.com/")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NoData(symbol.to_string()));
        }
        if !status.is_success() {
            warn!("Chart request for {} returned {}", symbol, status);
            return Err(FetchError::InvalidResponse(status.as_u16()));
        }

        let body = response.text().await?;
        let series = parse_chart(symbol, &body, start, end)?;
        info!("Fetched {} bars for {}", series.len(), symbol);
        Ok(series)
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartApiError>,
}

#[derive(Debug, Deserialize)]
struct ChartApiError {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(rename = "gmtoffset", default)]
    gmt_offset: i64,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
    #[serde(default)]
    adjclose: Vec<ChartAdjClose>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ChartAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn at<T: Copy>(values: &[Option<T>], i: usize) -> Option<T> {
    values.get(i).copied().flatten()
}

/// Decodes a chart payload into ascending, date-unique bars within `[start, end]`.
fn parse_chart(
    symbol: &str,
    body: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Series, FetchError> {
    let response: ChartResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::Payload(format!("failed to parse chart: {}", e)))?;

    if let Some(error) = response.chart.error {
        warn!("Chart API error for {}: {}", symbol, error.description);
        return Err(FetchError::NoData(symbol.to_string()));
    }

    let result = response
        .chart
        .result
        .and_then(|mut r| (!r.is_empty()).then(|| r.swap_remove(0)))
        .ok_or_else(|| FetchError::NoData(symbol.to_string()))?;

    let gmt_offset = result.meta.map(|m| m.gmt_offset).unwrap_or(0);
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let adjusted = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|a| a.adjclose)
        .unwrap_or_default();

    let mut by_date: BTreeMap<NaiveDate, Bar> = BTreeMap::new();
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let Some(date) = DateTime::from_timestamp(ts + gmt_offset, 0).map(|dt| dt.date_naive())
        else {
            continue;
        };
        if date < start || date > end {
            continue;
        }
        let (Some(open), Some(high), Some(low), Some(close)) = (
            at(&quote.open, i),
            at(&quote.high, i),
            at(&quote.low, i),
            at(&quote.close, i),
        ) else {
            continue;
        };
        if close <= 0.0 {
            continue;
        }

        let factor = at(&adjusted, i).map(|adj| adj / close).unwrap_or(1.0);
        let volume = at(&quote.volume, i).map(|v| v.max(0.0) as u64).unwrap_or(0);
        let bar = Bar {
            date,
            open: open * factor,
            high: high * factor,
            low: low * factor,
            close: close * factor,
            volume,
        };

        // Zero or broken prints would make the whole series unusable downstream.
        if [bar.open, bar.high, bar.low, bar.close]
            .iter()
            .any(|p| !p.is_finite() || *p <= 0.0)
        {
            warn!("Skipping bad print for {} on {}", symbol, date);
            continue;
        }
        by_date.insert(date, bar);
    }

    if by_date.is_empty() {
        return Err(FetchError::NoData(symbol.to_string()));
    }
    Ok(Series::new(symbol, by_date.into_values().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    // 2024-01-02 / 2024-01-03 / 2024-01-04 14:30 UTC, plus a repeated last day.
    const PAYLOAD: &str = r#"{
        "chart": {
            "result": [{
                "meta": { "symbol": "AAPL", "gmtoffset": -18000 },
                "timestamp": [1704205800, 1704292200, 1704378600, 1704390000],
                "indicators": {
                    "quote": [{
                        "open":   [100.0, 102.0, null,  104.0],
                        "high":   [101.0, 103.0, 105.0, 106.0],
                        "low":    [99.0,  101.0, 103.0, 103.5],
                        "close":  [100.0, 102.0, 104.0, 105.0],
                        "volume": [1000,  2000,  3000,  4000]
                    }],
                    "adjclose": [{ "adjclose": [50.0, 51.0, 52.0, 52.5] }]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn parses_adjusts_and_dedupes_bars() {
        let series = parse_chart("AAPL", PAYLOAD, day(1, 1), day(1, 31)).unwrap();

        assert_eq!(series.symbol, "AAPL");
        assert_eq!(series.dates(), vec![day(1, 2), day(1, 3), day(1, 4)]);

        let first = &series.bars[0];
        assert_eq!(first.close, 50.0);
        assert_eq!(first.open, 50.0);
        assert_eq!(first.high, 50.5);
        assert_eq!(first.volume, 1000);

        // Third timestamp lacks an open; the later print on the same day wins.
        let last = &series.bars[2];
        assert_eq!(last.close, 52.5);
        assert_eq!(last.volume, 4000);
    }

    #[test]
    fn non_positive_prints_are_skipped() {
        let body = r#"{
            "chart": {
                "result": [{
                    "timestamp": [1704205800, 1704292200, 1704378600],
                    "indicators": {
                        "quote": [{
                            "open":   [100.0, 0.0,   104.0],
                            "high":   [101.0, 103.0, 105.0],
                            "low":    [99.0,  -1.0,  103.0],
                            "close":  [100.0, 102.0, 104.0],
                            "volume": [1000,  2000,  3000]
                        }],
                        "adjclose": [{ "adjclose": [100.0, 102.0, 0.0] }]
                    }
                }],
                "error": null
            }
        }"#;
        let series = parse_chart("AAPL", body, day(1, 1), day(1, 31)).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.bars[0].open, 100.0);
    }

    #[test]
    fn range_filter_is_inclusive() {
        let series = parse_chart("AAPL", PAYLOAD, day(1, 3), day(1, 3)).unwrap();
        assert_eq!(series.dates(), vec![day(1, 3)]);
    }

    #[test]
    fn api_error_means_no_data() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart("NOPE", body, day(1, 1), day(1, 31)).unwrap_err();
        assert!(matches!(err, FetchError::NoData(s) if s == "NOPE"));
    }

    #[test]
    fn garbage_is_a_payload_error() {
        let err = parse_chart("AAPL", "<html>", day(1, 1), day(1, 31)).unwrap_err();
        assert!(matches!(err, FetchError::Payload(_)));
    }

    #[test]
    fn url_encodes_index_symbols_and_spans_inclusive_end() {
        let provider = YahooProvider::with_base_url(Client::new(), "http://localhost:1/");
        let url = provider.build_url("^GSPC", day(1, 2), day(1, 3));
        assert_eq!(
            url,
            "http://localhost:1/v8/finance/chart/%5EGSPC?period1=1704153600&period2=1704326400&interval=1d&events=history&includeAdjustedClose=true"
        );
    }
}
