// Core structs: Bar, Series, Market, TickerEntry
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One trading day of OHLCV data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Daily bars for one symbol, ordered by date ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub symbol: String,
    pub bars: Vec<Bar>,
}

impl Series {
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn empty(symbol: impl Into<String>) -> Self {
        Self::new(symbol, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume as f64).collect()
    }
}

/// Market selector offered on the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    #[default]
    Nasdaq,
    Kospi,
    Kosdaq,
}

impl Market {
    pub const ALL: [Market; 3] = [Market::Nasdaq, Market::Kospi, Market::Kosdaq];

    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Nasdaq => "NASDAQ",
            Market::Kospi => "KOSPI",
            Market::Kosdaq => "KOSDAQ",
        }
    }

    /// Suffix the data provider expects after a Korean listing code.
    pub fn symbol_suffix(&self) -> Option<&'static str> {
        match self {
            Market::Nasdaq => None,
            Market::Kospi => Some(".KS"),
            Market::Kosdaq => Some(".KQ"),
        }
    }

    /// KRX market id used by the listing download (`None` for markets KRX doesn't list).
    pub fn krx_market_id(&self) -> Option<&'static str> {
        match self {
            Market::Nasdaq => None,
            Market::Kospi => Some("STK"),
            Market::Kosdaq => Some("KSQ"),
        }
    }

    pub fn is_korean(&self) -> bool {
        self.krx_market_id().is_some()
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = ParserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NASDAQ" => Ok(Market::Nasdaq),
            "KOSPI" => Ok(Market::Kospi),
            "KOSDAQ" => Ok(Market::Kosdaq),
            other => Err(ParserError::UnknownMarket(other.to_string())),
        }
    }
}

/// Listing entry: exchange code plus company name (possibly empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerEntry {
    pub symbol: String,
    pub name: String,
}

impl TickerEntry {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    HttpError(String),
    #[error("unexpected response status {0}")]
    InvalidResponse(u16),
    #[error("malformed payload: {0}")]
    Payload(String),
    #[error("no data for {0}")]
    NoData(String),
    #[error("no remote listing for market {0}")]
    Unsupported(Market),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::HttpError(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("csv parse error: {0}")]
    CsvParseError(String),
    #[error("missing column: {0}")]
    MissingField(String),
    #[error("unknown market: {0}")]
    UnknownMarket(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("invalid timestamp in cache: {0}")]
    InvalidTimestamp(String),
}

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("nothing to draw")]
    EmptySeries,
    #[error("failed to write chart: {0}")]
    Io(#[from] std::io::Error),
}
