// Ticker directory: remote listing with a 24h SQLite cache, local files as fallback
use crate::model::{Market, TickerEntry};
use crate::parser::{Parser, TickerFileParser};
use crate::provider::ListingSource;
use crate::storage::SqliteStorage;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct TickerDirectory {
    storage: Arc<Mutex<SqliteStorage>>,
    source: Arc<dyn ListingSource>,
    tickers_dir: PathBuf,
    ttl: Duration,
}

impl TickerDirectory {
    pub fn new(
        storage: Arc<Mutex<SqliteStorage>>,
        source: Arc<dyn ListingSource>,
        tickers_dir: impl Into<PathBuf>,
        ttl: Duration,
    ) -> Self {
        Self {
            storage,
            source,
            tickers_dir: tickers_dir.into(),
            ttl,
        }
    }

    /// Entries offered for `market`. Never fails: remote and cache problems
    /// degrade to the local list, which may itself be empty.
    pub async fn tickers(&self, market: Market) -> Vec<TickerEntry> {
        if !market.is_korean() {
            return self.load_local(market);
        }

        if let Some(cached) = self.fresh_cache(market).await {
            info!("[listing] {} served from cache: {}", market, cached.len());
            return cached;
        }

        match self.source.fetch_listing(market).await {
            Ok(entries) if !entries.is_empty() => {
                if let Err(e) = self
                    .storage
                    .lock()
                    .await
                    .replace_listing(market, &entries, Utc::now())
                {
                    warn!("[listing] failed to cache {}: {:?}", market, e);
                }
                info!("[listing] {} refreshed from remote: {}", market, entries.len());
                entries
            }
            Ok(_) => {
                warn!("[listing] {} remote listing was empty, using local file", market);
                self.local_with_cached_names(market).await
            }
            Err(e) => {
                warn!("[listing] {} remote fetch failed, using local file: {}", market, e);
                self.local_with_cached_names(market).await
            }
        }
    }

    /// Company name for `symbol` (a bare code or list symbol), if known.
    pub async fn display_name(&self, market: Market, symbol: &str) -> Option<String> {
        let cached = match self.storage.lock().await.lookup_name(market, symbol) {
            Ok(name) => name,
            Err(e) => {
                warn!("[listing] name lookup failed for {}: {:?}", symbol, e);
                None
            }
        };
        cached.or_else(|| {
            self.load_local(market)
                .into_iter()
                .find(|t| t.symbol.eq_ignore_ascii_case(symbol) && !t.name.is_empty())
                .map(|t| t.name)
        })
    }

    async fn fresh_cache(&self, market: Market) -> Option<Vec<TickerEntry>> {
        let storage = self.storage.lock().await;
        match storage.is_fresh(market, self.ttl, Utc::now()) {
            Ok(true) => match storage.load_listing(market) {
                Ok(entries) if !entries.is_empty() => Some(entries),
                Ok(_) => None,
                Err(e) => {
                    warn!("[listing] cache read failed for {}: {:?}", market, e);
                    None
                }
            },
            Ok(false) => None,
            Err(e) => {
                warn!("[listing] cache check failed for {}: {:?}", market, e);
                None
            }
        }
    }

    /// Local list with names filled in from whatever listing is cached, stale or not.
    async fn local_with_cached_names(&self, market: Market) -> Vec<TickerEntry> {
        let mut entries = self.load_local(market);
        let cached = self.storage.lock().await.load_listing(market).unwrap_or_default();
        if cached.is_empty() {
            return entries;
        }

        let names: HashMap<String, String> =
            cached.into_iter().map(|t| (t.symbol, t.name)).collect();
        for entry in entries.iter_mut().filter(|e| e.name.is_empty()) {
            if let Some(name) = names.get(&entry.symbol) {
                entry.name = name.clone();
            }
        }
        entries
    }

    fn load_local(&self, market: Market) -> Vec<TickerEntry> {
        let path = self.tickers_dir.join(TickerFileParser::file_name(market));
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                warn!("[listing] cannot read {}: {}", path.display(), e);
                return Vec::new();
            }
        };
        match TickerFileParser::new(market).parse(&text) {
            Ok(entries) => {
                info!("[listing] {} loaded from {}: {}", market, path.display(), entries.len());
                entries
            }
            Err(e) => {
                warn!("[listing] cannot parse {}: {:?}", path.display(), e);
                Vec::new()
            }
        }
    }
}
