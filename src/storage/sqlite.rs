use crate::model::{Market, StorageError, TickerEntry};
use crate::utils::parse_datetime;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use std::path::Path;

/// SQLite cache of exchange listings, keyed by market.
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the database and runs migrations.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        Self::migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::migrate(&conn)?;
        Ok(Self { conn })
    }

    fn migrate(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS ticker_listing (
                market TEXT NOT NULL,
                symbol TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (market, symbol)
            );

            CREATE TABLE IF NOT EXISTS listing_refresh (
                market TEXT PRIMARY KEY,
                refreshed_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Replaces the stored listing for `market` and stamps the refresh time.
    pub fn replace_listing(
        &mut self,
        market: Market,
        entries: &[TickerEntry],
        refreshed_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM ticker_listing WHERE market = ?1",
            params![market.as_str()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO ticker_listing (market, symbol, name) VALUES (?1, ?2, ?3)",
            )?;
            for entry in entries {
                stmt.execute(params![market.as_str(), &entry.symbol, &entry.name])?;
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO listing_refresh (market, refreshed_at) VALUES (?1, ?2)",
            params![market.as_str(), refreshed_at.to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn load_listing(&self, market: Market) -> Result<Vec<TickerEntry>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT symbol, name FROM ticker_listing WHERE market = ?1 ORDER BY symbol ASC",
        )?;
        let rows = stmt.query_map(params![market.as_str()], |row| {
            Ok(TickerEntry {
                symbol: row.get(0)?,
                name: row.get(1)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Name stored for `symbol`, if known and non-empty.
    pub fn lookup_name(&self, market: Market, symbol: &str) -> Result<Option<String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM ticker_listing WHERE market = ?1 AND symbol = ?2")?;
        let mut rows = stmt.query(params![market.as_str(), symbol])?;
        if let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            Ok((!name.is_empty()).then_some(name))
        } else {
            Ok(None)
        }
    }

    pub fn refreshed_at(&self, market: Market) -> Result<Option<DateTime<Utc>>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT refreshed_at FROM listing_refresh WHERE market = ?1")?;
        let mut rows = stmt.query(params![market.as_str()])?;
        match rows.next()? {
            Some(row) => {
                let raw: String = row.get(0)?;
                parse_datetime(&raw)
                    .map(Some)
                    .ok_or(StorageError::InvalidTimestamp(raw))
            }
            None => Ok(None),
        }
    }

    /// True when the listing was refreshed less than `ttl` before `now`.
    pub fn is_fresh(
        &self,
        market: Market,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        Ok(self
            .refreshed_at(market)?
            .is_some_and(|at| now.signed_duration_since(at) < ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entries() -> Vec<TickerEntry> {
        vec![
            TickerEntry::new("035720", "카카오"),
            TickerEntry::new("005930", "삼성전자"),
            TickerEntry::new("000001", ""),
        ]
    }

    #[test]
    fn listing_round_trips_sorted_by_symbol() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap();
        storage.replace_listing(Market::Kospi, &entries(), now).unwrap();

        let loaded = storage.load_listing(Market::Kospi).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].symbol, "000001");
        assert_eq!(loaded[1], TickerEntry::new("005930", "삼성전자"));
        assert!(storage.load_listing(Market::Kosdaq).unwrap().is_empty());
    }

    #[test]
    fn replace_drops_previous_rows() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap();
        storage.replace_listing(Market::Kosdaq, &entries(), now).unwrap();
        storage
            .replace_listing(Market::Kosdaq, &[TickerEntry::new("091990", "셀트리온헬스케어")], now)
            .unwrap();

        let loaded = storage.load_listing(Market::Kosdaq).unwrap();
        assert_eq!(loaded, vec![TickerEntry::new("091990", "셀트리온헬스케어")]);
    }

    #[test]
    fn lookup_name_treats_blank_as_unknown() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap();
        storage.replace_listing(Market::Kospi, &entries(), now).unwrap();

        assert_eq!(
            storage.lookup_name(Market::Kospi, "005930").unwrap().as_deref(),
            Some("삼성전자")
        );
        assert_eq!(storage.lookup_name(Market::Kospi, "000001").unwrap(), None);
        assert_eq!(storage.lookup_name(Market::Kospi, "999999").unwrap(), None);
    }

    #[test]
    fn freshness_follows_ttl() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        let refreshed = Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap();
        let ttl = Duration::hours(24);

        assert!(!storage.is_fresh(Market::Kospi, ttl, refreshed).unwrap());

        storage.replace_listing(Market::Kospi, &entries(), refreshed).unwrap();
        assert_eq!(storage.refreshed_at(Market::Kospi).unwrap(), Some(refreshed));
        assert!(storage
            .is_fresh(Market::Kospi, ttl, refreshed + Duration::hours(23))
            .unwrap());
        assert!(!storage
            .is_fresh(Market::Kospi, ttl, refreshed + Duration::hours(25))
            .unwrap());
    }

    #[test]
    fn database_file_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listings.db");
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap();
        {
            let mut storage = SqliteStorage::new(&path).unwrap();
            storage.replace_listing(Market::Kospi, &entries(), now).unwrap();
        }
        let reopened = SqliteStorage::new(&path).unwrap();
        assert_eq!(reopened.load_listing(Market::Kospi).unwrap().len(), 3);
    }
}
