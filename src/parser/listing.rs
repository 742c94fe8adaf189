// Listing parsers: KRX CSV downloads and local ticker files
use crate::model::{Market, ParserError, TickerEntry};
use crate::normalizer::pad_code;

const CODE_COLUMNS: [&str; 2] = ["종목코드", "단축코드"];
const NAME_COLUMNS: [&str; 2] = ["종목명", "한글 종목약명"];
const MAX_US_SYMBOL_LEN: usize = 15;

pub trait Parser {
    fn parse(&self, text: &str) -> Result<Vec<TickerEntry>, ParserError>;
}

/// Parses the KRX "listed issues" CSV.
pub struct KrxCsvParser;

impl KrxCsvParser {
    pub fn new() -> Self {
        Self
    }
}

fn find_column(headers: &csv::StringRecord, candidates: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| candidates.contains(&h.trim().trim_start_matches('\u{feff}')))
}

impl Parser for KrxCsvParser {
    fn parse(&self, text: &str) -> Result<Vec<TickerEntry>, ParserError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| ParserError::CsvParseError(e.to_string()))?
            .clone();
        let code_idx = find_column(&headers, &CODE_COLUMNS)
            .ok_or_else(|| ParserError::MissingField(CODE_COLUMNS.join("/")))?;
        let name_idx = find_column(&headers, &NAME_COLUMNS);

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ParserError::CsvParseError(e.to_string()))?;
            let code = pad_code(record.get(code_idx).unwrap_or(""));
            if code.is_empty() {
                continue;
            }
            let name = name_idx
                .and_then(|i| record.get(i))
                .unwrap_or("")
                .trim();
            entries.push(TickerEntry::new(code, name));
        }
        Ok(entries)
    }
}

/// Parses the `*_tickers.txt` fallback lists (`symbol|name|...` or bare symbol per line).
pub struct TickerFileParser {
    market: Market,
}

impl TickerFileParser {
    pub fn new(market: Market) -> Self {
        Self { market }
    }

    pub fn file_name(market: Market) -> &'static str {
        match market {
            Market::Nasdaq => "nasdaq_tickers.txt",
            Market::Kospi => "kospi_tickers.txt",
            Market::Kosdaq => "kosdaq_tickers.txt",
        }
    }

    fn parse_line(&self, line: &str) -> Option<TickerEntry> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let lower = line.to_lowercase();
        if lower.starts_with("symbol|") || lower.starts_with("symbol,") {
            return None;
        }

        let mut parts = line.split('|').map(str::trim);
        let symbol = parts.next().unwrap_or("");
        let name = parts.next().unwrap_or("");

        if self.market.is_korean() {
            let code = pad_code(symbol);
            return (!code.is_empty()).then(|| TickerEntry::new(code, name));
        }

        if symbol.is_empty() || symbol.contains(' ') || symbol.len() > MAX_US_SYMBOL_LEN {
            return None;
        }
        Some(TickerEntry::new(symbol, name))
    }
}

impl Parser for TickerFileParser {
    fn parse(&self, text: &str) -> Result<Vec<TickerEntry>, ParserError> {
        Ok(text.lines().filter_map(|line| self.parse_line(line)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn krx_csv_is_parsed_by_header() {
        let csv = "\"종목코드\",\"종목명\",\"시장구분\"\n\"5930\",\"삼성전자\",\"KOSPI\"\n\"035720\",\"카카오\",\"KOSPI\"\n\"\",\"빈칸\",\"KOSPI\"\n";
        let entries = KrxCsvParser::new().parse(csv).unwrap();
        assert_eq!(
            entries,
            vec![
                TickerEntry::new("005930", "삼성전자"),
                TickerEntry::new("035720", "카카오"),
            ]
        );
    }

    #[test]
    fn krx_csv_accepts_short_code_layout() {
        let csv = "표준코드,단축코드,한글 종목명,한글 종목약명\nKR7005930003,005930,삼성전자보통주,삼성전자\n";
        let entries = KrxCsvParser::new().parse(csv).unwrap();
        assert_eq!(entries, vec![TickerEntry::new("005930", "삼성전자")]);
    }

    #[test]
    fn krx_csv_without_code_column_is_an_error() {
        let err = KrxCsvParser::new().parse("a,b\n1,2\n").unwrap_err();
        assert!(matches!(err, ParserError::MissingField(_)));
    }

    #[test]
    fn nasdaq_file_skips_header_and_bad_symbols() {
        let text = "Symbol|Security Name|Market Category\nAAPL|Apple Inc. - Common Stock|Q\n\nBAD SYM|Nope\nTOOLONGSYMBOLNAME1|x\nMSFT\n";
        let entries = TickerFileParser::new(Market::Nasdaq).parse(text).unwrap();
        assert_eq!(
            entries,
            vec![
                TickerEntry::new("AAPL", "Apple Inc. - Common Stock"),
                TickerEntry::new("MSFT", ""),
            ]
        );
    }

    #[test]
    fn korean_file_pads_codes() {
        let text = "5930\n000660|SK하이닉스\n";
        let entries = TickerFileParser::new(Market::Kospi).parse(text).unwrap();
        assert_eq!(
            entries,
            vec![TickerEntry::new("005930", ""), TickerEntry::new("000660", "SK하이닉스")]
        );
    }
}
