pub mod listing;

pub use listing::{KrxCsvParser, Parser, TickerFileParser};
