use crate::model::Market;

const KR_CODE_WIDTH: usize = 6;

/// Turns user input into the symbol the market-data provider expects.
pub fn normalize_ticker(raw: &str, market: Market) -> String {
    let ticker = raw.trim().to_uppercase();

    match market.symbol_suffix() {
        None => ticker.replace('.', "-"),
        Some(suffix) => format!("{}{}", pad_code(&ticker), suffix),
    }
}

/// Zero-pads purely numeric listing codes to six digits.
pub fn pad_code(code: &str) -> String {
    let code = code.trim();
    if !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) {
        format!("{:0>width$}", code, width = KR_CODE_WIDTH)
    } else {
        code.to_string()
    }
}
