use crate::model::{FetchError, Market, TickerEntry};
use crate::parser::{KrxCsvParser, Parser};
use crate::provider::traits::ListingSource;
use reqwest::Client;
use tracing::info;

const OTP_URL: &str = "https://data.krx.co.kr/comm/fileDn/GenerateOTP/generate.cmd";
const DOWNLOAD_URL: &str = "https://data.krx.co.kr/comm/fileDn/download_csv/download.cmd";
const REFERER: &str = "https://data.krx.co.kr/contents/MDC/STAT/standard/MDCSTAT01901.jspx";
const LISTING_REPORT: &str = "dbms/MDC/STAT/standard/MDCSTAT01901";

/// KRX "listed issues" download: request a one-time code, then trade it for the CSV.
pub struct KrxListingClient {
    client: Client,
    otp_url: String,
    download_url: String,
}

impl KrxListingClient {
    pub fn new(client: Client) -> Self {
        Self::with_urls(client, OTP_URL, DOWNLOAD_URL)
    }

    pub fn with_urls(
        client: Client,
        otp_url: impl Into<String>,
        download_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            otp_url: otp_url.into(),
            download_url: download_url.into(),
        }
    }

    async fn request_otp(&self, market_id: &str) -> Result<String, FetchError> {
        let form = [
            ("mktId", market_id),
            ("share", "1"),
            ("csvxls_isNo", "false"),
            ("name", "fileDown"),
            ("url", LISTING_REPORT),
        ];
        let response = self
            .client
            .post(&self.otp_url)
            .header("Referer", REFERER)
            .form(&form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FetchError::InvalidResponse(response.status().as_u16()));
        }
        let otp = response.text().await?.trim().to_string();
        if otp.is_empty() {
            return Err(FetchError::Payload("empty OTP".into()));
        }
        Ok(otp)
    }

    async fn download(&self, otp: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .post(&self.download_url)
            .header("Referer", REFERER)
            .form(&[("code", otp)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FetchError::InvalidResponse(response.status().as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// KRX serves CP949; a body that is already valid UTF-8 is taken as-is.
pub fn decode_listing(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => encoding_rs::EUC_KR.decode(bytes).0.into_owned(),
    }
}

#[async_trait::async_trait]
impl ListingSource for KrxListingClient {
    async fn fetch_listing(&self, market: Market) -> Result<Vec<TickerEntry>, FetchError> {
        let market_id = market.krx_market_id().ok_or(FetchError::Unsupported(market))?;

        info!("Downloading {} listing from KRX...", market);
        let otp = self.request_otp(market_id).await?;
        let bytes = self.download(&otp).await?;

        let text = decode_listing(&bytes);
        let cleaned: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        if cleaned.len() < 2 {
            return Ok(Vec::new());
        }

        let entries = KrxCsvParser::new()
            .parse(&cleaned.join("\n"))
            .map_err(|e| FetchError::Payload(e.to_string()))?;
        info!("KRX {} listing: {} entries", market, entries.len());
        Ok(entries)
    }
}
