use super::{per_second_limiter, DirectRateLimiter, ExchangeGateway, REQUEST_TIMEOUT};
use crate::error::EngineError;
use crate::models::{Candle, LivePrice, Timeframe, Venue};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;

const BINANCE_FUTURES_API_BASE: &str = "https://fapi.binance.com";
// Public market data allowance is generous; polling once per second
// stays far under it
const RATE_LIMIT_RPS: u32 = 5;

/// Client for Binance USD-M futures public market data
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<DirectRateLimiter>,
}

// Kline rows arrive as mixed-type JSON arrays:
// [openTime, open, high, low, close, volume, closeTime, quoteVolume,
//  trades, takerBase, takerQuote, ignore]
type KlineRow = (
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    u64,
    String,
    String,
    String,
);

#[derive(Debug, serde::Deserialize)]
struct TickerPrice {
    price: String,
}

impl BinanceClient {
    pub fn new() -> Self {
        Self::with_base_url(BINANCE_FUTURES_API_BASE.to_string())
    }

    /// Use a non-default base URL (tests point this at a local mock server)
    pub fn with_base_url(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            base_url,
            rate_limiter: per_second_limiter(RATE_LIMIT_RPS),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(EngineError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::from_status(status, &body));
        }

        response.json().await.map_err(EngineError::from_reqwest)
    }
}

impl Default for BinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_price(field: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|e| EngineError::decode(format!("bad {} value {:?}: {}", field, value, e)))
}

fn candle_from_row(row: KlineRow) -> Result<Candle> {
    let open_time = DateTime::<Utc>::from_timestamp_millis(row.0)
        .ok_or_else(|| EngineError::decode(format!("bad kline open time: {}", row.0)))?;

    Ok(Candle {
        open_time,
        open: parse_price("open", &row.1)?,
        high: parse_price("high", &row.2)?,
        low: parse_price("low", &row.3)?,
        close: parse_price("close", &row.4)?,
        volume: parse_price("volume", &row.5)?,
    })
}

#[async_trait]
impl ExchangeGateway for BinanceClient {
    async fn fetch_recent_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol.to_ascii_uppercase(),
            timeframe.code(),
            limit
        );

        let rows: Vec<KlineRow> = self.get_json(&url).await?;
        rows.into_iter().map(candle_from_row).collect()
    }

    async fn fetch_live_price(&self, symbol: &str) -> Result<LivePrice> {
        let url = format!(
            "{}/fapi/v1/ticker/price?symbol={}",
            self.base_url,
            symbol.to_ascii_uppercase()
        );

        let ticker: TickerPrice = self.get_json(&url).await?;

        Ok(LivePrice {
            price: parse_price("price", &ticker.price)?,
            observed_at: Utc::now(),
        })
    }

    fn venue(&self) -> Venue {
        Venue::Binance
    }
}
