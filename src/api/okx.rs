use super::{per_second_limiter, DirectRateLimiter, ExchangeGateway, REQUEST_TIMEOUT};
use crate::error::EngineError;
use crate::models::{Candle, LivePrice, Timeframe, Venue};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

const OKX_API_BASE: &str = "https://www.okx.com";
const RATE_LIMIT_RPS: u32 = 5;

/// Client for OKX v5 public market data (perpetual swaps)
#[derive(Clone)]
pub struct OkxClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<DirectRateLimiter>,
}

/// Every v5 response carries a string code envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TickerEntry {
    last: String,
}

/// Map a compact symbol to an OKX swap instrument id
/// ("WALUSDT" -> "WAL-USDT-SWAP"); ids already containing dashes pass
/// through untouched
fn inst_id(symbol: &str) -> String {
    let upper = symbol.to_ascii_uppercase();
    if upper.contains('-') {
        return upper;
    }

    for quote in ["USDT", "USDC", "USD"] {
        if let Some(base) = upper.strip_suffix(quote) {
            if !base.is_empty() {
                return format!("{}-{}-SWAP", base, quote);
            }
        }
    }

    upper
}

impl OkxClient {
    pub fn new() -> Self {
        Self::with_base_url(OKX_API_BASE.to_string())
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

    /// GET a v5 endpoint and unwrap the code envelope
    async fn get_data<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>> {
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

        let envelope: Envelope<T> = response.json().await.map_err(EngineError::from_reqwest)?;

        if envelope.code != "0" {
            return Err(EngineError::api(format!(
                "OKX code {}: {}",
                envelope.code, envelope.msg
            )));
        }

        Ok(envelope.data)
    }
}

impl Default for OkxClient {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_field(field: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|e| EngineError::decode(format!("bad {} value {:?}: {}", field, value, e)))
}

/// Candle rows are string arrays: [ts, open, high, low, close, vol, ...];
/// trailing fields vary by endpoint version
fn candle_from_row(row: &[String]) -> Result<Candle> {
    if row.len() < 6 {
        return Err(EngineError::decode(format!(
            "candle row too short: {} fields",
            row.len()
        )));
    }

    let ts_ms: i64 = row[0]
        .parse()
        .map_err(|e| EngineError::decode(format!("bad candle ts {:?}: {}", row[0], e)))?;
    let open_time = DateTime::<Utc>::from_timestamp_millis(ts_ms)
        .ok_or_else(|| EngineError::decode(format!("bad candle ts: {}", ts_ms)))?;

    Ok(Candle {
        open_time,
        open: parse_field("open", &row[1])?,
        high: parse_field("high", &row[2])?,
        low: parse_field("low", &row[3])?,
        close: parse_field("close", &row[4])?,
        volume: parse_field("volume", &row[5])?,
    })
}

#[async_trait]
impl ExchangeGateway for OkxClient {
    async fn fetch_recent_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v5/market/candles?instId={}&bar={}&limit={}",
            self.base_url,
            inst_id(symbol),
            timeframe.okx_code(),
            limit
        );

        let rows: Vec<Vec<String>> = self.get_data(&url).await?;

        // Newest first on the wire; the engine expects oldest first
        rows.iter().rev().map(|row| candle_from_row(row)).collect()
    }

    async fn fetch_live_price(&self, symbol: &str) -> Result<LivePrice> {
        let url = format!(
            "{}/api/v5/market/ticker?instId={}",
            self.base_url,
            inst_id(symbol)
        );

        let entries: Vec<TickerEntry> = self.get_data(&url).await?;
        let entry = entries
            .first()
            .ok_or_else(|| EngineError::api(format!("no ticker returned for {}", symbol)))?;

        Ok(LivePrice {
            price: parse_field("last", &entry.last)?,
            observed_at: Utc::now(),
        })
    }

    fn venue(&self) -> Venue {
        Venue::Okx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayErrorKind;

    #[test]
    fn test_inst_id_mapping() {
        assert_eq!(inst_id("WALUSDT"), "WAL-USDT-SWAP");
        assert_eq!(inst_id("btcusd"), "BTC-USD-SWAP");
        assert_eq!(inst_id("ETH-USDT-SWAP"), "ETH-USDT-SWAP");
        // No recognizable quote suffix: leave it alone
        assert_eq!(inst_id("WEIRD"), "WEIRD");
    }

    const CANDLES_BODY: &str = r#"{
        "code": "0",
        "msg": "",
        "data": [
            ["1700000060000","1.1","1.3","1.0","1.2","6000","7200","7200","1"],
            ["1700000000000","1.0","1.2","0.9","1.1","5000","5500","5500","1"]
        ]
    }"#;

    #[tokio::test]
    async fn test_candles_reversed_to_oldest_first() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_body(CANDLES_BODY)
            .create_async()
            .await;

        let client = OkxClient::with_base_url(server.url());
        let candles = client
            .fetch_recent_candles("WALUSDT", Timeframe::M1, 10)
            .await
            .unwrap();

        assert_eq!(candles.len(), 2);
        assert!(candles[0].open_time < candles[1].open_time);
        assert_eq!(candles[0].close, 1.1);
        assert_eq!(candles[1].high, 1.3);
    }

    #[tokio::test]
    async fn test_ticker_uses_last() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "code": "0",
                    "msg": "",
                    "data": [{"instId": "WAL-USDT-SWAP", "last": "1.42"}],
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = OkxClient::with_base_url(server.url());
        let live = client.fetch_live_price("WALUSDT").await.unwrap();
        assert_eq!(live.price, 1.42);
    }

    #[tokio::test]
    async fn test_nonzero_code_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "code": "51001",
                    "msg": "Instrument ID does not exist",
                    "data": [],
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = OkxClient::with_base_url(server.url());
        let err = client.fetch_live_price("NOPEUSDT").await.unwrap_err();

        match err {
            EngineError::Gateway { kind, message } => {
                assert_eq!(kind, GatewayErrorKind::Api);
                assert!(message.contains("51001"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
