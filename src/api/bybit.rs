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

const BYBIT_API_BASE: &str = "https://api.bybit.com";
const RATE_LIMIT_RPS: u32 = 5;

/// Client for Bybit v5 linear (USDT perpetual) public market data
#[derive(Clone)]
pub struct BybitClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<DirectRateLimiter>,
}

/// Every v5 response carries a retCode envelope
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    ret_code: i64,
    ret_msg: String,
    result: Option<T>,
}

// Kline rows: [startTime, open, high, low, close, volume, turnover],
// all strings, newest first
#[derive(Debug, Deserialize)]
struct KlineResult {
    list: Vec<(String, String, String, String, String, String, String)>,
}

#[derive(Debug, Deserialize)]
struct TickerResult {
    list: Vec<TickerEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerEntry {
    last_price: String,
}

impl BybitClient {
    pub fn new() -> Self {
        Self::with_base_url(BYBIT_API_BASE.to_string())
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

    /// GET a v5 endpoint and unwrap the retCode envelope
    async fn get_result<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
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

        if envelope.ret_code != 0 {
            return Err(EngineError::api(format!(
                "Bybit retCode {}: {}",
                envelope.ret_code, envelope.ret_msg
            )));
        }

        envelope
            .result
            .ok_or_else(|| EngineError::decode("Bybit response missing result"))
    }
}

impl Default for BybitClient {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_field(field: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|e| EngineError::decode(format!("bad {} value {:?}: {}", field, value, e)))
}

#[async_trait]
impl ExchangeGateway for BybitClient {
    async fn fetch_recent_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/v5/market/kline?category=linear&symbol={}&interval={}&limit={}",
            self.base_url,
            symbol.to_ascii_uppercase(),
            timeframe.bybit_code(),
            limit
        );

        let result: KlineResult = self.get_result(&url).await?;

        // v5 returns newest first; the engine expects oldest first
        let mut candles = Vec::with_capacity(result.list.len());
        for row in result.list.into_iter().rev() {
            let start_ms: i64 = row
                .0
                .parse()
                .map_err(|e| EngineError::decode(format!("bad kline start {:?}: {}", row.0, e)))?;
            let open_time = DateTime::<Utc>::from_timestamp_millis(start_ms)
                .ok_or_else(|| EngineError::decode(format!("bad kline start: {}", start_ms)))?;

            candles.push(Candle {
                open_time,
                open: parse_field("open", &row.1)?,
                high: parse_field("high", &row.2)?,
                low: parse_field("low", &row.3)?,
                close: parse_field("close", &row.4)?,
                volume: parse_field("volume", &row.5)?,
            });
        }

        Ok(candles)
    }

    async fn fetch_live_price(&self, symbol: &str) -> Result<LivePrice> {
        let url = format!(
            "{}/v5/market/tickers?category=linear&symbol={}",
            self.base_url,
            symbol.to_ascii_uppercase()
        );

        let result: TickerResult = self.get_result(&url).await?;
        let entry = result
            .list
            .first()
            .ok_or_else(|| EngineError::api(format!("no ticker returned for {}", symbol)))?;

        Ok(LivePrice {
            price: parse_field("lastPrice", &entry.last_price)?,
            observed_at: Utc::now(),
        })
    }

    fn venue(&self) -> Venue {
        Venue::Bybit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayErrorKind;

    const KLINE_BODY: &str = r#"{
        "retCode": 0,
        "retMsg": "OK",
        "result": {
            "category": "linear",
            "symbol": "WALUSDT",
            "list": [
                ["1700000060000","1.1","1.3","1.0","1.2","6000","7200"],
                ["1700000000000","1.0","1.2","0.9","1.1","5000","5500"]
            ]
        },
        "retExtInfo": {},
        "time": 1700000123000
    }"#;

    #[tokio::test]
    async fn test_klines_reversed_to_oldest_first() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_body(KLINE_BODY)
            .create_async()
            .await;

        let client = BybitClient::with_base_url(server.url());
        let candles = client
            .fetch_recent_candles("WALUSDT", Timeframe::M1, 10)
            .await
            .unwrap();

        assert_eq!(candles.len(), 2);
        assert!(candles[0].open_time < candles[1].open_time);
        assert_eq!(candles[0].close, 1.1);
        assert_eq!(candles[1].close, 1.2);
    }

    #[tokio::test]
    async fn test_ticker_uses_last_price() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "retCode": 0,
                    "retMsg": "OK",
                    "result": {
                        "category": "linear",
                        "list": [{"symbol": "WALUSDT", "lastPrice": "1.5005"}],
                    },
                    "retExtInfo": {},
                    "time": 1_700_000_123_000_i64,
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = BybitClient::with_base_url(server.url());
        let live = client.fetch_live_price("WALUSDT").await.unwrap();
        assert_eq!(live.price, 1.5005);
    }

    #[tokio::test]
    async fn test_nonzero_ret_code_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "retCode": 10001,
                    "retMsg": "params error: symbol invalid",
                    "result": null,
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = BybitClient::with_base_url(server.url());
        let err = client.fetch_live_price("NOPE").await.unwrap_err();

        match err {
            EngineError::Gateway { kind, message } => {
                assert_eq!(kind, GatewayErrorKind::Api);
                assert!(message.contains("10001"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
