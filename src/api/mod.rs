pub mod binance;
pub mod bybit;
pub mod okx;

pub use binance::BinanceClient;
pub use bybit::BybitClient;
pub use okx::OkxClient;

use crate::models::{Candle, LivePrice, Timeframe, Venue};
use crate::Result;
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Request timeout applied to every venue client
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// Type alias for the direct rate limiter to simplify signatures
pub type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Per-second rate limiter shared by the clones of one client
pub fn per_second_limiter(requests: u32) -> Arc<DirectRateLimiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests.max(1)).expect("non-zero quota"));
    Arc::new(RateLimiter::direct(quota))
}

/// Read-only market data operations every supported venue provides
///
/// Both operations are idempotent; failures surface as
/// [`EngineError::Gateway`](crate::error::EngineError) and are never
/// retried here - the engine decides what a failure means.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Fetch the `limit` most recent candles, oldest-first
    ///
    /// The final candle may still be forming.
    async fn fetch_recent_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>>;

    /// Fetch the last traded price
    async fn fetch_live_price(&self, symbol: &str) -> Result<LivePrice>;

    fn venue(&self) -> Venue;
}

/// Build the real client for a venue
pub fn build_gateway(venue: Venue) -> Arc<dyn ExchangeGateway> {
    match venue {
        Venue::Binance => Arc::new(BinanceClient::new()),
        Venue::Bybit => Arc::new(BybitClient::new()),
        Venue::Okx => Arc::new(OkxClient::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_gateway_matches_venue() {
        for venue in [Venue::Binance, Venue::Bybit, Venue::Okx] {
            assert_eq!(build_gateway(venue).venue(), venue);
        }
    }
}
