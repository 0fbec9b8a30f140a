use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// OHLCV candlestick for one timeframe bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Last traded price from the venue's ticker endpoint
///
/// Transient - only the most recent observation is ever kept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivePrice {
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

/// Directional signal from comparing the live price against the indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Long,
    Short,
    Neutral,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Signal::Long => "LONG",
            Signal::Short => "SHORT",
            Signal::Neutral => "NEUTRAL",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle of the polling engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Faulted,
}

/// Supported futures venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Venue {
    Binance,
    Bybit,
    Okx,
}

impl FromStr for Venue {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(Venue::Binance),
            "bybit" => Ok(Venue::Bybit),
            "okx" => Ok(Venue::Okx),
            other => Err(EngineError::InvalidGateway(other.to_string())),
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Venue::Binance => "Binance",
            Venue::Bybit => "Bybit",
            Venue::Okx => "Okx",
        };
        write!(f, "{}", s)
    }
}

/// Candle bucket duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
}

impl Timeframe {
    pub fn secs(self) -> u64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::H1 => 3600,
        }
    }

    /// Interval code used by Binance ("1m" style)
    pub fn code(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
        }
    }

    /// OKX bar codes capitalize the hour suffix
    pub fn okx_code(self) -> &'static str {
        match self {
            Timeframe::H1 => "1H",
            other => other.code(),
        }
    }

    /// Bybit v5 uses bare minute counts
    pub fn bybit_code(self) -> &'static str {
        match self {
            Timeframe::M1 => "1",
            Timeframe::M5 => "5",
            Timeframe::M15 => "15",
            Timeframe::H1 => "60",
        }
    }
}

impl FromStr for Timeframe {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "1h" => Ok(Timeframe::H1),
            other => Err(EngineError::Validation(format!(
                "unsupported timeframe: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_parsing() {
        assert_eq!("binance".parse::<Venue>().unwrap(), Venue::Binance);
        assert_eq!("BYBIT".parse::<Venue>().unwrap(), Venue::Bybit);
        assert_eq!("Okx".parse::<Venue>().unwrap(), Venue::Okx);

        let err = "kraken".parse::<Venue>().unwrap_err();
        assert!(matches!(err, EngineError::InvalidGateway(ref v) if v == "kraken"));
    }

    #[test]
    fn test_timeframe_codes() {
        assert_eq!("1m".parse::<Timeframe>().unwrap(), Timeframe::M1);
        assert_eq!(Timeframe::M1.secs(), 60);
        assert_eq!(Timeframe::M5.code(), "5m");
        assert_eq!(Timeframe::M15.bybit_code(), "15");
        assert_eq!(Timeframe::H1.bybit_code(), "60");
        assert_eq!(Timeframe::H1.okx_code(), "1H");
        assert!("3d".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_signal_display() {
        assert_eq!(Signal::Long.to_string(), "LONG");
        assert_eq!(Signal::Short.to_string(), "SHORT");
        assert_eq!(Signal::Neutral.to_string(), "NEUTRAL");
    }
}
