use crate::error::EngineError;
use crate::indicators::sma_series;
use crate::models::Candle;
use crate::Result;
use std::sync::{Arc, RwLock};

/// Thread-safe holder for the rolling candle window and its SMA series
///
/// The window is swapped wholesale on each refresh; the indicator series is
/// recomputed at swap time and stays aligned index-for-index with the
/// candles. Clones share the same underlying window.
#[derive(Clone)]
pub struct CandleStore {
    inner: Arc<RwLock<Window>>,
    period: usize,
}

#[derive(Default)]
struct Window {
    candles: Vec<Candle>,
    sma: Vec<Option<f64>>,
}

impl CandleStore {
    /// Create an empty store computing an SMA of the given period
    pub fn new(period: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Window::default())),
            period,
        }
    }

    /// Atomically replace the stored window with a fresh fetch
    ///
    /// Rejects candle sequences whose open times are not strictly
    /// increasing - out-of-order or duplicated buckets mean the venue
    /// returned garbage and the whole refresh is discarded.
    pub fn replace_window(&self, candles: Vec<Candle>) -> Result<()> {
        for pair in candles.windows(2) {
            if pair[1].open_time <= pair[0].open_time {
                return Err(EngineError::Validation(format!(
                    "candle open times not strictly increasing: {} followed by {}",
                    pair[0].open_time, pair[1].open_time
                )));
            }
        }

        let sma = sma_series(
            &candles.iter().map(|c| c.close).collect::<Vec<_>>(),
            self.period,
        );

        let mut window = self.inner.write().expect("candle window lock poisoned");
        window.candles = candles;
        window.sma = sma;

        Ok(())
    }

    /// Last `n` fully-closed candles, oldest-first
    ///
    /// The newest stored candle is excluded because it may still be
    /// forming. Returns an empty vec when fewer than `n + 1` candles are
    /// stored - display either shows the full set or nothing.
    pub fn latest_closed_candles(&self, n: usize) -> Vec<Candle> {
        let window = self.inner.read().expect("candle window lock poisoned");

        if window.candles.len() < n + 1 {
            return Vec::new();
        }

        let end = window.candles.len() - 1;
        window.candles[end - n..end].to_vec()
    }

    /// SMA value for the newest stored candle, if enough history exists
    pub fn latest_indicator_value(&self) -> Option<f64> {
        let window = self.inner.read().expect("candle window lock poisoned");
        window.sma.last().copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("candle window lock poisoned")
            .candles
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candle(minute: u32, close: f64) -> Candle {
        Candle {
            open_time: Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        }
    }

    fn filled_store(period: usize, closes: &[f64]) -> CandleStore {
        let store = CandleStore::new(period);
        let candles: Vec<Candle> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| candle(i as u32, c))
            .collect();
        store.replace_window(candles).unwrap();
        store
    }

    #[test]
    fn test_replace_window_rejects_unordered() {
        let store = CandleStore::new(3);
        let candles = vec![candle(2, 100.0), candle(1, 101.0)];

        let err = store.replace_window(candles).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_replace_window_rejects_duplicate_open_time() {
        let store = CandleStore::new(3);
        let candles = vec![candle(1, 100.0), candle(1, 101.0)];

        assert!(store.replace_window(candles).is_err());
    }

    #[test]
    fn test_replace_window_swaps_atomically() {
        let store = filled_store(2, &[1.0, 2.0, 3.0]);
        assert_eq!(store.len(), 3);

        store
            .replace_window(vec![candle(5, 10.0), candle(6, 11.0)])
            .unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.latest_indicator_value(), Some(10.5));
    }

    #[test]
    fn test_latest_closed_excludes_forming_candle() {
        let store = filled_store(3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);

        let closed = store.latest_closed_candles(5);
        assert_eq!(closed.len(), 5);
        // Newest stored candle (close=7.0) must never appear
        assert_eq!(closed.last().unwrap().close, 6.0);
        assert_eq!(closed[0].close, 2.0);
    }

    #[test]
    fn test_latest_closed_empty_when_too_few() {
        // Exactly n candles stored: excluding the forming one leaves n-1,
        // so nothing is surfaced
        let store = filled_store(2, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(store.latest_closed_candles(5).is_empty());

        let store = filled_store(2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(store.latest_closed_candles(5).len(), 5);
    }

    #[test]
    fn test_latest_indicator_value() {
        let store = filled_store(3, &[3.0, 6.0, 9.0]);
        assert_eq!(store.latest_indicator_value(), Some(6.0));
    }

    #[test]
    fn test_indicator_unavailable_below_period() {
        let store = filled_store(20, &[1.0, 2.0, 3.0]);
        assert_eq!(store.latest_indicator_value(), None);

        let empty = CandleStore::new(20);
        assert_eq!(empty.latest_indicator_value(), None);
    }

    #[test]
    fn test_shared_between_clones() {
        let store = CandleStore::new(2);
        let other = store.clone();

        store
            .replace_window(vec![candle(0, 1.0), candle(1, 2.0)])
            .unwrap();
        assert_eq!(other.len(), 2);
        assert_eq!(other.latest_indicator_value(), Some(1.5));
    }
}
