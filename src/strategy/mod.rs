// Signal evaluation module

use crate::error::EngineError;
use crate::models::Signal;
use crate::store::CandleStore;
use crate::Result;

/// Classify a live price against an indicator value
///
/// Long above the indicator, Short below, Neutral only on exact equality.
/// The exact-equality Neutral case is deliberate - it mirrors how the
/// indicator comparison has always behaved, even though two floats from a
/// live feed rarely land on the same representation.
pub fn classify(price: f64, indicator: f64) -> Signal {
    if price > indicator {
        Signal::Long
    } else if price < indicator {
        Signal::Short
    } else {
        Signal::Neutral
    }
}

/// Evaluate the live price against the store's latest indicator value
///
/// Returns the indicator value that was compared along with the signal.
/// Fails when the window is still shorter than the SMA period; callers
/// treat that as "keep collecting", not as a hard error.
pub fn evaluate_signal(price: f64, store: &CandleStore) -> Result<(f64, Signal)> {
    let indicator = store
        .latest_indicator_value()
        .ok_or(EngineError::IndicatorUnavailable {
            needed: store.period(),
            have: store.len(),
        })?;

    Ok((indicator, classify(price, indicator)))
}
