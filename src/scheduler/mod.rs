use crate::models::Timeframe;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Remaining time until the next wall-clock timeframe boundary
///
/// Boundaries are multiples of the timeframe in UTC (for 1m: every minute
/// rollover). Deterministic given `now`, millisecond precision. At the
/// exact instant of a boundary the next one is a full period away - the
/// crossing itself is reported by [`BoundaryTracker`], never here.
pub fn time_until_next_boundary(now: DateTime<Utc>, timeframe: Timeframe) -> Duration {
    let timeframe_ms = timeframe.secs() as i64 * 1000;
    let into_bucket_ms = now.timestamp_millis().rem_euclid(timeframe_ms);

    let remaining_ms = if into_bucket_ms == 0 {
        timeframe_ms
    } else {
        timeframe_ms - into_bucket_ms
    };

    Duration::from_millis(remaining_ms as u64)
}

/// Monotonically increasing id of the timeframe bucket containing `now`
pub fn boundary_id(now: DateTime<Utc>, timeframe: Timeframe) -> i64 {
    now.timestamp_millis()
        .div_euclid(timeframe.secs() as i64 * 1000)
}

/// Deduplicated boundary-crossing detector
///
/// Polled at fine granularity (the engine checks every 200ms); fires at
/// most once per boundary no matter how often it is polled within the same
/// bucket. Created "armed" at the current bucket so the partially elapsed
/// bucket at startup never fires retroactively.
#[derive(Debug)]
pub struct BoundaryTracker {
    timeframe: Timeframe,
    last_fired: i64,
}

impl BoundaryTracker {
    pub fn new(timeframe: Timeframe, now: DateTime<Utc>) -> Self {
        Self {
            timeframe,
            last_fired: boundary_id(now, timeframe),
        }
    }

    /// Returns true exactly once per boundary crossing
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        let id = boundary_id(now, self.timeframe);
        if id > self.last_fired {
            self.last_fired = id;
            true
        } else {
            false
        }
    }
}
