/// Calculate Simple Moving Average (SMA) over the last `period` values
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate the full SMA series, aligned index-for-index with the input
///
/// Entries before `period - 1` have no value (insufficient history),
/// matching standard SMA semantics - no smoothing, no weighting.
pub fn sma_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; prices.len()];
    }

    let mut series = Vec::with_capacity(prices.len());
    let mut window_sum = 0.0;

    for (i, price) in prices.iter().enumerate() {
        window_sum += price;
        if i >= period {
            window_sum -= prices[i - period];
        }

        if i + 1 >= period {
            series.push(Some(window_sum / period as f64));
        } else {
            series.push(None);
        }
    }

    series
}
