use argminmax::ArgMinMax;
use statrs::statistics::Statistics;

use crate::domain::Candle;

pub fn get_max(vec: &[f64]) -> f64 {
    let max_index: usize = vec.argmax();
    vec[max_index]
}

pub fn get_min(vec: &[f64]) -> f64 {
    let min_index: usize = vec.argmin();
    vec[min_index]
}

/// Mean of the values, or `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let m = values.iter().mean();
    m.is_finite().then_some(m)
}

/// Simple moving average of closes over the `period` most recent bars.
/// `bars` is most-recent-first.
pub fn sma_close(bars: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let closes: Vec<f64> = bars[..period].iter().map(|b| b.close_price).collect();
    mean(&closes)
}

/// Average volume of `period` bars starting at `skip` (most-recent-first).
/// Pass `skip = 1` to average the bars preceding the current one.
pub fn average_volume(bars: &[Candle], skip: usize, period: usize) -> Option<f64> {
    if period == 0 || bars.len() < skip + period {
        return None;
    }
    let volumes: Vec<f64> = bars[skip..skip + period].iter().map(|b| b.volume).collect();
    mean(&volumes)
}

/// Average True Range over `period` bars, simple (not Wilder-smoothed) average.
/// Needs `period + 1` bars so every true range has a previous close.
pub fn average_true_range(bars: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }
    let ranges: Vec<f64> = (0..period)
        .map(|i| bars[i].true_range(bars[i + 1].close_price))
        .collect();
    mean(&ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle::new(0, close, high, low, close, volume)
    }

    #[test]
    fn extremes() {
        let v = [3.0, 9.5, -1.0, 4.0];
        assert_eq!(get_max(&v), 9.5);
        assert_eq!(get_min(&v), -1.0);
    }

    #[test]
    fn mean_of_empty_is_none() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), Some(2.0));
    }

    #[test]
    fn sma_uses_most_recent_bars() {
        let bars = vec![
            bar(1.0, 1.0, 4.0, 1.0),
            bar(1.0, 1.0, 2.0, 1.0),
            bar(1.0, 1.0, 100.0, 1.0),
        ];
        assert_eq!(sma_close(&bars, 2), Some(3.0));
        assert_eq!(sma_close(&bars, 4), None);
    }

    #[test]
    fn average_volume_skips_current_bar() {
        let bars = vec![
            bar(1.0, 1.0, 1.0, 30.0),
            bar(1.0, 1.0, 1.0, 10.0),
            bar(1.0, 1.0, 1.0, 10.0),
        ];
        assert_eq!(average_volume(&bars, 1, 2), Some(10.0));
        assert_eq!(average_volume(&bars, 1, 3), None);
    }

    #[test]
    fn atr_includes_gaps() {
        // Current bar gaps above previous close: true range spans from previous close.
        let bars = vec![
            bar(12.0, 11.0, 11.5, 1.0),
            bar(10.5, 9.5, 10.0, 1.0),
            bar(10.0, 9.0, 9.5, 1.0),
        ];
        let atr = average_true_range(&bars, 2).unwrap();
        // TR0 = max(1.0, |12-10|, |11-10|) = 2.0, TR1 = max(1.0, 1.0, 0.0) = 1.0
        assert!((atr - 1.5).abs() < 1e-12);
    }

    #[test]
    fn flat_bars_have_zero_atr() {
        let bars = vec![bar(1.0, 1.0, 1.0, 1.0); 5];
        assert_eq!(average_true_range(&bars, 3), Some(0.0));
    }
}
