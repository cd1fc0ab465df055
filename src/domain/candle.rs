use serde::{Deserialize, Serialize};

/// One OHLCV bar. `timestamp_ms` is the bar open time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp_ms: i64,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        timestamp_ms: i64,
        open_price: f64,
        high_price: f64,
        low_price: f64,
        close_price: f64,
        volume: f64,
    ) -> Self {
        Candle {
            timestamp_ms,
            open_price,
            high_price,
            low_price,
            close_price,
            volume,
        }
    }

    pub fn range(&self) -> f64 {
        self.high_price - self.low_price
    }

    /// True range against the previous bar's close.
    pub fn true_range(&self, prev_close: f64) -> f64 {
        self.range()
            .max((self.high_price - prev_close).abs())
            .max((self.low_price - prev_close).abs())
    }

    /// Does the bar's high-low span reach within `tolerance` of `price`?
    pub fn trades_through(&self, price: f64, tolerance: f64) -> bool {
        self.low_price <= price + tolerance && self.high_price >= price - tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn true_range_covers_gaps() {
        let c = Candle::new(0, 1.0, 1.2, 0.9, 1.1, 10.0);
        assert!((c.true_range(1.0) - 0.3).abs() < 1e-12);
        assert!((c.true_range(1.5) - 0.6).abs() < 1e-12);
        assert!((c.true_range(0.5) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn trades_through_uses_tolerance() {
        let c = Candle::new(0, 1.10, 1.105, 1.100, 1.102, 1.0);
        assert!(c.trades_through(1.1052, 0.0005));
        assert!(!c.trades_through(1.1060, 0.0005));
    }
}
