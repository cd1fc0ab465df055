//! Deterministic synthetic bar series for demos and tests.
//!
//! Prices are a sum of sine waves around a base price plus a linear drift,
//! so the same parameters always yield the same bars.

use std::f64::consts::TAU;

use anyhow::Result;

use crate::data::timeseries::TimeSeriesCollection;
use crate::domain::{Candle, Timeframe};
use crate::models::OhlcvTimeSeries;

/// 2024-01-01T00:00:00Z, on a day boundary.
pub const SYNTHETIC_START_MS: i64 = 1_704_067_200_000;

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSpec {
    pub symbol: String,
    pub base_price: f64,
    /// Peak deviation of the oscillation, as a fraction of base price.
    pub amplitude_pct: f64,
    /// Price change per bar, as a fraction of base price.
    pub drift_pct_per_bar: f64,
    pub base_volume: f64,
    /// Every n-th bar trades with triple volume. 0 disables spikes.
    pub volume_spike_every: usize,
}

impl SyntheticSpec {
    pub fn ranging(symbol: &str, base_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            base_price,
            amplitude_pct: 0.004,
            drift_pct_per_bar: 0.0,
            base_volume: 1_000.0,
            volume_spike_every: 47,
        }
    }

    pub fn trending(symbol: &str, base_price: f64, drift_pct_per_bar: f64) -> Self {
        Self {
            drift_pct_per_bar,
            ..Self::ranging(symbol, base_price)
        }
    }

    fn price_at(&self, i: usize) -> f64 {
        let x = i as f64;
        let wave = 0.6 * (TAU * x / 40.0).sin()
            + 0.3 * (TAU * x / 13.0 + 1.0).sin()
            + 0.1 * (TAU * x / 5.0).sin();
        self.base_price * (1.0 + self.drift_pct_per_bar * x + self.amplitude_pct * wave)
    }

    pub fn candles(&self, timeframe: Timeframe, count: usize) -> Vec<Candle> {
        let interval = timeframe.interval_ms();
        let mut prev_close = self.price_at(0);
        (0..count)
            .map(|i| {
                let close = self.price_at(i + 1);
                let open = prev_close;
                prev_close = close;
                let wick = self.base_price * self.amplitude_pct * 0.08 * (1.0 + (i as f64 * 0.7).sin().abs());
                let spike = self.volume_spike_every > 0 && i > 0 && i % self.volume_spike_every == 0;
                let volume = self.base_volume
                    * (1.0 + 0.3 * (i as f64 / 7.0).sin())
                    * if spike { 3.0 } else { 1.0 };
                Candle::new(
                    SYNTHETIC_START_MS + i as i64 * interval,
                    open,
                    open.max(close) + wick,
                    open.min(close) - wick,
                    close,
                    volume,
                )
            })
            .collect()
    }
}

/// Build a collection with `bars` primary-timeframe bars per symbol, plus the
/// two tiers above it resampled from the primary series.
pub fn synthetic_collection(
    specs: &[SyntheticSpec],
    primary: Timeframe,
    bars: usize,
) -> Result<TimeSeriesCollection> {
    let mut collection = TimeSeriesCollection::new("Synthetic Collection");
    for spec in specs {
        let candles = spec.candles(primary, bars);
        collection.upsert(OhlcvTimeSeries::from_candles(&spec.symbol, primary, &candles)?);
    }
    let higher = primary.higher();
    collection.ensure_resampled(primary, &[higher, higher.higher()])?;
    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_output() {
        let spec = SyntheticSpec::ranging("EURUSD", 1.10);
        assert_eq!(spec.candles(Timeframe::H1, 30), spec.candles(Timeframe::H1, 30));
    }

    #[test]
    fn bars_are_well_formed() {
        let spec = SyntheticSpec::trending("EURUSD", 1.10, 0.0001);
        for c in spec.candles(Timeframe::H1, 200) {
            assert!(c.high_price >= c.open_price.max(c.close_price));
            assert!(c.low_price <= c.open_price.min(c.close_price));
            assert!(c.volume > 0.0);
        }
    }

    #[test]
    fn collection_includes_higher_tiers() {
        let collection =
            synthetic_collection(&[SyntheticSpec::ranging("EURUSD", 1.10)], Timeframe::H1, 96).unwrap();
        assert_eq!(
            collection.timeframes_for("EURUSD"),
            vec![Timeframe::H1, Timeframe::H4, Timeframe::D1]
        );
    }
}
