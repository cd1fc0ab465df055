use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::domain::{Candle, Timeframe};
use crate::utils::maths_utils::{get_max, get_min};

// ============================================================================
// OhlcvTimeSeries: Raw time series data for one symbol on one timeframe
// ============================================================================

/// Columnar bar storage, oldest bar first, one bar per `timeframe` interval
/// starting at `first_kline_timestamp_ms`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OhlcvTimeSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub first_kline_timestamp_ms: i64,

    // Prices
    pub open_prices: Vec<f64>,
    pub high_prices: Vec<f64>,
    pub low_prices: Vec<f64>,
    pub close_prices: Vec<f64>,

    // Volumes
    pub volumes: Vec<f64>,
}

impl OhlcvTimeSeries {
    pub fn new(symbol: &str, timeframe: Timeframe, first_kline_timestamp_ms: i64) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            first_kline_timestamp_ms,
            open_prices: Vec::new(),
            high_prices: Vec::new(),
            low_prices: Vec::new(),
            close_prices: Vec::new(),
            volumes: Vec::new(),
        }
    }

    /// Build from oldest-first candles. Timestamps must be consecutive intervals.
    pub fn from_candles(symbol: &str, timeframe: Timeframe, candles: &[Candle]) -> Result<Self> {
        let first = candles
            .first()
            .ok_or_else(|| anyhow!("Cannot build {} {} series from no candles", symbol, timeframe))?;
        let mut series = Self::new(symbol, timeframe, first.timestamp_ms);
        for candle in candles {
            series.push(candle)?;
        }
        Ok(series)
    }

    /// Append the next bar. Rejects bars that do not land on the next interval.
    pub fn push(&mut self, candle: &Candle) -> Result<()> {
        let expected = self.timestamp_at(self.klines());
        if candle.timestamp_ms != expected {
            bail!(
                "{} {}: bar at {} does not follow series (expected {})",
                self.symbol,
                self.timeframe,
                candle.timestamp_ms,
                expected
            );
        }
        self.open_prices.push(candle.open_price);
        self.high_prices.push(candle.high_price);
        self.low_prices.push(candle.low_price);
        self.close_prices.push(candle.close_price);
        self.volumes.push(candle.volume);
        Ok(())
    }

    /// Check the columns line up. Deserialized data is not trusted to.
    pub fn validate(&self) -> Result<()> {
        let n = self.klines();
        let lengths = [
            self.open_prices.len(),
            self.high_prices.len(),
            self.low_prices.len(),
            self.volumes.len(),
        ];
        if lengths.iter().any(|&len| len != n) {
            bail!(
                "{} {}: column lengths differ (open/high/low/volume {:?}, close {})",
                self.symbol,
                self.timeframe,
                lengths,
                n
            );
        }
        Ok(())
    }

    pub fn klines(&self) -> usize {
        self.close_prices.len()
    }

    pub fn timestamp_at(&self, idx: usize) -> i64 {
        self.first_kline_timestamp_ms + idx as i64 * self.timeframe.interval_ms()
    }

    pub fn last_timestamp_ms(&self) -> Option<i64> {
        self.klines().checked_sub(1).map(|idx| self.timestamp_at(idx))
    }

    /// Lowest low and highest high over the whole series.
    pub fn price_range(&self) -> Option<(f64, f64)> {
        if self.klines() == 0 {
            return None;
        }
        Some((get_min(&self.low_prices), get_max(&self.high_prices)))
    }

    pub fn get_candle(&self, idx: usize) -> Candle {
        Candle::new(
            self.timestamp_at(idx),
            self.open_prices[idx],
            self.high_prices[idx],
            self.low_prices[idx],
            self.close_prices[idx],
            self.volumes[idx],
        )
    }

    /// Number of bars whose open time is at or before `now_ms`.
    pub fn count_until(&self, now_ms: i64) -> usize {
        if now_ms < self.first_kline_timestamp_ms {
            return 0;
        }
        let elapsed = (now_ms - self.first_kline_timestamp_ms) / self.timeframe.interval_ms();
        (elapsed as usize + 1).min(self.klines())
    }

    /// Aggregate into a coarser timeframe. Buckets align to multiples of the
    /// target interval since epoch. A partial trailing bucket is kept.
    pub fn resample(&self, target: Timeframe) -> Result<OhlcvTimeSeries> {
        let step = target.interval_ms();
        if step < self.timeframe.interval_ms() || step % self.timeframe.interval_ms() != 0 {
            bail!(
                "Cannot resample {} into {}: target must be a whole multiple",
                self.timeframe,
                target
            );
        }

        let mut out: Vec<Candle> = Vec::new();
        for idx in 0..self.klines() {
            let bar = self.get_candle(idx);
            let bucket_start = bar.timestamp_ms.div_euclid(step) * step;
            match out.last_mut() {
                Some(agg) if agg.timestamp_ms == bucket_start => {
                    agg.high_price = agg.high_price.max(bar.high_price);
                    agg.low_price = agg.low_price.min(bar.low_price);
                    agg.close_price = bar.close_price;
                    agg.volume += bar.volume;
                }
                _ => out.push(Candle { timestamp_ms: bucket_start, ..bar }),
            }
        }

        // Source bars are contiguous, so the buckets are too
        OhlcvTimeSeries::from_candles(&self.symbol, target, &out)
    }
}

pub fn find_matching_ohlcv<'a>(
    timeseries_data: &'a [OhlcvTimeSeries],
    symbol: &str,
    timeframe: Timeframe,
) -> Result<&'a OhlcvTimeSeries> {
    timeseries_data
        .iter()
        .find(|ohlcv| ohlcv.symbol == symbol && ohlcv.timeframe == timeframe)
        .ok_or_else(|| {
            anyhow!(
                "No matching OHLCV data found for symbol {} on timeframe {}",
                symbol,
                timeframe
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::TimeUtils;

    fn hourly(n: usize) -> OhlcvTimeSeries {
        let candles: Vec<Candle> = (0..n)
            .map(|i| {
                let p = 1.0 + i as f64 * 0.01;
                Candle::new(i as i64 * TimeUtils::MS_IN_H, p, p + 0.005, p - 0.005, p + 0.002, 10.0)
            })
            .collect();
        OhlcvTimeSeries::from_candles("EURUSD", Timeframe::H1, &candles).unwrap()
    }

    #[test]
    fn push_rejects_out_of_sequence_bars() {
        let mut series = hourly(2);
        let wrong = Candle::new(5 * TimeUtils::MS_IN_H, 1.0, 1.0, 1.0, 1.0, 1.0);
        assert!(series.push(&wrong).is_err());
        assert_eq!(series.klines(), 2);
    }

    #[test]
    fn price_range_spans_wicks() {
        let series = hourly(5);
        let (low, high) = series.price_range().unwrap();
        assert!((low - 0.995).abs() < 1e-12);
        assert!((high - 1.045).abs() < 1e-12);
        assert!(OhlcvTimeSeries::new("EURUSD", Timeframe::H1, 0).price_range().is_none());
    }

    #[test]
    fn ragged_columns_fail_validation() {
        let mut series = hourly(3);
        assert!(series.validate().is_ok());
        series.volumes.pop();
        let err = series.validate().unwrap_err();
        assert!(err.to_string().contains("column lengths differ"));
    }

    #[test]
    fn count_until_respects_cursor() {
        let series = hourly(10);
        assert_eq!(series.count_until(-1), 0);
        assert_eq!(series.count_until(0), 1);
        assert_eq!(series.count_until(3 * TimeUtils::MS_IN_H + 5), 4);
        assert_eq!(series.count_until(100 * TimeUtils::MS_IN_H), 10);
    }

    #[test]
    fn resample_to_h4() {
        let series = hourly(10);
        let h4 = series.resample(Timeframe::H4).unwrap();
        assert_eq!(h4.klines(), 3);
        let first = h4.get_candle(0);
        assert_eq!(first.open_price, series.open_prices[0]);
        assert_eq!(first.close_price, series.close_prices[3]);
        assert_eq!(first.high_price, series.high_prices[3]);
        assert_eq!(first.low_price, series.low_prices[0]);
        assert_eq!(first.volume, 40.0);
        // trailing partial bucket: bars 8 and 9
        assert_eq!(h4.get_candle(2).volume, 20.0);
    }

    #[test]
    fn resample_rejects_finer_target() {
        assert!(hourly(4).resample(Timeframe::M15).is_err());
    }

    #[test]
    fn find_matching_by_symbol_and_timeframe() {
        let data = vec![hourly(3)];
        assert!(find_matching_ohlcv(&data, "EURUSD", Timeframe::H1).is_ok());
        assert!(find_matching_ohlcv(&data, "EURUSD", Timeframe::H4).is_err());
        assert!(find_matching_ohlcv(&data, "GBPUSD", Timeframe::H1).is_err());
    }
}
