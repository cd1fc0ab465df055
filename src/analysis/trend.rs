//! Higher-timeframe trend bias: moving-average position plus swing structure.

use std::collections::HashMap;

use itertools::Itertools;

use crate::analysis::swing_points::SwingExtractor;
use crate::data::BarProvider;
use crate::domain::{Candle, Timeframe, TrendBias};
use crate::utils::maths_utils::sma_close;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendParams {
    pub ma_period: usize,
    /// Swings that must form a strictly monotonic sequence.
    pub swing_count: usize,
    /// Bars fetched from the trend timeframe.
    pub window: usize,
}

/// Bias from most-recent-first bars.
///
/// Bullish needs the latest close above the SMA and the last `swing_count`
/// swing highs rising in time order; Bearish mirrors that with lows.
/// Anything else, including too little history, is Neutral.
pub fn trend_bias(bars: &[Candle], ma_period: usize, swing_count: usize) -> TrendBias {
    let Some(sma) = sma_close(bars, ma_period) else {
        return TrendBias::Neutral;
    };
    let close = bars[0].close_price;
    let swings = SwingExtractor::new(bars, bars.len());

    if close > sma && strictly_monotonic(swings.highs().map(|p| p.price), swing_count, |a, b| a < b) {
        TrendBias::Bullish
    } else if close < sma && strictly_monotonic(swings.lows().map(|p| p.price), swing_count, |a, b| a > b) {
        TrendBias::Bearish
    } else {
        TrendBias::Neutral
    }
}

/// Takes newest-first prices, checks the `count` most recent in chronological order.
fn strictly_monotonic(
    newest_first: impl Iterator<Item = f64>,
    count: usize,
    ordered: impl Fn(f64, f64) -> bool,
) -> bool {
    let mut recent: Vec<f64> = newest_first.take(count).collect();
    if count < 2 || recent.len() < count {
        return false;
    }
    recent.reverse();
    recent.into_iter().tuple_windows().all(|(a, b)| ordered(a, b))
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CachedBias {
    bar_timestamp_ms: i64,
    bias: TrendBias,
}

/// Bias per trend timeframe, recomputed only when that timeframe prints a new bar.
#[derive(Debug, Clone, Default)]
pub struct TrendAnalyzer {
    cache: HashMap<Timeframe, CachedBias>,
}

impl TrendAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bias(&mut self, provider: &dyn BarProvider, timeframe: Timeframe, params: &TrendParams) -> TrendBias {
        if !provider.is_synchronized(timeframe) {
            return TrendBias::Neutral;
        }
        let Some(latest) = provider.bar(timeframe, 0) else {
            return TrendBias::Neutral;
        };
        if let Some(cached) = self.cache.get(&timeframe) {
            if cached.bar_timestamp_ms == latest.timestamp_ms {
                return cached.bias;
            }
        }

        let bars = provider.recent_bars(timeframe, params.window.max(params.ma_period));
        let bias = trend_bias(&bars, params.ma_period, params.swing_count);

        #[cfg(debug_assertions)]
        if crate::config::debug::PRINT_TREND_UPDATES {
            log::info!(
                "   {} trend on {}: {} ({} bars)",
                provider.symbol(),
                timeframe,
                bias,
                bars.len()
            );
        }

        self.cache.insert(
            timeframe,
            CachedBias {
                bar_timestamp_ms: latest.timestamp_ms,
                bias,
            },
        );
        bias
    }

    pub fn cached(&self, timeframe: Timeframe) -> Option<TrendBias> {
        self.cache.get(&timeframe).map(|c| c.bias)
    }
}
