use std::collections::{HashMap, HashSet};

use anyhow::{Result, bail};

use crate::domain::{Candle, Timeframe};

/// Bar access and symbol metadata for one symbol.
///
/// Bars are addressed series-style: shift 0 is the most recent bar,
/// shift 1 the one before it, and so on.
pub trait BarProvider {
    fn symbol(&self) -> &str;

    fn bar_count(&self, timeframe: Timeframe) -> usize;

    /// False while the provider is still back-filling this timeframe.
    fn is_synchronized(&self, timeframe: Timeframe) -> bool;

    fn bar(&self, timeframe: Timeframe, shift: usize) -> Option<Candle>;

    /// Current (bid, ask), if the provider quotes one.
    fn bid_ask(&self) -> Option<(f64, f64)> {
        None
    }

    /// Up to `count` bars, most recent first.
    fn recent_bars(&self, timeframe: Timeframe, count: usize) -> Vec<Candle> {
        let available = count.min(self.bar_count(timeframe));
        (0..available)
            .map_while(|shift| self.bar(timeframe, shift))
            .collect()
    }
}

/// In-memory provider fed bar by bar, e.g. from a live stream or a test.
#[derive(Debug, Clone, Default)]
pub struct MemoryFeed {
    symbol: String,
    // Oldest first
    bars: HashMap<Timeframe, Vec<Candle>>,
    unsynchronized: HashSet<Timeframe>,
    quote: Option<(f64, f64)>,
}

impl MemoryFeed {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            ..Default::default()
        }
    }

    /// Append a bar. A bar with the same timestamp as the last one replaces it
    /// (an update to the forming bar); older timestamps are rejected.
    pub fn push(&mut self, timeframe: Timeframe, candle: Candle) -> Result<()> {
        let series = self.bars.entry(timeframe).or_default();
        match series.last_mut() {
            Some(last) if last.timestamp_ms == candle.timestamp_ms => *last = candle,
            Some(last) if last.timestamp_ms > candle.timestamp_ms => bail!(
                "{} {}: bar at {} is older than the last bar at {}",
                self.symbol,
                timeframe,
                candle.timestamp_ms,
                last.timestamp_ms
            ),
            _ => series.push(candle),
        }
        Ok(())
    }

    pub fn extend(&mut self, timeframe: Timeframe, candles: impl IntoIterator<Item = Candle>) -> Result<()> {
        for candle in candles {
            self.push(timeframe, candle)?;
        }
        Ok(())
    }

    pub fn set_synchronized(&mut self, timeframe: Timeframe, synchronized: bool) {
        if synchronized {
            self.unsynchronized.remove(&timeframe);
        } else {
            self.unsynchronized.insert(timeframe);
        }
    }

    pub fn set_quote(&mut self, bid: f64, ask: f64) {
        self.quote = Some((bid, ask));
    }
}

impl BarProvider for MemoryFeed {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn bar_count(&self, timeframe: Timeframe) -> usize {
        self.bars.get(&timeframe).map_or(0, Vec::len)
    }

    fn is_synchronized(&self, timeframe: Timeframe) -> bool {
        !self.unsynchronized.contains(&timeframe)
    }

    fn bar(&self, timeframe: Timeframe, shift: usize) -> Option<Candle> {
        let series = self.bars.get(&timeframe)?;
        let idx = series.len().checked_sub(shift + 1)?;
        series.get(idx).copied()
    }

    fn bid_ask(&self) -> Option<(f64, f64)> {
        self.quote
    }
}
