//! Bar-by-bar replay of a stored collection through level engines.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::analysis::MultiSymbolMonitor;
use crate::config::LevelConfig;
use crate::data::BarProvider;
use crate::data::timeseries::TimeSeriesCollection;
use crate::domain::{Candle, Timeframe};
use crate::engine::{EngineEvent, LevelEngine};

/// A collection seen as a live provider at a movable "now".
///
/// `now_ms` is the open time of the current primary bar. Only bars closed by
/// the end of that bar are visible, so a higher timeframe never leaks its
/// still-forming aggregate.
#[derive(Debug, Clone)]
pub struct HistoricalFeed<'a> {
    collection: &'a TimeSeriesCollection,
    symbol: String,
    primary: Timeframe,
    now_ms: i64,
}

impl<'a> HistoricalFeed<'a> {
    pub fn new(collection: &'a TimeSeriesCollection, symbol: &str, primary: Timeframe) -> Self {
        Self {
            collection,
            symbol: symbol.to_string(),
            primary,
            now_ms: i64::MIN,
        }
    }

    pub fn set_now(&mut self, now_ms: i64) {
        self.now_ms = now_ms;
    }

    pub fn now_ms(&self) -> i64 {
        self.now_ms
    }

    fn visible(&self, timeframe: Timeframe) -> usize {
        let Ok(series) = self.collection.get(&self.symbol, timeframe) else {
            return 0;
        };
        let cursor_close = self.now_ms.saturating_add(self.primary.interval_ms());
        series.count_until(cursor_close.saturating_sub(timeframe.interval_ms()))
    }
}

impl BarProvider for HistoricalFeed<'_> {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn bar_count(&self, timeframe: Timeframe) -> usize {
        self.visible(timeframe)
    }

    fn is_synchronized(&self, _timeframe: Timeframe) -> bool {
        true
    }

    fn bar(&self, timeframe: Timeframe, shift: usize) -> Option<Candle> {
        let series = self.collection.get(&self.symbol, timeframe).ok()?;
        let idx = self.visible(timeframe).checked_sub(shift + 1)?;
        Some(series.get_candle(idx))
    }
}

/// Everything one symbol's replay produced.
pub struct SymbolReplay {
    pub engine: LevelEngine,
    pub events: Vec<EngineEvent>,
    pub cycles: usize,
}

/// Feed every primary bar of `symbol` to a fresh engine, oldest first.
pub fn replay_symbol(
    collection: &TimeSeriesCollection,
    symbol: &str,
    primary: Timeframe,
    config: &LevelConfig,
) -> Result<SymbolReplay> {
    let series = collection
        .get(symbol, primary)
        .with_context(|| format!("Cannot replay {} on {}", symbol, primary))?;
    let mut engine = LevelEngine::new(symbol, config.clone())?;
    let mut feed = HistoricalFeed::new(collection, symbol, primary);
    let mut events = Vec::new();

    for idx in 0..series.klines() {
        feed.set_now(series.timestamp_at(idx));
        let outcome = engine.on_new_bar(&feed, primary)?;
        events.extend(outcome.events);
    }

    Ok(SymbolReplay {
        engine,
        events,
        cycles: series.klines(),
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplaySummary {
    pub cycles: usize,
    pub events: BTreeMap<String, Vec<EngineEvent>>,
}

impl ReplaySummary {
    pub fn breakout_count(&self) -> usize {
        self.events
            .values()
            .flatten()
            .filter(|e| matches!(e, EngineEvent::Breakout(_)))
            .count()
    }

    pub fn event_count(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }
}

/// Replay every symbol in the collection, one symbol per rayon task.
pub fn replay_collection(
    collection: &TimeSeriesCollection,
    primary: Timeframe,
    config: &LevelConfig,
) -> Result<(MultiSymbolMonitor, ReplaySummary)> {
    let symbols = collection.unique_symbols();
    log::info!(
        "Replaying {} symbols on {} from '{}'",
        symbols.len(),
        primary,
        collection.name
    );

    let replays: Vec<SymbolReplay> = symbols
        .par_iter()
        .map(|symbol| replay_symbol(collection, symbol, primary, config))
        .collect::<Result<_>>()?;

    let mut monitor = MultiSymbolMonitor::new();
    let mut summary = ReplaySummary::default();
    for replay in replays {
        summary.cycles += replay.cycles;
        summary
            .events
            .insert(replay.engine.symbol().to_string(), replay.events);
        monitor.insert_engine(replay.engine);
    }

    log::info!(
        "Replay done: {} cycles, {} events, {} breakouts",
        summary.cycles,
        summary.event_count(),
        summary.breakout_count()
    );
    Ok((monitor, summary))
}
