pub mod cache_file;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::Timeframe;
pub use crate::models::OhlcvTimeSeries;
use crate::models::find_matching_ohlcv;

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct TimeSeriesCollection {
    pub name: String, // Metadata e.g. "Synthetic FX Collection".
    pub series_data: Vec<OhlcvTimeSeries>,
}

impl TimeSeriesCollection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            series_data: Vec::new(),
        }
    }

    pub fn unique_symbols(&self) -> Vec<String> {
        // BTreeSet maintains sorted order and ensures uniqueness
        self.series_data
            .iter()
            .map(|ts| ts.symbol.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn timeframes_for(&self, symbol: &str) -> Vec<Timeframe> {
        self.series_data
            .iter()
            .filter(|ts| ts.symbol == symbol)
            .map(|ts| ts.timeframe)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn get(&self, symbol: &str, timeframe: Timeframe) -> Result<&OhlcvTimeSeries> {
        find_matching_ohlcv(&self.series_data, symbol, timeframe)
    }

    /// Insert or replace the series for its (symbol, timeframe).
    pub fn upsert(&mut self, series: OhlcvTimeSeries) {
        match self
            .series_data
            .iter_mut()
            .find(|ts| ts.symbol == series.symbol && ts.timeframe == series.timeframe)
        {
            Some(existing) => *existing = series,
            None => self.series_data.push(series),
        }
    }

    /// Derive each missing higher timeframe from `base` for every symbol.
    pub fn ensure_resampled(&mut self, base: Timeframe, targets: &[Timeframe]) -> Result<()> {
        for symbol in self.unique_symbols() {
            let source = self.get(&symbol, base)?.clone();
            for &target in targets {
                if target != base && self.get(&symbol, target).is_err() {
                    self.upsert(source.resample(target)?);
                }
            }
        }
        Ok(())
    }
}
