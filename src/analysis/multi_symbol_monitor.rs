use std::collections::BTreeMap;

use anyhow::{Result, anyhow};

use crate::analysis::report::Report;
use crate::config::LevelConfig;
use crate::data::BarProvider;
use crate::domain::Timeframe;
use crate::engine::{CycleOutcome, EngineEvent, LevelEngine};

/// One engine per symbol, driven independently.
#[derive(Default)]
pub struct MultiSymbolMonitor {
    engines: BTreeMap<String, LevelEngine>,
}

impl MultiSymbolMonitor {
    /// Create a new empty monitor
    pub fn new() -> Self {
        Self::default()
    }

    /// Start monitoring a symbol. Replaces any engine already registered for it.
    pub fn add_symbol(&mut self, symbol: &str, config: LevelConfig) -> Result<()> {
        let engine = LevelEngine::new(symbol, config)?;
        self.engines.insert(symbol.to_string(), engine);
        Ok(())
    }

    pub fn insert_engine(&mut self, engine: LevelEngine) {
        self.engines.insert(engine.symbol().to_string(), engine);
    }

    /// Route a new-bar notification to the provider's symbol.
    pub fn process_bar(&mut self, provider: &dyn BarProvider, timeframe: Timeframe) -> Result<CycleOutcome> {
        let engine = self
            .engines
            .get_mut(provider.symbol())
            .ok_or_else(|| anyhow!("Symbol {} is not monitored", provider.symbol()))?;
        engine.on_new_bar(provider, timeframe)
    }

    pub fn get_engine(&self, symbol: &str) -> Option<&LevelEngine> {
        self.engines.get(symbol)
    }

    pub fn get_engine_mut(&mut self, symbol: &str) -> Option<&mut LevelEngine> {
        self.engines.get_mut(symbol)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.engines.keys().cloned().collect()
    }

    pub fn symbol_count(&self) -> usize {
        self.engines.len()
    }

    /// Latest report per symbol, for symbols that have completed a cycle.
    pub fn latest_reports(&self) -> Vec<&Report> {
        self.engines.values().filter_map(|e| e.latest_report()).collect()
    }

    /// Symbols whose latest report has at least one valid timeframe.
    pub fn symbols_with_levels(&self) -> Vec<String> {
        self.engines
            .iter()
            .filter(|(_, e)| e.latest_report().is_some_and(|r| r.is_valid))
            .map(|(symbol, _)| symbol.clone())
            .collect()
    }

    /// Subscribe to every engine's events at once.
    pub fn subscribe_all(&mut self) -> Vec<(String, std::sync::mpsc::Receiver<EngineEvent>)> {
        self.engines
            .iter_mut()
            .map(|(symbol, engine)| (symbol.clone(), engine.subscribe()))
            .collect()
    }
}
