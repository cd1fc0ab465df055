#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::type_complexity)]

// Core modules
pub mod analysis;
pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod models;
pub mod utils;

// Re-export commonly used types
pub use analysis::{BreakoutEvent, BreakoutState, MultiSymbolMonitor, Report};
pub use config::LevelConfig;
pub use data::{BarProvider, MemoryFeed, TimeSeriesCollection};
pub use domain::{BreakoutDirection, Candle, KeyLevel, LevelId, Timeframe, TrendBias};
pub use engine::{EngineEvent, LevelEngine};

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use crate::config::DEMO;
use crate::data::synthetic::{SyntheticSpec, synthetic_collection};
use crate::data::timeseries::cache_file::CacheFile;

// CLI argument parsing
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Bar cache to replay. Defaults to the cache for --timeframe under kline_data/
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Replay generated demo bars instead of a cache file
    #[arg(long, default_value_t = false)]
    pub synthetic: bool,

    /// Only replay this symbol
    #[arg(long)]
    pub symbol: Option<String>,

    /// Primary (trigger) timeframe
    #[arg(long, default_value = "H1")]
    pub timeframe: Timeframe,

    /// JSON file with LevelConfig overrides
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print final reports as JSON instead of text
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Bars per symbol in --synthetic mode
    #[arg(long, default_value_t = DEMO.bars)]
    pub bars: usize,
}

/// Demo symbols as generator inputs.
pub fn demo_specs() -> Vec<SyntheticSpec> {
    DEMO.symbols
        .iter()
        .map(|s| SyntheticSpec::trending(s.symbol, s.base_price, s.drift_pct_per_bar))
        .collect()
}

fn load_collection(cli: &Cli) -> Result<TimeSeriesCollection> {
    if cli.synthetic {
        return synthetic_collection(&demo_specs(), cli.timeframe, cli.bars);
    }
    let path = cli
        .cache
        .clone()
        .unwrap_or_else(|| CacheFile::default_cache_path(cli.timeframe));
    let cache = CacheFile::load_from_path(&path)
        .with_context(|| format!("No usable cache at {:?} (try --synthetic)", path))?;
    if cache.primary_timeframe != cli.timeframe {
        log::warn!(
            "Cache was built around {} but replaying on {}",
            cache.primary_timeframe,
            cli.timeframe
        );
    }
    Ok(cache.data)
}

/// Load bars, replay every symbol through its own engine and print the
/// final report of each.
pub fn run_cli(cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => LevelConfig::load_from_path(path)?,
        None => LevelConfig::default(),
    };

    let mut collection = load_collection(cli)?;
    if let Some(symbol) = &cli.symbol {
        collection.series_data.retain(|ts| ts.symbol.eq_ignore_ascii_case(symbol));
        if collection.series_data.is_empty() {
            bail!("Symbol {} not found in '{}'", symbol, collection.name);
        }
    }

    for series in collection.series_data.iter().filter(|ts| ts.timeframe == cli.timeframe) {
        if let Some((low, high)) = series.price_range() {
            log::info!(
                "{} {}: {} bars, range {:.5} - {:.5}",
                series.symbol,
                series.timeframe,
                series.klines(),
                low,
                high
            );
        }
    }

    let (monitor, summary) = data::replay_collection(&collection, cli.timeframe, &config)?;
    for (symbol, events) in &summary.events {
        for event in events {
            log::info!("[{}] {}", symbol, event);
        }
    }

    let reports = monitor.latest_reports();
    if cli.json {
        for report in reports {
            println!("{}", report.to_json()?);
        }
    } else {
        for report in reports {
            println!("{}", report.summary());
        }
        println!(
            "{} of {} symbols hold a valid level; {} breakouts over {} cycles",
            monitor.symbols_with_levels().len(),
            monitor.symbol_count(),
            summary.breakout_count(),
            summary.cycles
        );
    }
    Ok(())
}
