//! Synthetic demo data configuration.
//!
//! Used when no bar cache is available: the CLI's `--synthetic` mode and the
//! `make_synthetic_cache` helper both build their series from this table.

use crate::domain::Timeframe;

/// One generated instrument.
pub struct DemoSymbol {
    pub symbol: &'static str,
    pub base_price: f64,
    /// Per-bar drift as a fraction of base price. 0 = ranging.
    pub drift_pct_per_bar: f64,
}

/// The Master Demo Configuration
pub struct DemoConfig {
    /// Timeframe the series are generated on; higher tiers are resampled.
    pub primary_timeframe: Timeframe,
    /// Bars generated per symbol
    pub bars: usize,
    pub symbols: &'static [DemoSymbol],
}

pub const DEMO: DemoConfig = DemoConfig {
    primary_timeframe: Timeframe::H1,
    bars: 1_000,

    symbols: &[
        DemoSymbol { symbol: "EURUSD", base_price: 1.0850, drift_pct_per_bar: 0.0 },
        DemoSymbol { symbol: "GBPUSD", base_price: 1.2700, drift_pct_per_bar: 0.00002 },
        DemoSymbol { symbol: "AUDUSD", base_price: 0.6600, drift_pct_per_bar: -0.00002 },
    ],
};
