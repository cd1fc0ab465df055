//! Configuration module for the level engine.

pub mod analysis;
pub mod demo;
pub mod level_config;
pub mod persistence;
pub mod timeframes;

pub(crate) mod debug; // Files use crate::config::debug::FLAG under cfg(debug_assertions)

// Re-export commonly used items
pub use analysis::{ANALYSIS, AnalysisConfig};
pub use demo::{DEMO, DemoConfig, DemoSymbol};
pub use level_config::LevelConfig;
pub use persistence::{KLINE_FILENAME_WITHOUT_EXT, KLINE_PATH, KLINE_VERSION, kline_cache_filename};
pub use timeframes::{TIMEFRAME_DEFAULTS, TimeframeDefaults, timeframe_defaults};
