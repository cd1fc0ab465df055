// Bar storage models
// These modules contain pure data containers independent of the analysis engine

pub mod timeseries;

// Re-export key types for convenience
pub use timeseries::{OhlcvTimeSeries, find_matching_ohlcv};
