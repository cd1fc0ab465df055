// Bar access, storage, replay and synthetic data
pub mod provider;
pub mod replay;
pub mod synthetic;
pub mod timeseries;

// Re-export commonly used types
pub use provider::{BarProvider, MemoryFeed};
pub use replay::{HistoricalFeed, ReplaySummary, replay_collection, replay_symbol};
pub use timeseries::TimeSeriesCollection;
