pub mod core;
pub mod messages;
pub mod state;

// Re-export key components
pub use self::core::LevelEngine;
pub use messages::{CycleOutcome, EngineEvent};
pub use state::StrategyState;
