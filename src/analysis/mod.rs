// Level detection, scoring, trend gating and breakout validation
pub mod breakout;
pub mod level_registry;
pub mod level_scoring;
pub mod multi_symbol_monitor;
pub mod report;
pub mod swing_points;
pub mod trend;

// Re-export commonly used types
pub use breakout::{BreakoutEvent, BreakoutState, BreakoutValidator, RejectReason};
pub use level_registry::LevelRegistry;
pub use multi_symbol_monitor::MultiSymbolMonitor;
pub use report::{Report, TimeframeLevelSnapshot};
pub use swing_points::{SwingExtractor, SwingKind, SwingPoint};
pub use trend::TrendAnalyzer;
