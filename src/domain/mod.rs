// Domain types and value objects
pub mod bias;
pub mod candle;
pub mod key_level;
pub mod timeframe;

// Re-export commonly used types
pub use bias::{BreakoutDirection, TrendBias};
pub use candle::Candle;
pub use key_level::{KeyLevel, LevelId, ScoringContext};
pub use timeframe::Timeframe;
