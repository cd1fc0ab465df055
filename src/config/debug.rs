//! Debugging feature flags.
//!
//! Toggle individual diagnostics here; keep them `false` by default so release
//! builds remain quiet. All of them are further gated by `cfg(debug_assertions)`.

/// Emit every scored candidate level (price, touches, strength) per timeframe.
pub const PRINT_LEVEL_SCORING: bool = false;

/// Emit registry merges and evictions (stale, weak, broken, over capacity).
pub const PRINT_REGISTRY_EVENTS: bool = false;

/// Emit trend bias recomputations on the higher timeframe.
pub const PRINT_TREND_UPDATES: bool = false;

/// Emit every breakout state machine transition.
pub const PRINT_BREAKOUT_TRANSITIONS: bool = false;

/// Emit detailed serialization/deserialization logs.
pub const PRINT_SERDE: bool = false;
