//! Analysis and computation configuration

/// Weights of the level strength score. They sum to 1.0.
pub struct StrengthWeights {
    pub touch: f64,
    pub recency: f64,
    pub volume: f64,
    // Touch term is 1 - e^(-touches / touch_saturation); ~92% saturated at 5 touches
    pub touch_saturation: f64,
}

/// Defaults for the runtime-tunable options of `LevelConfig`.
pub struct LevelDefaults {
    pub min_strength: f64,
    pub min_touches: usize,
    pub volume_confirmation_ratio: f64,
    pub retest_required: bool,
    pub retest_timeout_bars: usize,
    pub atr_period: usize,
    // Minimum close distance beyond a level, in ATRs, for a breakout candidate
    pub breakout_atr_multiple: f64,
    // Close distance beyond a level, in ATRs, that retires it as truly broken
    pub true_break_atr_multiple: f64,
    pub volume_average_period: usize,
    pub trend_ma_period: usize,
    pub trend_swing_count: usize,
    pub registry_capacity: usize,
}

/// The Master Analysis Configuration
pub struct AnalysisConfig {
    pub strength: StrengthWeights,
    pub defaults: LevelDefaults,
    // Consecutive closes beyond a level (none reverting) before a true break retires it
    pub true_break_confirm_bars: usize,
    // A swing extraction window needs both neighbours of an interior bar
    pub min_bars_for_swings: usize,
    // Bucket width for level identities when no touch zone is known
    pub fallback_bucket_width: f64,
}

pub const ANALYSIS: AnalysisConfig = AnalysisConfig {
    strength: StrengthWeights {
        touch: 0.5,
        recency: 0.3,
        volume: 0.2,
        touch_saturation: 2.0,
    },

    defaults: LevelDefaults {
        min_strength: 0.55,
        min_touches: 2,
        volume_confirmation_ratio: 1.5,
        retest_required: false,
        retest_timeout_bars: 5,
        atr_period: 14,
        breakout_atr_multiple: 0.5,
        true_break_atr_multiple: 1.5,
        volume_average_period: 20,
        trend_ma_period: 20,
        trend_swing_count: 3,
        registry_capacity: 100,
    },

    true_break_confirm_bars: 3,
    min_bars_for_swings: 3,
    fallback_bucket_width: 0.0001,
};
