use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ANALYSIS;
use crate::domain::Timeframe;
use crate::utils::time_utils::{bars_between, epoch_ms_to_utc};

/// Everything the strength score depends on besides the level itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringContext {
    /// Evaluation time (the latest bar's timestamp, never wall-clock).
    pub now_ms: i64,
    pub interval_ms: i64,
    /// Recency horizon in bars. A touch this old contributes no recency.
    pub lookback: usize,
    pub volume_confirmation_ratio: f64,
}

/// A support or resistance price inferred from clustered swing touches.
///
/// `strength` has no setter: it is recomputed from touch count, recency and
/// volume confirmation by [`KeyLevel::rescore`] whenever those change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyLevel {
    pub price: f64,
    pub is_resistance: bool,
    pub touch_count: usize,
    pub first_touch_ms: i64,
    pub last_touch_ms: i64,
    strength: f64,
    pub volume_confirmed: bool,
    pub volume_ratio: f64,
}

impl KeyLevel {
    pub fn new(
        price: f64,
        is_resistance: bool,
        touch_count: usize,
        (first_touch_ms, last_touch_ms): (i64, i64),
        volume_ratio: f64,
        ctx: &ScoringContext,
    ) -> Self {
        let volume_ratio = if volume_ratio.is_finite() { volume_ratio.max(0.0) } else { 0.0 };
        let mut level = Self {
            price,
            is_resistance,
            touch_count,
            first_touch_ms,
            last_touch_ms,
            strength: 0.0,
            volume_confirmed: volume_ratio >= ctx.volume_confirmation_ratio,
            volume_ratio,
        };
        level.rescore(ctx);
        level
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    /// Recompute strength from the current fields.
    pub fn rescore(&mut self, ctx: &ScoringContext) {
        self.strength = strength_score(self.touch_count, self.last_touch_ms, self.volume_confirmed, ctx);
    }

    pub fn distance_to(&self, price: f64) -> f64 {
        (self.price - price).abs()
    }

    pub fn id(&self, timeframe: Timeframe, touch_zone: f64) -> LevelId {
        LevelId::new(timeframe, self.price, touch_zone)
    }

    pub fn kind_label(&self) -> &'static str {
        if self.is_resistance { "resistance" } else { "support" }
    }
}

impl fmt::Display for KeyLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {:.5} (touches {}, strength {:.3}{}, last touch {})",
            self.kind_label(),
            self.price,
            self.touch_count,
            self.strength,
            if self.volume_confirmed { ", vol ✓" } else { "" },
            epoch_ms_to_utc(self.last_touch_ms),
        )
    }
}

/// Weighted touch/recency/volume score in [0, 1].
///
/// Each term is non-decreasing in its input, so more touches, a later last
/// touch or gaining volume confirmation can never lower the score.
pub fn strength_score(
    touch_count: usize,
    last_touch_ms: i64,
    volume_confirmed: bool,
    ctx: &ScoringContext,
) -> f64 {
    let w = &ANALYSIS.strength;

    let touch = 1.0 - (-(touch_count as f64) / w.touch_saturation).exp();

    let recency = if ctx.lookback == 0 {
        0.0
    } else {
        let age = bars_between(last_touch_ms, ctx.now_ms, ctx.interval_ms);
        (1.0 - age / ctx.lookback as f64).clamp(0.0, 1.0)
    };

    let volume = if volume_confirmed { 1.0 } else { 0.0 };

    (w.touch * touch + w.recency * recency + w.volume * volume).clamp(0.0, 1.0)
}

/// Stable identity of a level: its timeframe plus the touch-zone bucket its
/// price falls in. Keys breakout state independently of where the registry
/// keeps the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LevelId {
    pub timeframe: Timeframe,
    pub bucket: i64,
}

impl LevelId {
    pub fn new(timeframe: Timeframe, price: f64, touch_zone: f64) -> Self {
        let width = if touch_zone > 0.0 { touch_zone } else { ANALYSIS.fallback_bucket_width };
        Self {
            timeframe,
            bucket: (price / width).round() as i64,
        }
    }
}

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.timeframe, self.bucket)
    }
}
