//! Runtime configuration of the level engine.
//!
//! Loaded from JSON or built in code, then passed through
//! [`LevelConfig::sanitized`] before use. Out-of-range values fall back to
//! their documented defaults with a warning instead of failing.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::ANALYSIS;
use crate::config::timeframes::timeframe_defaults;
use crate::domain::Timeframe;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Bars scanned for swing points. 0 = per-timeframe default.
    pub lookback_period: usize,
    /// Minimum strength in (0, 1] for a level to be accepted.
    pub min_strength: f64,
    /// Price tolerance for clustering touches. 0 = per-timeframe default.
    pub touch_zone: f64,
    pub min_touches: usize,
    /// Volume over average volume needed for confirmation (>= 1).
    pub volume_confirmation_ratio: f64,
    pub retest_required: bool,
    pub retest_timeout_bars: usize,
    /// Timeframes analysed each cycle. Empty = the caller's timeframe only.
    pub monitored_timeframes: Vec<Timeframe>,

    pub atr_period: usize,
    pub breakout_atr_multiple: f64,
    pub true_break_atr_multiple: f64,
    pub volume_average_period: usize,
    pub trend_ma_period: usize,
    pub trend_swing_count: usize,
    /// Fixed trend-gating timeframe. `None` = one tier above each analysed timeframe.
    pub trend_timeframe: Option<Timeframe>,
    pub registry_capacity: usize,
}

impl Default for LevelConfig {
    fn default() -> Self {
        let d = &ANALYSIS.defaults;
        Self {
            lookback_period: 0,
            min_strength: d.min_strength,
            touch_zone: 0.0,
            min_touches: d.min_touches,
            volume_confirmation_ratio: d.volume_confirmation_ratio,
            retest_required: d.retest_required,
            retest_timeout_bars: d.retest_timeout_bars,
            monitored_timeframes: Vec::new(),
            atr_period: d.atr_period,
            breakout_atr_multiple: d.breakout_atr_multiple,
            true_break_atr_multiple: d.true_break_atr_multiple,
            volume_average_period: d.volume_average_period,
            trend_ma_period: d.trend_ma_period,
            trend_swing_count: d.trend_swing_count,
            trend_timeframe: None,
            registry_capacity: d.registry_capacity,
        }
    }
}

impl LevelConfig {
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: LevelConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config.sanitized())
    }

    /// Clamp invalid values to their defaults, warning once per offending field.
    pub fn sanitized(mut self) -> Self {
        let d = &ANALYSIS.defaults;

        if !(self.min_strength > 0.0 && self.min_strength <= 1.0) {
            log::warn!(
                "min_strength {} outside (0, 1], using default {}",
                self.min_strength,
                d.min_strength
            );
            self.min_strength = d.min_strength;
        }
        if self.min_touches < 1 {
            log::warn!("min_touches must be >= 1, using default {}", d.min_touches);
            self.min_touches = d.min_touches;
        }
        if !(self.volume_confirmation_ratio >= 1.0 && self.volume_confirmation_ratio.is_finite()) {
            log::warn!(
                "volume_confirmation_ratio {} below 1.0, using default {}",
                self.volume_confirmation_ratio,
                d.volume_confirmation_ratio
            );
            self.volume_confirmation_ratio = d.volume_confirmation_ratio;
        }
        if !(self.touch_zone >= 0.0 && self.touch_zone.is_finite()) {
            log::warn!("touch_zone {} invalid, using per-timeframe default", self.touch_zone);
            self.touch_zone = 0.0;
        }

        clamp_count(&mut self.retest_timeout_bars, d.retest_timeout_bars, "retest_timeout_bars");
        clamp_count(&mut self.atr_period, d.atr_period, "atr_period");
        clamp_count(&mut self.volume_average_period, d.volume_average_period, "volume_average_period");
        clamp_count(&mut self.trend_ma_period, d.trend_ma_period, "trend_ma_period");
        clamp_count(&mut self.registry_capacity, d.registry_capacity, "registry_capacity");
        // A monotonic sequence needs at least two swings
        if self.trend_swing_count < 2 {
            log::warn!(
                "trend_swing_count {} too small, using default {}",
                self.trend_swing_count,
                d.trend_swing_count
            );
            self.trend_swing_count = d.trend_swing_count;
        }

        clamp_multiple(&mut self.breakout_atr_multiple, d.breakout_atr_multiple, "breakout_atr_multiple");
        clamp_multiple(
            &mut self.true_break_atr_multiple,
            d.true_break_atr_multiple,
            "true_break_atr_multiple",
        );

        let mut seen = Vec::with_capacity(self.monitored_timeframes.len());
        self.monitored_timeframes.retain(|tf| {
            if seen.contains(tf) {
                log::warn!("monitored timeframe {} listed twice, ignoring duplicate", tf);
                false
            } else {
                seen.push(*tf);
                true
            }
        });

        self
    }

    /// Timeframes to analyse this cycle, falling back to the caller's.
    pub fn timeframes_or(&self, current: Timeframe) -> Vec<Timeframe> {
        if self.monitored_timeframes.is_empty() {
            vec![current]
        } else {
            self.monitored_timeframes.clone()
        }
    }

    pub fn lookback_for(&self, timeframe: Timeframe) -> usize {
        if self.lookback_period > 0 {
            self.lookback_period
        } else {
            timeframe_defaults(timeframe).lookback
        }
    }

    pub fn touch_zone_for(&self, timeframe: Timeframe) -> f64 {
        if self.touch_zone > 0.0 {
            self.touch_zone
        } else {
            timeframe_defaults(timeframe).touch_zone
        }
    }

    pub fn staleness_bars_for(&self, timeframe: Timeframe) -> usize {
        // Never retire a level sooner than it can age out of the lookback window
        timeframe_defaults(timeframe)
            .staleness_bars
            .max(self.lookback_for(timeframe))
    }

    pub fn trend_timeframe_for(&self, timeframe: Timeframe) -> Timeframe {
        self.trend_timeframe.unwrap_or_else(|| timeframe.higher())
    }
}

fn clamp_count(value: &mut usize, default: usize, name: &str) {
    if *value == 0 {
        log::warn!("{} must be > 0, using default {}", name, default);
        *value = default;
    }
}

fn clamp_multiple(value: &mut f64, default: f64, name: &str) {
    if !(value.is_finite() && *value >= 0.0) {
        log::warn!("{} {} invalid, using default {}", name, value, default);
        *value = default;
    }
}
