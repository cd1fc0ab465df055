//! Per-timeframe default table.
//!
//! Touch zones are absolute price distances sized for 5-digit FX quotes
//! (1 pip = 0.0001). Instruments on a different scale should override
//! `touch_zone` in `LevelConfig`.

use crate::domain::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeframeDefaults {
    pub timeframe: Timeframe,
    /// Bars scanned for swing points, also the recency horizon of the score.
    pub lookback: usize,
    pub touch_zone: f64,
    /// Bars without a touch after which a registered level is retired.
    pub staleness_bars: usize,
}

pub const TIMEFRAME_DEFAULTS: [TimeframeDefaults; 9] = [
    TimeframeDefaults { timeframe: Timeframe::M1, lookback: 240, touch_zone: 0.0002, staleness_bars: 720 },
    TimeframeDefaults { timeframe: Timeframe::M5, lookback: 200, touch_zone: 0.0003, staleness_bars: 600 },
    TimeframeDefaults { timeframe: Timeframe::M15, lookback: 160, touch_zone: 0.0004, staleness_bars: 480 },
    TimeframeDefaults { timeframe: Timeframe::M30, lookback: 120, touch_zone: 0.0005, staleness_bars: 360 },
    TimeframeDefaults { timeframe: Timeframe::H1, lookback: 100, touch_zone: 0.0005, staleness_bars: 300 },
    TimeframeDefaults { timeframe: Timeframe::H4, lookback: 80, touch_zone: 0.0010, staleness_bars: 240 },
    TimeframeDefaults { timeframe: Timeframe::D1, lookback: 60, touch_zone: 0.0020, staleness_bars: 180 },
    TimeframeDefaults { timeframe: Timeframe::W1, lookback: 52, touch_zone: 0.0040, staleness_bars: 104 },
    TimeframeDefaults { timeframe: Timeframe::MN1, lookback: 36, touch_zone: 0.0080, staleness_bars: 72 },
];

pub fn timeframe_defaults(timeframe: Timeframe) -> &'static TimeframeDefaults {
    // Table is ordered like the enum
    &TIMEFRAME_DEFAULTS[timeframe as usize]
}
