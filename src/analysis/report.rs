use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::analysis::breakout::{BreakoutState, BreakoutValidator};
use crate::analysis::level_registry::LevelRegistry;
use crate::domain::{KeyLevel, Timeframe, TrendBias};
use crate::utils::time_utils::epoch_ms_to_utc;

/// Why a timeframe produced no valid snapshot this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum SkipReason {
    NotSynchronized,
    InsufficientBars,
    NoValidLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeLevelSnapshot {
    pub timeframe: Timeframe,
    pub strongest_level: Option<KeyLevel>,
    pub last_update_ms: i64,
    pub is_valid: bool,
    pub trend_bias: TrendBias,
    pub breakout: BreakoutState,
    pub levels_tracked: usize,
    pub skip_reason: Option<SkipReason>,
}

impl TimeframeLevelSnapshot {
    /// Snapshot of a timeframe that ran this cycle.
    pub fn collect(
        timeframe: Timeframe,
        registry: &LevelRegistry,
        validator: &BreakoutValidator,
        touch_zone: f64,
        trend_bias: TrendBias,
        last_update_ms: i64,
    ) -> Self {
        match registry.strongest(timeframe) {
            Ok(level) => {
                let breakout = validator
                    .state(level.id(timeframe, touch_zone))
                    .cloned()
                    .unwrap_or_default();
                Self {
                    timeframe,
                    strongest_level: Some(level),
                    last_update_ms,
                    is_valid: true,
                    trend_bias,
                    breakout,
                    levels_tracked: registry.len(timeframe),
                    skip_reason: None,
                }
            }
            Err(_) => Self {
                trend_bias,
                ..Self::skipped(timeframe, last_update_ms, SkipReason::NoValidLevel)
            },
        }
    }

    pub fn skipped(timeframe: Timeframe, last_update_ms: i64, reason: SkipReason) -> Self {
        Self {
            timeframe,
            strongest_level: None,
            last_update_ms,
            is_valid: false,
            trend_bias: TrendBias::Neutral,
            breakout: BreakoutState::Idle,
            levels_tracked: 0,
            skip_reason: Some(reason),
        }
    }
}

/// Read-only result of one update cycle for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub symbol: String,
    pub timestamp_ms: i64,
    pub snapshots: Vec<TimeframeLevelSnapshot>,
    /// True when at least one timeframe produced a valid snapshot.
    pub is_valid: bool,
}

impl Report {
    pub fn new(symbol: &str, timestamp_ms: i64, snapshots: Vec<TimeframeLevelSnapshot>) -> Self {
        Self {
            symbol: symbol.to_string(),
            timestamp_ms,
            is_valid: snapshots.iter().any(|s| s.is_valid),
            snapshots,
        }
    }

    pub fn snapshot(&self, timeframe: Timeframe) -> Option<&TimeframeLevelSnapshot> {
        self.snapshots.iter().find(|s| s.timeframe == timeframe)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).with_context(|| format!("Failed to serialize report for {}", self.symbol))
    }

    /// One line per report, e.g. `EURUSD @ 2024-01-05 12:00 | H1 resistance 1.10500 s=0.71 [idle] | H4 -`
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .snapshots
            .iter()
            .map(|s| match (&s.strongest_level, s.skip_reason) {
                (Some(level), _) => format!(
                    "{} {} {:.5} s={:.2} {} [{}]",
                    s.timeframe,
                    level.kind_label(),
                    level.price,
                    level.strength(),
                    s.trend_bias,
                    s.breakout.label()
                ),
                (None, Some(reason)) => format!("{} - ({})", s.timeframe, reason),
                (None, None) => format!("{} -", s.timeframe),
            })
            .collect();
        format!(
            "{} @ {} | {}",
            self.symbol,
            epoch_ms_to_utc(self.timestamp_ms),
            if parts.is_empty() { "no timeframes".to_string() } else { parts.join(" | ") }
        )
    }
}

/// Holds the latest report between cycles.
#[derive(Debug, Clone, Default)]
pub struct ReportAggregator {
    latest: Option<Report>,
}

impl ReportAggregator {
    pub fn publish(&mut self, symbol: &str, timestamp_ms: i64, snapshots: Vec<TimeframeLevelSnapshot>) -> Report {
        let report = Report::new(symbol, timestamp_ms, snapshots);
        self.latest = Some(report.clone());
        report
    }

    pub fn latest(&self) -> Option<&Report> {
        self.latest.as_ref()
    }
}
