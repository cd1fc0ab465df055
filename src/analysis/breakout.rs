//! Breakout validation and the retest state machine.
//!
//! Each level identity carries its own state. A crossing of the level is
//! filtered on volatility, distance, spread, volume and trend; survivors are
//! confirmed at once or parked until price retests the level and resumes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::domain::{BreakoutDirection, Candle, KeyLevel, LevelId, Timeframe, TrendBias};
use crate::utils::maths_utils::{average_true_range, average_volume};
use crate::utils::time_utils::bars_between;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum RejectReason {
    NoVolumeSpike,
    InsufficientDistance,
    DegenerateVolatility,
    TrendMisaligned,
    SpreadTooWide,
}

/// A crossing that passed every filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutCandidate {
    pub level: KeyLevel,
    pub direction: BreakoutDirection,
    pub detected_ms: i64,
    pub volume: f64,
    pub volume_ratio: f64,
    /// Close beyond the level, in price units.
    pub distance: f64,
    pub distance_atr: f64,
}

/// Emitted once, on the transition into `Confirmed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutEvent {
    pub level: KeyLevel,
    pub direction: BreakoutDirection,
    pub timestamp_ms: i64,
    pub volume_ratio: f64,
    pub distance: f64,
    pub distance_atr: f64,
    pub trend_bias: TrendBias,
    pub timeframe: Timeframe,
}

impl BreakoutEvent {
    fn from_candidate(candidate: &BreakoutCandidate, timestamp_ms: i64, trend_bias: TrendBias, timeframe: Timeframe) -> Self {
        Self {
            level: candidate.level.clone(),
            direction: candidate.direction,
            timestamp_ms,
            volume_ratio: candidate.volume_ratio,
            distance: candidate.distance,
            distance_atr: candidate.distance_atr,
            trend_bias,
            timeframe,
        }
    }
}

impl fmt::Display for BreakoutEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} breakout of {:.5} on {} ({:.2} ATR, volume x{:.2}, {})",
            self.direction,
            self.level.kind_label(),
            self.level.price,
            self.timeframe,
            self.distance_atr,
            self.volume_ratio,
            self.trend_bias
        )
    }
}

/// Outcome of the latest breakout attempt on one level. Terminal outcomes
/// stay put until a fresh crossing starts a new attempt.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum BreakoutState {
    #[default]
    Idle,
    PendingRetest {
        candidate: BreakoutCandidate,
        bars_waited: usize,
    },
    Confirmed(BreakoutEvent),
    Rejected(RejectReason),
    Expired {
        candidate: BreakoutCandidate,
    },
}

impl BreakoutState {
    pub fn is_pending(&self) -> bool {
        matches!(self, BreakoutState::PendingRetest { .. })
    }

    pub fn label(&self) -> String {
        match self {
            BreakoutState::Idle => "idle".to_string(),
            BreakoutState::PendingRetest { bars_waited, .. } => format!("pending retest ({} bars)", bars_waited),
            BreakoutState::Confirmed(e) => format!("confirmed {}", e.direction),
            BreakoutState::Rejected(reason) => format!("rejected: {}", reason),
            BreakoutState::Expired { .. } => "expired".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakoutParams {
    pub atr_period: usize,
    pub breakout_atr_multiple: f64,
    pub volume_average_period: usize,
    pub volume_confirmation_ratio: f64,
    pub retest_required: bool,
    pub retest_timeout_bars: usize,
    pub touch_zone: f64,
}

impl BreakoutParams {
    /// Bars needed to evaluate ATR and the prior-volume average.
    pub fn bars_needed(&self) -> usize {
        (self.atr_period + 1).max(self.volume_average_period + 1).max(2)
    }
}

/// Market inputs for one bar of one timeframe.
#[derive(Debug, Clone, Copy)]
pub struct BreakoutInputs<'a> {
    /// Most recent first; the first two are the current and previous bar.
    pub bars: &'a [Candle],
    pub atr: f64,
    /// Mean volume of the bars before the current one.
    pub average_volume: Option<f64>,
    pub bias: TrendBias,
    pub spread: Option<f64>,
}

impl<'a> BreakoutInputs<'a> {
    pub fn from_bars(bars: &'a [Candle], bias: TrendBias, spread: Option<f64>, params: &BreakoutParams) -> Self {
        Self {
            bars,
            atr: average_true_range(bars, params.atr_period).unwrap_or(0.0),
            average_volume: average_volume(bars, 1, params.volume_average_period),
            bias,
            spread,
        }
    }

    fn current_and_previous(&self) -> Option<(&Candle, &Candle)> {
        Some((self.bars.first()?, self.bars.get(1)?))
    }
}

#[derive(Debug, Clone, Default)]
struct LevelTrack {
    state: BreakoutState,
    last_bar_ms: Option<i64>,
}

/// Breakout state per level identity.
#[derive(Debug, Clone, Default)]
pub struct BreakoutValidator {
    tracks: BTreeMap<LevelId, LevelTrack>,
}

impl BreakoutValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: LevelId) -> Option<&BreakoutState> {
        self.tracks.get(&id).map(|t| &t.state)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Evaluate the current bar against `level`. A bar already seen for this
    /// level is ignored, so feeding it twice changes nothing.
    pub fn evaluate(
        &mut self,
        id: LevelId,
        level: &KeyLevel,
        inputs: &BreakoutInputs,
        params: &BreakoutParams,
    ) -> Option<BreakoutEvent> {
        let (current, _) = inputs.current_and_previous()?;
        let track = self.tracks.entry(id).or_default();
        if track.last_bar_ms == Some(current.timestamp_ms) {
            return None;
        }
        track.last_bar_ms = Some(current.timestamp_ms);

        let next = match &track.state {
            BreakoutState::PendingRetest { candidate, .. } => step_pending(candidate, id.timeframe, inputs, params),
            settled => detect(level, id.timeframe, inputs, params).unwrap_or_else(|| settled.clone()),
        };
        transition(id, track, next)
    }

    /// Tick pending retests on `timeframe` other than `skip`, which the caller
    /// evaluates itself.
    pub fn advance_pending(
        &mut self,
        timeframe: Timeframe,
        skip: Option<LevelId>,
        inputs: &BreakoutInputs,
        params: &BreakoutParams,
    ) -> Vec<BreakoutEvent> {
        let Some((current, _)) = inputs.current_and_previous() else {
            return Vec::new();
        };
        let mut events = Vec::new();
        for (&id, track) in self.tracks.iter_mut() {
            if id.timeframe != timeframe || Some(id) == skip || track.last_bar_ms == Some(current.timestamp_ms) {
                continue;
            }
            let BreakoutState::PendingRetest { candidate, .. } = &track.state else {
                continue;
            };
            track.last_bar_ms = Some(current.timestamp_ms);
            let next = step_pending(candidate, timeframe, inputs, params);
            events.extend(transition(id, track, next));
        }
        events
    }

    /// Drop settled states on `timeframe` for levels no longer evaluated and
    /// not updated on the current bar. Pending retests survive.
    pub fn prune(&mut self, timeframe: Timeframe, keep: Option<LevelId>, current_bar_ms: i64) {
        self.tracks.retain(|&id, track| {
            id.timeframe != timeframe
                || Some(id) == keep
                || track.state.is_pending()
                || track.last_bar_ms == Some(current_bar_ms)
        });
    }
}

#[cfg_attr(not(debug_assertions), allow(unused_variables))]
fn transition(id: LevelId, track: &mut LevelTrack, next: BreakoutState) -> Option<BreakoutEvent> {
    if next == track.state {
        return None;
    }

    #[cfg(debug_assertions)]
    if crate::config::debug::PRINT_BREAKOUT_TRANSITIONS {
        log::info!("   breakout {}: {} -> {}", id, track.state.label(), next.label());
    }

    track.state = next;
    match &track.state {
        BreakoutState::Confirmed(event) => Some(event.clone()),
        _ => None,
    }
}

/// Look for a fresh crossing of `level` on the current bar and run it through
/// the filters. `None` when price did not cross.
fn detect(
    level: &KeyLevel,
    timeframe: Timeframe,
    inputs: &BreakoutInputs,
    params: &BreakoutParams,
) -> Option<BreakoutState> {
    let (current, previous) = inputs.current_and_previous()?;
    let (prev_close, close) = (previous.close_price, current.close_price);

    let direction = if prev_close <= level.price && close > level.price {
        BreakoutDirection::Long
    } else if prev_close >= level.price && close < level.price {
        BreakoutDirection::Short
    } else {
        return None;
    };

    if !(inputs.atr > 0.0 && inputs.atr.is_finite()) {
        return Some(BreakoutState::Rejected(RejectReason::DegenerateVolatility));
    }
    let distance = (close - level.price) * direction.sign();
    if distance <= params.breakout_atr_multiple * inputs.atr {
        return Some(BreakoutState::Rejected(RejectReason::InsufficientDistance));
    }
    if inputs.spread.is_some_and(|spread| spread >= distance) {
        return Some(BreakoutState::Rejected(RejectReason::SpreadTooWide));
    }
    let volume_ratio = match inputs.average_volume {
        Some(avg) if avg > 0.0 => current.volume / avg,
        _ => return Some(BreakoutState::Rejected(RejectReason::NoVolumeSpike)),
    };
    if volume_ratio <= params.volume_confirmation_ratio {
        return Some(BreakoutState::Rejected(RejectReason::NoVolumeSpike));
    }
    if !direction.aligns_with(inputs.bias) {
        return Some(BreakoutState::Rejected(RejectReason::TrendMisaligned));
    }

    let candidate = BreakoutCandidate {
        level: level.clone(),
        direction,
        detected_ms: current.timestamp_ms,
        volume: current.volume,
        volume_ratio,
        distance,
        distance_atr: distance / inputs.atr,
    };

    Some(if params.retest_required {
        BreakoutState::PendingRetest {
            candidate,
            bars_waited: 0,
        }
    } else {
        BreakoutState::Confirmed(BreakoutEvent::from_candidate(
            &candidate,
            current.timestamp_ms,
            inputs.bias,
            timeframe,
        ))
    })
}

/// Advance a waiting candidate to the current bar. The timeout counts bars
/// elapsed since detection, so cycles skipped in between still count.
fn step_pending(
    candidate: &BreakoutCandidate,
    timeframe: Timeframe,
    inputs: &BreakoutInputs,
    params: &BreakoutParams,
) -> BreakoutState {
    let Some((current, previous)) = inputs.current_and_previous() else {
        return BreakoutState::PendingRetest {
            candidate: candidate.clone(),
            bars_waited: 0,
        };
    };
    let bars_waited = bars_between(candidate.detected_ms, current.timestamp_ms, timeframe.interval_ms()) as usize;
    let timeout = params.retest_timeout_bars;

    if bars_waited <= timeout && is_retest(candidate, current, previous, inputs.bias, params.touch_zone) {
        BreakoutState::Confirmed(BreakoutEvent::from_candidate(
            candidate,
            current.timestamp_ms,
            inputs.bias,
            timeframe,
        ))
    } else if bars_waited >= timeout {
        BreakoutState::Expired {
            candidate: candidate.clone(),
        }
    } else {
        BreakoutState::PendingRetest {
            candidate: candidate.clone(),
            bars_waited,
        }
    }
}

/// The previous bar came back to the level and held it, and the current bar
/// resumed in the breakout direction. The breakout bar itself never counts
/// as its own retest.
fn is_retest(candidate: &BreakoutCandidate, current: &Candle, previous: &Candle, bias: TrendBias, touch_zone: f64) -> bool {
    if previous.timestamp_ms <= candidate.detected_ms || !candidate.direction.aligns_with(bias) {
        return false;
    }
    let price = candidate.level.price;
    match candidate.direction {
        BreakoutDirection::Long => {
            previous.trades_through(price, touch_zone)
                && previous.close_price >= price - touch_zone
                && current.close_price > price
                && current.close_price > previous.close_price
        }
        BreakoutDirection::Short => {
            previous.trades_through(price, touch_zone)
                && previous.close_price <= price + touch_zone
                && current.close_price < price
                && current.close_price < previous.close_price
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScoringContext;
    use crate::utils::TimeUtils;

    const H: i64 = TimeUtils::MS_IN_H;
    const LEVEL: f64 = 1.1050;

    fn params(retest_required: bool) -> BreakoutParams {
        BreakoutParams {
            atr_period: 14,
            breakout_atr_multiple: 0.5,
            volume_average_period: 20,
            volume_confirmation_ratio: 1.5,
            retest_required,
            retest_timeout_bars: 5,
            touch_zone: 0.0005,
        }
    }

    fn level() -> KeyLevel {
        let ctx = ScoringContext {
            now_ms: 25 * H,
            interval_ms: H,
            lookback: 100,
            volume_confirmation_ratio: 1.5,
        };
        KeyLevel::new(LEVEL, true, 3, (5 * H, 20 * H), 1.0, &ctx)
    }

    fn id() -> LevelId {
        level().id(Timeframe::H1, 0.0005)
    }

    /// Oldest-first tape: 25 quiet bars under the level.
    struct Tape {
        bars: Vec<Candle>,
    }

    impl Tape {
        fn quiet() -> Self {
            let bars = (0..25)
                .map(|i| Candle::new(i * H, 1.1045, 1.1048, 1.1042, 1.1045, 100.0))
                .collect();
            Self { bars }
        }

        fn push(&mut self, open: f64, high: f64, low: f64, close: f64, volume: f64) {
            let ts = self.bars.len() as i64 * H;
            self.bars.push(Candle::new(ts, open, high, low, close, volume));
        }

        fn breakout(&mut self, volume: f64) {
            self.push(1.1045, 1.1062, 1.1044, 1.1060, volume);
        }

        fn newest_first(&self) -> Vec<Candle> {
            self.bars.iter().rev().copied().collect()
        }
    }

    fn step(
        validator: &mut BreakoutValidator,
        tape: &Tape,
        bias: TrendBias,
        p: &BreakoutParams,
    ) -> Option<BreakoutEvent> {
        let bars = tape.newest_first();
        let inputs = BreakoutInputs::from_bars(&bars, bias, None, p);
        validator.evaluate(id(), &level(), &inputs, p)
    }

    #[test]
    fn volume_breakout_with_trend_confirms_long() {
        let p = params(false);
        let mut tape = Tape::quiet();
        let mut validator = BreakoutValidator::new();
        assert!(step(&mut validator, &tape, TrendBias::Bullish, &p).is_none());

        tape.breakout(300.0);
        let event = step(&mut validator, &tape, TrendBias::Bullish, &p).unwrap();
        assert_eq!(event.direction, BreakoutDirection::Long);
        assert_eq!(event.timestamp_ms, 25 * H);
        assert_eq!(event.trend_bias, TrendBias::Bullish);
        assert_eq!(event.timeframe, Timeframe::H1);
        assert!((event.distance - 0.0010).abs() < 1e-9);
        assert!((event.volume_ratio - 3.0).abs() < 1e-9);
        assert!(event.distance_atr > 0.5);
        assert!(matches!(validator.state(id()), Some(BreakoutState::Confirmed(_))));

        // Same bar again: no second event
        assert!(step(&mut validator, &tape, TrendBias::Bullish, &p).is_none());
    }

    #[test]
    fn neutral_bias_never_confirms() {
        for retest in [false, true] {
            let p = params(retest);
            let mut tape = Tape::quiet();
            tape.breakout(300.0);
            let mut validator = BreakoutValidator::new();
            assert!(step(&mut validator, &tape, TrendBias::Neutral, &p).is_none());
            assert_eq!(
                validator.state(id()),
                Some(&BreakoutState::Rejected(RejectReason::TrendMisaligned))
            );
        }
    }

    #[test]
    fn quiet_breakout_is_rejected() {
        let p = params(false);
        let mut tape = Tape::quiet();
        tape.breakout(120.0);
        let mut validator = BreakoutValidator::new();
        assert!(step(&mut validator, &tape, TrendBias::Bullish, &p).is_none());
        assert_eq!(
            validator.state(id()),
            Some(&BreakoutState::Rejected(RejectReason::NoVolumeSpike))
        );
    }

    #[test]
    fn filters_fail_closed() {
        let p = params(false);
        let mut tape = Tape::quiet();
        tape.breakout(300.0);
        let bars = tape.newest_first();

        let cases = [
            (0.0, None, RejectReason::DegenerateVolatility),
            (0.01, None, RejectReason::InsufficientDistance),
            (0.0005, Some(0.002), RejectReason::SpreadTooWide),
        ];
        for (atr, spread, reason) in cases {
            let inputs = BreakoutInputs {
                bars: &bars,
                atr,
                average_volume: Some(100.0),
                bias: TrendBias::Bullish,
                spread,
            };
            let mut validator = BreakoutValidator::new();
            assert!(validator.evaluate(id(), &level(), &inputs, &p).is_none());
            assert_eq!(validator.state(id()), Some(&BreakoutState::Rejected(reason)));
        }
    }

    #[test]
    fn short_breakout_needs_bearish_bias() {
        let p = params(false);
        let mut tape = Tape {
            bars: (0..25)
                .map(|i| Candle::new(i * H, 1.1055, 1.1058, 1.1052, 1.1055, 100.0))
                .collect(),
        };
        tape.push(1.1055, 1.1056, 1.1038, 1.1040, 300.0);
        let mut validator = BreakoutValidator::new();
        let event = step(&mut validator, &tape, TrendBias::Bearish, &p).unwrap();
        assert_eq!(event.direction, BreakoutDirection::Short);
    }

    #[test]
    fn retest_then_resumption_confirms() {
        let p = params(true);
        let mut tape = Tape::quiet();
        let mut validator = BreakoutValidator::new();

        tape.breakout(300.0);
        assert!(step(&mut validator, &tape, TrendBias::Bullish, &p).is_none());
        assert!(validator.state(id()).unwrap().is_pending());

        // Follow-through away from the level
        tape.push(1.1060, 1.1072, 1.1058, 1.1070, 100.0);
        assert!(step(&mut validator, &tape, TrendBias::Bullish, &p).is_none());
        // Pullback into the level that holds
        tape.push(1.1070, 1.1071, 1.1052, 1.1055, 100.0);
        assert!(step(&mut validator, &tape, TrendBias::Bullish, &p).is_none());
        // Resumption
        tape.push(1.1055, 1.1068, 1.1054, 1.1065, 100.0);
        let event = step(&mut validator, &tape, TrendBias::Bullish, &p).unwrap();
        assert_eq!(event.direction, BreakoutDirection::Long);
        assert_eq!(event.timestamp_ms, 28 * H);
    }

    #[test]
    fn retest_timeout_expires_for_good() {
        let p = params(true);
        let mut tape = Tape::quiet();
        let mut validator = BreakoutValidator::new();
        tape.breakout(300.0);
        assert!(step(&mut validator, &tape, TrendBias::Bullish, &p).is_none());

        // Price runs away and never comes back
        for i in 1..=8 {
            let close = 1.1060 + i as f64 * 0.0010;
            tape.push(close - 0.0010, close + 0.0002, close - 0.0011, close, 100.0);
            assert!(step(&mut validator, &tape, TrendBias::Bullish, &p).is_none());
            if i < 5 {
                assert!(validator.state(id()).unwrap().is_pending());
            } else {
                assert!(matches!(validator.state(id()), Some(BreakoutState::Expired { .. })));
            }
        }
    }

    #[test]
    fn timeout_counts_bars_not_evaluations() {
        let p = params(true);
        let mut tape = Tape::quiet();
        let mut validator = BreakoutValidator::new();
        tape.breakout(300.0);
        assert!(step(&mut validator, &tape, TrendBias::Bullish, &p).is_none());

        // Eight bars go by unevaluated; the last two are a late retest
        for _ in 0..6 {
            tape.push(1.1060, 1.1072, 1.1058, 1.1070, 100.0);
        }
        tape.push(1.1070, 1.1071, 1.1052, 1.1055, 100.0);
        tape.push(1.1055, 1.1068, 1.1054, 1.1065, 100.0);

        assert!(step(&mut validator, &tape, TrendBias::Bullish, &p).is_none());
        assert!(matches!(validator.state(id()), Some(BreakoutState::Expired { .. })));
    }

    #[test]
    fn pending_retests_advance_and_survive_pruning() {
        let p = params(true);
        let mut tape = Tape::quiet();
        let mut validator = BreakoutValidator::new();
        tape.breakout(300.0);
        step(&mut validator, &tape, TrendBias::Bullish, &p);

        let other = LevelId::new(Timeframe::H1, 1.2000, 0.0005);
        validator.tracks.insert(other, LevelTrack::default());
        validator.prune(Timeframe::H1, None, 25 * H);
        assert!(validator.state(id()).is_some());
        assert!(validator.state(other).is_none());

        for _ in 0..5 {
            let close = tape.bars.last().unwrap().close_price + 0.0010;
            tape.push(close - 0.0010, close + 0.0002, close - 0.0011, close, 100.0);
            let bars = tape.newest_first();
            let inputs = BreakoutInputs::from_bars(&bars, TrendBias::Bullish, None, &p);
            assert!(validator.advance_pending(Timeframe::H1, None, &inputs, &p).is_empty());
        }
        assert!(matches!(validator.state(id()), Some(BreakoutState::Expired { .. })));
        // Kept on the bar it expired, dropped after
        validator.prune(Timeframe::H1, None, tape.bars.last().unwrap().timestamp_ms);
        assert!(validator.state(id()).is_some());
        validator.prune(Timeframe::H1, None, i64::MAX);
        assert!(validator.is_empty());
    }
}
