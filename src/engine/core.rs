use std::collections::BTreeMap;
use std::sync::mpsc::{Receiver, Sender, channel};

use anyhow::{Result, bail};

use crate::analysis::breakout::{BreakoutInputs, BreakoutParams, BreakoutState, BreakoutValidator};
use crate::analysis::level_registry::{LevelRegistry, RegistryCycle};
use crate::analysis::level_scoring::{ScoringParams, score_levels};
use crate::analysis::report::{Report, ReportAggregator, SkipReason, TimeframeLevelSnapshot};
use crate::analysis::swing_points::SwingExtractor;
use crate::analysis::trend::{TrendAnalyzer, TrendParams};
use crate::config::{ANALYSIS, LevelConfig};
use crate::data::BarProvider;
use crate::domain::{KeyLevel, LevelId, ScoringContext, Timeframe};
use crate::utils::maths_utils::{average_true_range, mean};

use super::messages::{CycleOutcome, EngineEvent};
use super::state::{LevelChange, StrategyState};

/// Key level detection and breakout validation for one symbol.
///
/// Owns the registry, trend cache, breakout states and latest report. Drive
/// it with [`LevelEngine::on_new_bar`] once per new bar; calls must not
/// overlap.
pub struct LevelEngine {
    symbol: String,
    config: LevelConfig,

    registry: LevelRegistry,
    trend: TrendAnalyzer,
    validator: BreakoutValidator,
    strategy: BTreeMap<Timeframe, StrategyState>,
    reports: ReportAggregator,

    /// Event fan-out. Senders whose receiver is gone are dropped on send.
    subscribers: Vec<Sender<EngineEvent>>,

    /// Set for the duration of a cycle. Still set afterwards only if a cycle
    /// unwound part way, which leaves the engine refusing further cycles.
    busy: bool,
}

impl LevelEngine {
    pub fn new(symbol: &str, config: LevelConfig) -> Result<Self> {
        let config = config.sanitized();
        let registry = LevelRegistry::new(config.registry_capacity, &config.monitored_timeframes)?;

        log::info!(
            "{}: level engine ready (timeframes {:?}, min strength {}, retest {})",
            symbol,
            config.monitored_timeframes,
            config.min_strength,
            config.retest_required
        );

        Ok(Self {
            symbol: symbol.to_string(),
            config,
            registry,
            trend: TrendAnalyzer::new(),
            validator: BreakoutValidator::new(),
            strategy: BTreeMap::new(),
            reports: ReportAggregator::default(),
            subscribers: Vec::new(),
            busy: false,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn config(&self) -> &LevelConfig {
        &self.config
    }

    /// A new receiver for every event emitted from now on.
    pub fn subscribe(&mut self) -> Receiver<EngineEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    /// Run one full update cycle over every monitored timeframe (or just
    /// `current_timeframe` when none are configured).
    pub fn on_new_bar(&mut self, provider: &dyn BarProvider, current_timeframe: Timeframe) -> Result<CycleOutcome> {
        if provider.symbol() != self.symbol {
            bail!(
                "Engine for {} was handed bars for {}",
                self.symbol,
                provider.symbol()
            );
        }
        if self.busy {
            bail!(
                "{}: update cycle entered while a previous cycle never completed",
                self.symbol
            );
        }

        self.busy = true;
        let outcome = self.run_cycle(provider, current_timeframe);
        self.busy = false;

        self.broadcast(&outcome.events);
        Ok(outcome)
    }

    pub fn latest_report(&self) -> Option<&Report> {
        self.reports.latest()
    }

    pub fn strongest(&self, timeframe: Timeframe) -> Result<KeyLevel> {
        self.registry.strongest(timeframe)
    }

    pub fn levels(&self, timeframe: Timeframe) -> Vec<KeyLevel> {
        self.registry.levels(timeframe)
    }

    pub fn strategy_state(&self, timeframe: Timeframe) -> Option<&StrategyState> {
        self.strategy.get(&timeframe)
    }

    pub fn breakout_state(&self, id: LevelId) -> Option<&BreakoutState> {
        self.validator.state(id)
    }

    // --- INTERNAL LOGIC ---

    fn run_cycle(&mut self, provider: &dyn BarProvider, current_timeframe: Timeframe) -> CycleOutcome {
        let timeframes = self.config.timeframes_or(current_timeframe);
        let mut events = Vec::new();
        let mut snapshots = Vec::with_capacity(timeframes.len());

        for timeframe in timeframes {
            snapshots.push(self.update_timeframe(provider, timeframe, &mut events));
        }

        let timestamp_ms = provider
            .bar(current_timeframe, 0)
            .map(|b| b.timestamp_ms)
            .or_else(|| snapshots.iter().map(|s| s.last_update_ms).max())
            .unwrap_or_default();
        let report = self.reports.publish(&self.symbol, timestamp_ms, snapshots);

        CycleOutcome { report, events }
    }

    fn update_timeframe(
        &mut self,
        provider: &dyn BarProvider,
        timeframe: Timeframe,
        events: &mut Vec<EngineEvent>,
    ) -> TimeframeLevelSnapshot {
        let last_known_ms = self.strategy.get(&timeframe).map_or(0, |s| s.last_update_ms);

        // 1. Preconditions
        if !provider.is_synchronized(timeframe) {
            log::warn!(
                "{} {}: series not synchronized, skipping this cycle",
                self.symbol,
                timeframe
            );
            return TimeframeLevelSnapshot::skipped(timeframe, last_known_ms, SkipReason::NotSynchronized);
        }

        let lookback = self.config.lookback_for(timeframe);
        let touch_zone = self.config.touch_zone_for(timeframe);
        let breakout_params = self.breakout_params(timeframe);
        let min_bars = breakout_params.bars_needed().max(ANALYSIS.min_bars_for_swings);

        if provider.bar_count(timeframe) < min_bars {
            log::debug!(
                "{} {}: {} bars, need {}",
                self.symbol,
                timeframe,
                provider.bar_count(timeframe),
                min_bars
            );
            return TimeframeLevelSnapshot::skipped(timeframe, last_known_ms, SkipReason::InsufficientBars);
        }

        let bars = provider.recent_bars(timeframe, (lookback + 1).max(min_bars));
        let Some(latest) = bars.first().copied() else {
            return TimeframeLevelSnapshot::skipped(timeframe, last_known_ms, SkipReason::InsufficientBars);
        };
        let now_ms = latest.timestamp_ms;

        // 2. Swings -> scored candidates
        let window = &bars[..bars.len().min(lookback + 1)];
        let volumes: Vec<f64> = window.iter().map(|b| b.volume).collect();
        let scoring = ScoringParams {
            touch_zone,
            min_touches: self.config.min_touches,
            min_strength: self.config.min_strength,
            ctx: ScoringContext {
                now_ms,
                interval_ms: timeframe.interval_ms(),
                lookback,
                volume_confirmation_ratio: self.config.volume_confirmation_ratio,
            },
            window_mean_volume: mean(&volumes).unwrap_or(0.0),
            reference_close: latest.close_price,
        };
        let scored = score_levels(SwingExtractor::new(window, lookback), &scoring);

        // 3. Registry
        let closes: Vec<f64> = bars
            .iter()
            .take(ANALYSIS.true_break_confirm_bars)
            .map(|b| b.close_price)
            .collect();
        let evicted = self.registry.update(
            timeframe,
            scored.candidates,
            &RegistryCycle {
                scoring: &scoring,
                staleness_bars: self.config.staleness_bars_for(timeframe),
                recent_closes: &closes,
                atr: average_true_range(&bars, self.config.atr_period).unwrap_or(0.0),
                true_break_atr_multiple: self.config.true_break_atr_multiple,
            },
        );
        if !evicted.is_empty() {
            log::debug!("{} {}: {} levels evicted", self.symbol, timeframe, evicted.len());
        }

        // 4. Trend
        let trend_timeframe = self.config.trend_timeframe_for(timeframe);
        let trend_params = TrendParams {
            ma_period: self.config.trend_ma_period,
            swing_count: self.config.trend_swing_count,
            window: self.config.lookback_for(trend_timeframe),
        };
        let bias = self.trend.bias(provider, trend_timeframe, &trend_params);

        // 5. Active level
        let state = self.strategy.entry(timeframe).or_default();
        match state.update(self.registry.strongest(timeframe).ok(), touch_zone, now_ms) {
            LevelChange::Unchanged => {}
            LevelChange::Found(level) => events.push(EngineEvent::LevelFound { timeframe, level }),
            LevelChange::Replaced { previous, current } => {
                events.push(EngineEvent::LevelLost {
                    timeframe,
                    level: previous,
                });
                events.push(EngineEvent::LevelFound {
                    timeframe,
                    level: current,
                });
            }
            LevelChange::Lost(level) => events.push(EngineEvent::LevelLost { timeframe, level }),
        }
        let active = state.active_key_level.clone();

        // 6. Breakouts
        let spread = provider
            .bid_ask()
            .map(|(bid, ask)| ask - bid)
            .filter(|s| s.is_finite() && *s >= 0.0);
        let inputs = BreakoutInputs::from_bars(&bars, bias, spread, &breakout_params);
        let active_id = active.as_ref().map(|l| l.id(timeframe, touch_zone));

        let mut breakouts = self
            .validator
            .advance_pending(timeframe, active_id, &inputs, &breakout_params);
        if let (Some(level), Some(id)) = (&active, active_id) {
            breakouts.extend(self.validator.evaluate(id, level, &inputs, &breakout_params));
        }
        self.validator.prune(timeframe, active_id, now_ms);

        for event in breakouts {
            log::info!("{} {}", self.symbol, event);
            events.push(EngineEvent::Breakout(event));
        }

        // 7. Snapshot
        TimeframeLevelSnapshot::collect(timeframe, &self.registry, &self.validator, touch_zone, bias, now_ms)
    }

    fn breakout_params(&self, timeframe: Timeframe) -> BreakoutParams {
        BreakoutParams {
            atr_period: self.config.atr_period,
            breakout_atr_multiple: self.config.breakout_atr_multiple,
            volume_average_period: self.config.volume_average_period,
            volume_confirmation_ratio: self.config.volume_confirmation_ratio,
            retest_required: self.config.retest_required,
            retest_timeout_bars: self.config.retest_timeout_bars,
            touch_zone: self.config.touch_zone_for(timeframe),
        }
    }

    fn broadcast(&mut self, events: &[EngineEvent]) {
        if events.is_empty() {
            return;
        }
        self.subscribers
            .retain(|tx| events.iter().all(|event| tx.send(event.clone()).is_ok()));
    }
}
