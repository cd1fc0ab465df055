//! Bounded per-timeframe store of accepted key levels.
//!
//! The registry is the only place a [`KeyLevel`] changes after scoring. Each
//! entry remembers its individual touches keyed by bar timestamp, so feeding
//! the same swing twice never inflates a level's touch count.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result, anyhow};
use strum_macros::Display;

use crate::analysis::level_scoring::{LevelCandidate, ScoringParams, compare_strength, volume_ratio};
use crate::config::ANALYSIS;
use crate::domain::{KeyLevel, ScoringContext, Timeframe};
use crate::utils::maths_utils::mean;
use crate::utils::time_utils::bars_between;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Touch {
    price: f64,
    volume: f64,
}

#[derive(Debug, Clone)]
struct RegistryEntry {
    level: KeyLevel,
    touches: BTreeMap<i64, Touch>,
}

impl RegistryEntry {
    fn from_candidate(candidate: LevelCandidate) -> Self {
        let touches = candidate
            .touches
            .iter()
            .map(|p| (p.timestamp_ms, Touch { price: p.price, volume: p.volume }))
            .collect();
        Self {
            level: candidate.level,
            touches,
        }
    }

    /// Union by timestamp. Returns true if any touch was new.
    fn absorb_touches(&mut self, touches: impl IntoIterator<Item = (i64, Touch)>) -> bool {
        let mut added = false;
        for (ts, touch) in touches {
            if let Entry::Vacant(slot) = self.touches.entry(ts) {
                slot.insert(touch);
                added = true;
            }
        }
        added
    }

    /// Rebuild the level's metrics from its touches and rescore.
    fn recompute(&mut self, window_mean_volume: f64, ctx: &ScoringContext) {
        if let (Some((&first, _)), Some((&last, _))) =
            (self.touches.first_key_value(), self.touches.last_key_value())
        {
            let prices: Vec<f64> = self.touches.values().map(|t| t.price).collect();
            let volumes: Vec<f64> = self.touches.values().map(|t| t.volume).collect();
            let level = &mut self.level;
            level.price = mean(&prices).unwrap_or(level.price);
            level.touch_count = self.touches.len();
            level.first_touch_ms = first;
            level.last_touch_ms = last;
            level.volume_ratio = volume_ratio(&volumes, window_mean_volume);
            // Latched: once confirmed, stays confirmed
            level.volume_confirmed |= level.volume_ratio >= ctx.volume_confirmation_ratio;
        }
        self.level.rescore(ctx);
    }
}

/// Where a level was truly broken. Touches at or before `broken_ms` near this
/// price never count again.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RetiredLevel {
    price: f64,
    broken_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum EvictionReason {
    Stale,
    BelowThreshold,
    TrueBreak,
    Capacity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Eviction {
    pub timeframe: Timeframe,
    pub level: KeyLevel,
    pub reason: EvictionReason,
}

/// Per-cycle inputs to [`LevelRegistry::update`].
#[derive(Debug, Clone, Copy)]
pub struct RegistryCycle<'a> {
    pub scoring: &'a ScoringParams,
    pub staleness_bars: usize,
    /// Most recent first.
    pub recent_closes: &'a [f64],
    pub atr: f64,
    pub true_break_atr_multiple: f64,
}

#[derive(Debug, Clone)]
pub struct LevelRegistry {
    capacity: usize,
    levels: HashMap<Timeframe, Vec<RegistryEntry>>,
    retired: HashMap<Timeframe, Vec<RetiredLevel>>,
}

impl LevelRegistry {
    /// Reserve level buffers for every timeframe up front. Allocation failure
    /// here is the registry's only hard error.
    pub fn new(capacity: usize, timeframes: &[Timeframe]) -> Result<Self> {
        let mut levels = HashMap::new();
        levels
            .try_reserve(timeframes.len())
            .context("Failed to reserve level registry index")?;
        for &tf in timeframes {
            let mut buffer: Vec<RegistryEntry> = Vec::new();
            buffer
                .try_reserve(capacity)
                .with_context(|| format!("Failed to reserve {} level slots for {}", capacity, tf))?;
            levels.insert(tf, buffer);
        }
        Ok(Self {
            capacity,
            levels,
            retired: HashMap::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// One full registry cycle for a timeframe: merge, refresh, true-break
    /// check, capacity. Returns every level evicted along the way.
    pub fn update(
        &mut self,
        timeframe: Timeframe,
        candidates: Vec<LevelCandidate>,
        cycle: &RegistryCycle,
    ) -> Vec<Eviction> {
        self.merge(timeframe, candidates, cycle.scoring);
        let mut evicted = self.refresh(timeframe, cycle.scoring, cycle.staleness_bars);
        evicted.extend(self.apply_true_breaks(
            timeframe,
            cycle.recent_closes,
            cycle.atr,
            cycle.true_break_atr_multiple,
            cycle.scoring.ctx.now_ms,
        ));
        evicted.extend(self.enforce_capacity(timeframe));

        #[cfg(debug_assertions)]
        if crate::config::debug::PRINT_REGISTRY_EVENTS {
            for e in &evicted {
                log::info!("   evicted {} [{}]: {}", e.timeframe, e.reason, e.level);
            }
        }

        evicted
    }

    /// Fold candidates into the nearest existing level within the touch zone,
    /// or add them as new levels. Neighbours that drift together are coalesced.
    /// Touches of a truly broken level are stripped first.
    pub fn merge(&mut self, timeframe: Timeframe, candidates: Vec<LevelCandidate>, params: &ScoringParams) {
        let entries = self.levels.entry(timeframe).or_default();
        let retired = self.retired.get(&timeframe).map_or(&[][..], Vec::as_slice);

        for candidate in candidates {
            let Some(incoming) = strip_retired(RegistryEntry::from_candidate(candidate), retired, params) else {
                continue;
            };
            let nearest = entries
                .iter()
                .enumerate()
                .map(|(i, e)| (i, e.level.distance_to(incoming.level.price)))
                .filter(|&(_, d)| d <= params.touch_zone)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i);

            match nearest {
                Some(i) => {
                    let entry = &mut entries[i];
                    entry.level.is_resistance = incoming.level.is_resistance;
                    entry.level.volume_confirmed |= incoming.level.volume_confirmed;
                    entry.absorb_touches(incoming.touches);
                    entry.recompute(params.window_mean_volume, &params.ctx);
                }
                None => entries.push(incoming),
            }
        }

        coalesce(entries, params);
    }

    /// Rescore at the current evaluation time and drop levels that went stale
    /// or fell below the acceptance thresholds.
    pub fn refresh(&mut self, timeframe: Timeframe, params: &ScoringParams, staleness_bars: usize) -> Vec<Eviction> {
        let ctx = &params.ctx;
        if let Some(retired) = self.retired.get_mut(&timeframe) {
            // Past the staleness window its touches have aged out anyway
            retired.retain(|r| bars_between(r.broken_ms, ctx.now_ms, ctx.interval_ms) <= staleness_bars as f64);
        }
        let Some(entries) = self.levels.get_mut(&timeframe) else {
            return Vec::new();
        };
        let mut evicted = Vec::new();

        entries.retain_mut(|entry| {
            entry.level.rescore(ctx);
            let age = bars_between(entry.level.last_touch_ms, ctx.now_ms, ctx.interval_ms);
            let reason = if age > staleness_bars as f64 {
                Some(EvictionReason::Stale)
            } else if entry.level.touch_count < params.min_touches || entry.level.strength() < params.min_strength {
                Some(EvictionReason::BelowThreshold)
            } else {
                None
            };
            match reason {
                Some(reason) => {
                    evicted.push(Eviction {
                        timeframe,
                        level: entry.level.clone(),
                        reason,
                    });
                    false
                }
                None => true,
            }
        });
        evicted
    }

    /// Evict levels price has closed decisively through: the last few closes
    /// all beyond the level and the latest one by more than `multiple` × ATR.
    /// A non-positive ATR evicts nothing. Broken levels are remembered as of
    /// `now_ms` so their old touches cannot rebuild them.
    pub fn apply_true_breaks(
        &mut self,
        timeframe: Timeframe,
        recent_closes: &[f64],
        atr: f64,
        multiple: f64,
        now_ms: i64,
    ) -> Vec<Eviction> {
        let confirm = ANALYSIS.true_break_confirm_bars;
        if !(atr > 0.0 && atr.is_finite()) || recent_closes.len() < confirm {
            return Vec::new();
        }
        let Some(entries) = self.levels.get_mut(&timeframe) else {
            return Vec::new();
        };
        let closes = &recent_closes[..confirm];
        let latest = closes[0];
        let threshold = multiple * atr;

        let mut evicted = Vec::new();
        entries.retain(|entry| {
            let price = entry.level.price;
            let broken = if entry.level.is_resistance {
                closes.iter().all(|&c| c > price) && latest - price > threshold
            } else {
                closes.iter().all(|&c| c < price) && price - latest > threshold
            };
            if broken {
                evicted.push(Eviction {
                    timeframe,
                    level: entry.level.clone(),
                    reason: EvictionReason::TrueBreak,
                });
            }
            !broken
        });

        let retired = self.retired.entry(timeframe).or_default();
        for e in &evicted {
            retired.push(RetiredLevel {
                price: e.level.price,
                broken_ms: now_ms,
            });
        }
        evicted
    }

    /// Drop the weakest levels until the timeframe is within capacity.
    pub fn enforce_capacity(&mut self, timeframe: Timeframe) -> Vec<Eviction> {
        let capacity = self.capacity;
        let Some(entries) = self.levels.get_mut(&timeframe) else {
            return Vec::new();
        };
        if entries.len() <= capacity {
            return Vec::new();
        }

        entries.sort_by(|a, b| compare_strength(&b.level, &a.level));
        let evicted = entries
            .drain(capacity..)
            .map(|e| Eviction {
                timeframe,
                level: e.level,
                reason: EvictionReason::Capacity,
            })
            .collect();
        entries.sort_by(|a, b| a.level.price.total_cmp(&b.level.price));
        evicted
    }

    pub fn strongest(&self, timeframe: Timeframe) -> Result<KeyLevel> {
        self.levels
            .get(&timeframe)
            .and_then(|entries| entries.iter().map(|e| &e.level).max_by(|a, b| compare_strength(a, b)))
            .cloned()
            .ok_or_else(|| anyhow!("no valid level on {}", timeframe))
    }

    /// Copies of every level on a timeframe, ordered by price.
    pub fn levels(&self, timeframe: Timeframe) -> Vec<KeyLevel> {
        self.levels
            .get(&timeframe)
            .map(|entries| entries.iter().map(|e| e.level.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self, timeframe: Timeframe) -> usize {
        self.levels.get(&timeframe).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, timeframe: Timeframe) -> bool {
        self.len(timeframe) == 0
    }
}

/// Drop touches at or before the break of any retired level near this entry.
/// `None` when nothing newer is left.
fn strip_retired(mut entry: RegistryEntry, retired: &[RetiredLevel], params: &ScoringParams) -> Option<RegistryEntry> {
    let cutoff = retired
        .iter()
        .filter(|r| entry.level.distance_to(r.price) <= params.touch_zone)
        .map(|r| r.broken_ms)
        .max();
    let Some(cutoff) = cutoff else {
        return Some(entry);
    };

    entry.touches.retain(|&ts, _| ts > cutoff);
    if entry.touches.is_empty() {
        return None;
    }
    entry.level.volume_confirmed = false;
    entry.recompute(params.window_mean_volume, &params.ctx);
    Some(entry)
}

fn coalesce(entries: &mut Vec<RegistryEntry>, params: &ScoringParams) {
    entries.sort_by(|a, b| a.level.price.total_cmp(&b.level.price));

    let mut merged: Vec<RegistryEntry> = Vec::with_capacity(entries.len());
    for entry in entries.drain(..) {
        match merged.last_mut() {
            Some(prev) if prev.level.distance_to(entry.level.price) <= params.touch_zone => {
                if entry.level.touch_count > prev.level.touch_count {
                    prev.level.is_resistance = entry.level.is_resistance;
                }
                prev.level.volume_confirmed |= entry.level.volume_confirmed;
                prev.absorb_touches(entry.touches);
                prev.recompute(params.window_mean_volume, &params.ctx);
            }
            _ => merged.push(entry),
        }
    }
    entries.append(&mut merged);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::swing_points::{SwingKind, SwingPoint};
    use crate::utils::TimeUtils;

    const H: i64 = TimeUtils::MS_IN_H;
    const TF: Timeframe = Timeframe::H1;

    fn params(now_bar: i64) -> ScoringParams {
        ScoringParams {
            touch_zone: 0.0005,
            min_touches: 2,
            min_strength: 0.55,
            ctx: ScoringContext {
                now_ms: now_bar * H,
                interval_ms: H,
                lookback: 100,
                volume_confirmation_ratio: 1.5,
            },
            window_mean_volume: 100.0,
            reference_close: 1.1000,
        }
    }

    fn candidate(price: f64, touch_bars: &[i64], volume: f64, p: &ScoringParams) -> LevelCandidate {
        let touches: Vec<SwingPoint> = touch_bars
            .iter()
            .map(|&b| SwingPoint {
                price,
                timestamp_ms: b * H,
                kind: SwingKind::High,
                volume,
            })
            .collect();
        let first = touch_bars.iter().min().copied().unwrap_or(0) * H;
        let last = touch_bars.iter().max().copied().unwrap_or(0) * H;
        let level = KeyLevel::new(
            price,
            true,
            touches.len(),
            (first, last),
            volume / p.window_mean_volume,
            &p.ctx,
        );
        LevelCandidate { level, touches }
    }

    fn cycle<'a>(p: &'a ScoringParams, closes: &'a [f64], atr: f64) -> RegistryCycle<'a> {
        RegistryCycle {
            scoring: p,
            staleness_bars: 300,
            recent_closes: closes,
            atr,
            true_break_atr_multiple: 1.5,
        }
    }

    #[test]
    fn empty_registry_has_no_strongest() {
        let registry = LevelRegistry::new(100, &[TF]).unwrap();
        let err = registry.strongest(TF).unwrap_err();
        assert!(err.to_string().contains("no valid level"));
        assert!(registry.strongest(Timeframe::D1).is_err());
        assert!(registry.is_empty(TF));
    }

    #[test]
    fn same_touches_are_never_double_counted() {
        let p = params(100);
        let mut registry = LevelRegistry::new(100, &[TF]).unwrap();
        let closes = [1.1000, 1.1000, 1.1000];
        for _ in 0..3 {
            registry.update(TF, vec![candidate(1.1050, &[90, 95, 98], 100.0, &p)], &cycle(&p, &closes, 0.001));
        }
        assert_eq!(registry.len(TF), 1);
        assert_eq!(registry.strongest(TF).unwrap().touch_count, 3);
    }

    #[test]
    fn new_touches_merge_into_nearest_level() {
        let p = params(100);
        let mut registry = LevelRegistry::new(100, &[TF]).unwrap();
        registry.merge(TF, vec![candidate(1.1050, &[90, 95], 100.0, &p)], &p);
        let before = registry.strongest(TF).unwrap();

        registry.merge(TF, vec![candidate(1.1054, &[95, 99], 100.0, &p)], &p);
        let after = registry.strongest(TF).unwrap();
        assert_eq!(registry.len(TF), 1);
        assert_eq!(after.touch_count, 3);
        assert_eq!(after.last_touch_ms, 99 * H);
        // mean of 1.1050, 1.1050, 1.1054
        assert!((after.price - 1.105133).abs() < 1e-5);
        assert!(after.strength() >= before.strength());
    }

    #[test]
    fn drifting_neighbours_coalesce() {
        let p = params(100);
        let mut registry = LevelRegistry::new(100, &[TF]).unwrap();
        registry.merge(
            TF,
            vec![candidate(1.1040, &[80, 85], 100.0, &p), candidate(1.1047, &[90, 92], 100.0, &p)],
            &p,
        );
        assert_eq!(registry.len(TF), 2);

        // Touches between them pull the upper level within reach of the lower
        registry.merge(TF, vec![candidate(1.1044, &[94, 95, 96, 97, 98, 99], 100.0, &p)], &p);
        assert_eq!(registry.len(TF), 1);
        assert_eq!(registry.strongest(TF).unwrap().touch_count, 10);
    }

    #[test]
    fn volume_confirmation_is_latched() {
        let p = params(100);
        let mut registry = LevelRegistry::new(100, &[TF]).unwrap();
        registry.merge(TF, vec![candidate(1.1050, &[90, 91], 300.0, &p)], &p);
        assert!(registry.strongest(TF).unwrap().volume_confirmed);

        // Quiet touches dilute the ratio below threshold
        registry.merge(TF, vec![candidate(1.1050, &[95, 96, 97, 98], 10.0, &p)], &p);
        let level = registry.strongest(TF).unwrap();
        assert!(level.volume_ratio < 1.5);
        assert!(level.volume_confirmed);
    }

    #[test]
    fn stale_and_weak_levels_are_evicted() {
        let p = params(100);
        let mut registry = LevelRegistry::new(100, &[TF]).unwrap();
        registry.merge(TF, vec![candidate(1.1050, &[95, 99], 100.0, &p)], &p);
        assert!(registry.refresh(TF, &p, 300).is_empty());

        // 60 bars later recency has decayed below min_strength
        let later = params(160);
        let evicted = registry.refresh(TF, &later, 300);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].reason, EvictionReason::BelowThreshold);

        registry.merge(TF, vec![candidate(1.2000, &[95, 99], 100.0, &p)], &p);
        let evicted = registry.refresh(TF, &later, 50);
        assert_eq!(evicted[0].reason, EvictionReason::Stale);
        assert!(registry.is_empty(TF));
    }

    #[test]
    fn true_break_needs_consecutive_closes_and_distance() {
        let p = params(100);
        let mut registry = LevelRegistry::new(100, &[TF]).unwrap();
        registry.merge(TF, vec![candidate(1.1050, &[95, 99], 100.0, &p)], &p);

        // Only two closes above
        assert!(registry.apply_true_breaks(TF, &[1.1080, 1.1070, 1.1040], 0.001, 1.5, 100 * H).is_empty());
        // Three above but latest too close
        assert!(registry.apply_true_breaks(TF, &[1.1060, 1.1070, 1.1055], 0.001, 1.5, 100 * H).is_empty());
        // Zero ATR never breaks
        assert!(registry.apply_true_breaks(TF, &[1.1080, 1.1070, 1.1060], 0.0, 1.5, 100 * H).is_empty());

        let evicted = registry.apply_true_breaks(TF, &[1.1080, 1.1070, 1.1060], 0.001, 1.5, 100 * H);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].reason, EvictionReason::TrueBreak);
        assert!(registry.is_empty(TF));
    }

    #[test]
    fn broken_level_stays_retired_until_touched_again() {
        let p = params(100);
        let mut registry = LevelRegistry::new(100, &[TF]).unwrap();
        let above = [1.1080, 1.1070, 1.1060];
        registry.update(TF, vec![candidate(1.1050, &[90, 95, 98], 100.0, &p)], &cycle(&p, &above, 0.001));
        assert!(registry.is_empty(TF));

        // Same touches, price back near the level: nothing comes back
        let next = params(101);
        let near = [1.1055, 1.1080, 1.1070];
        for _ in 0..3 {
            registry.update(TF, vec![candidate(1.1050, &[90, 95, 98], 100.0, &next)], &cycle(&next, &near, 0.001));
            assert!(registry.strongest(TF).is_err());
        }

        // Touches after the break form a new level without the old ones
        let later = params(106);
        registry.update(
            TF,
            vec![candidate(1.1050, &[90, 95, 98, 103, 105], 100.0, &later)],
            &cycle(&later, &near, 0.001),
        );
        let reborn = registry.strongest(TF).unwrap();
        assert_eq!(reborn.touch_count, 2);
        assert_eq!(reborn.first_touch_ms, 103 * H);
    }

    #[test]
    fn capacity_evicts_weakest_first() {
        let p = params(100);
        let mut registry = LevelRegistry::new(2, &[TF]).unwrap();
        registry.merge(
            TF,
            vec![
                candidate(1.10, &[97, 98, 99], 100.0, &p),
                candidate(1.11, &[98, 99], 100.0, &p),
                candidate(1.12, &[90, 91], 100.0, &p),
            ],
            &p,
        );
        let evicted = registry.enforce_capacity(TF);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].reason, EvictionReason::Capacity);
        assert!((evicted[0].level.price - 1.12).abs() < 1e-12);

        let prices: Vec<f64> = registry.levels(TF).iter().map(|l| l.price).collect();
        assert_eq!(prices.len(), 2);
        assert!(prices[0] < prices[1]);
    }

    #[test]
    fn extra_touch_never_lowers_strength() {
        let p = params(100);
        for extra_bar in [1, 50, 94, 99] {
            let mut registry = LevelRegistry::new(10, &[TF]).unwrap();
            registry.merge(TF, vec![candidate(1.1050, &[95, 96], 100.0, &p)], &p);
            let before = registry.strongest(TF).unwrap().strength();
            registry.merge(TF, vec![candidate(1.1050, &[extra_bar], 100.0, &p)], &p);
            assert!(registry.strongest(TF).unwrap().strength() >= before);
        }
    }
}
