//! Swing high/low extraction over a bounded lookback window.

use serde::{Deserialize, Serialize};

use crate::config::ANALYSIS;
use crate::domain::Candle;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwingKind {
    High,
    Low,
}

/// A local price extremum relative to its immediate neighbours.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub price: f64,
    pub timestamp_ms: i64,
    pub kind: SwingKind,
    /// Volume traded on the swing bar.
    pub volume: f64,
}

/// Restartable view of the swings in a most-recent-first bar slice.
///
/// Interior bars `1..=depth-1` are tested (clipped to the bars available),
/// so the newest bar never qualifies: its right-hand neighbour has not
/// formed yet.
#[derive(Copy, Clone, Debug)]
pub struct SwingExtractor<'a> {
    bars: &'a [Candle],
    depth: usize,
}

impl<'a> SwingExtractor<'a> {
    pub fn new(bars: &'a [Candle], depth: usize) -> Self {
        Self { bars, depth }
    }

    /// A fresh pass over the window. Call again to restart.
    pub fn points(&self) -> SwingPoints<'a> {
        // Interior index i needs bars[i - 1] and bars[i + 1]
        let window = self.bars.len().min(self.depth.saturating_add(1));
        let end = if window < ANALYSIS.min_bars_for_swings { 1 } else { window - 1 };
        SwingPoints {
            bars: self.bars,
            idx: 1,
            end,
            pending_low: None,
        }
    }

    pub fn highs(&self) -> impl Iterator<Item = SwingPoint> + 'a {
        self.points().filter(|p| p.kind == SwingKind::High)
    }

    pub fn lows(&self) -> impl Iterator<Item = SwingPoint> + 'a {
        self.points().filter(|p| p.kind == SwingKind::Low)
    }
}

impl<'a> IntoIterator for SwingExtractor<'a> {
    type Item = SwingPoint;
    type IntoIter = SwingPoints<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.points()
    }
}

/// Lazy iterator over swing points, newest first.
#[derive(Clone, Debug)]
pub struct SwingPoints<'a> {
    bars: &'a [Candle],
    idx: usize,
    end: usize,
    // A bar that is both a swing high and low yields the low right after the high
    pending_low: Option<SwingPoint>,
}

impl Iterator for SwingPoints<'_> {
    type Item = SwingPoint;

    fn next(&mut self) -> Option<SwingPoint> {
        if let Some(low) = self.pending_low.take() {
            return Some(low);
        }
        while self.idx < self.end {
            let i = self.idx;
            self.idx += 1;

            let (newer, bar, older) = (&self.bars[i - 1], &self.bars[i], &self.bars[i + 1]);
            let is_high = bar.high_price > newer.high_price && bar.high_price > older.high_price;
            let is_low = bar.low_price < newer.low_price && bar.low_price < older.low_price;

            let point = |price, kind| SwingPoint {
                price,
                timestamp_ms: bar.timestamp_ms,
                kind,
                volume: bar.volume,
            };

            match (is_high, is_low) {
                (true, true) => {
                    self.pending_low = Some(point(bar.low_price, SwingKind::Low));
                    return Some(point(bar.high_price, SwingKind::High));
                }
                (true, false) => return Some(point(bar.high_price, SwingKind::High)),
                (false, true) => return Some(point(bar.low_price, SwingKind::Low)),
                (false, false) => {}
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Most-recent-first bars from (high, low) pairs; timestamps count down.
    fn bars(hl: &[(f64, f64)]) -> Vec<Candle> {
        let n = hl.len() as i64;
        hl.iter()
            .enumerate()
            .map(|(i, &(h, l))| Candle::new(n - i as i64, (h + l) / 2.0, h, l, (h + l) / 2.0, 1.0))
            .collect()
    }

    #[test]
    fn fewer_than_three_bars_is_empty() {
        let b = bars(&[(2.0, 1.0), (3.0, 0.5)]);
        assert_eq!(SwingExtractor::new(&b, 10).points().count(), 0);
        assert_eq!(SwingExtractor::new(&[], 10).points().count(), 0);
    }

    #[test]
    fn detects_strict_highs_and_lows() {
        let b = bars(&[(2.0, 1.0), (3.0, 1.5), (2.5, 0.5), (2.8, 1.2), (2.0, 1.0)]);
        let points: Vec<SwingPoint> = SwingExtractor::new(&b, 10).points().collect();
        let kinds: Vec<(usize, SwingKind)> = points
            .iter()
            .map(|p| ((5 - p.timestamp_ms) as usize, p.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![(1, SwingKind::High), (2, SwingKind::Low), (3, SwingKind::High)]
        );
        assert_eq!(points[0].price, 3.0);
        assert_eq!(points[1].price, 0.5);
    }

    #[test]
    fn equal_neighbours_are_not_swings() {
        let b = bars(&[(2.0, 1.0), (2.0, 1.0), (2.0, 1.0), (2.0, 1.0)]);
        assert_eq!(SwingExtractor::new(&b, 10).points().count(), 0);
    }

    #[test]
    fn outside_bar_is_both_high_and_low() {
        let b = bars(&[(2.0, 1.0), (3.0, 0.0), (2.0, 1.0)]);
        let kinds: Vec<SwingKind> = SwingExtractor::new(&b, 10).points().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![SwingKind::High, SwingKind::Low]);
    }

    #[test]
    fn depth_bounds_the_window() {
        // Swing at index 3 is outside a depth of 3 (interior indices 1..=2)
        let b = bars(&[(1.0, 0.5), (1.0, 0.5), (1.0, 0.5), (5.0, 0.5), (1.0, 0.5)]);
        assert_eq!(SwingExtractor::new(&b, 3).points().count(), 0);
        assert_eq!(SwingExtractor::new(&b, 4).points().count(), 1);
    }

    #[test]
    fn restartable() {
        let b = bars(&[(2.0, 1.0), (3.0, 1.5), (2.5, 0.5), (2.8, 1.2), (2.0, 1.0)]);
        let extractor = SwingExtractor::new(&b, 10);
        let first: Vec<SwingPoint> = extractor.points().collect();
        let second: Vec<SwingPoint> = extractor.into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(extractor.highs().count(), 2);
        assert_eq!(extractor.lows().count(), 1);
    }
}
