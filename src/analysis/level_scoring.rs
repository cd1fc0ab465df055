use std::cmp::Ordering;

use itertools::Itertools;

use crate::analysis::swing_points::{SwingKind, SwingPoint};
use crate::domain::{KeyLevel, ScoringContext};
use crate::utils::maths_utils::mean;

/// A group of swing points lying within the touch zone of their running centroid.
#[derive(Debug, Clone)]
pub struct TouchCluster {
    pub members: Vec<SwingPoint>,
    pub centroid: f64,
}

impl TouchCluster {
    fn start(point: SwingPoint) -> Self {
        Self {
            centroid: point.price,
            members: vec![point],
        }
    }

    fn absorb(&mut self, point: SwingPoint) {
        self.members.push(point);
        let n = self.members.len() as f64;
        self.centroid += (point.price - self.centroid) / n;
    }

    pub fn touch_span(&self) -> (i64, i64) {
        self.members
            .iter()
            .map(|p| p.timestamp_ms)
            .minmax()
            .into_option()
            .unwrap_or((0, 0))
    }
}

/// Inputs to scoring beyond the swing points themselves.
#[derive(Debug, Clone, Copy)]
pub struct ScoringParams {
    pub touch_zone: f64,
    pub min_touches: usize,
    pub min_strength: f64,
    pub ctx: ScoringContext,
    /// Mean bar volume over the scanned window.
    pub window_mean_volume: f64,
    /// Latest close, used to break high/low count ties.
    pub reference_close: f64,
}

/// A scored level plus the touches that produced it.
#[derive(Debug, Clone)]
pub struct LevelCandidate {
    pub level: KeyLevel,
    pub touches: Vec<SwingPoint>,
}

#[derive(Debug, Clone, Default)]
pub struct ScoredLevels {
    /// Accepted candidates, ordered by price.
    pub candidates: Vec<LevelCandidate>,
    pub strongest: Option<KeyLevel>,
}

/// Group points by price, the way islands of activity are grouped: sort, then
/// sweep, extending the current group while the next point is within
/// `touch_zone` of its centroid.
pub fn cluster_touches(points: impl IntoIterator<Item = SwingPoint>, touch_zone: f64) -> Vec<TouchCluster> {
    let sorted = points.into_iter().sorted_by(|a, b| {
        a.price
            .total_cmp(&b.price)
            .then(a.timestamp_ms.cmp(&b.timestamp_ms))
    });

    let mut clusters: Vec<TouchCluster> = Vec::new();
    for point in sorted {
        match clusters.last_mut() {
            Some(cluster) if (point.price - cluster.centroid).abs() <= touch_zone => cluster.absorb(point),
            _ => clusters.push(TouchCluster::start(point)),
        }
    }
    clusters
}

/// Ordering used to pick the strongest level: strength, then touches, then recency.
pub fn compare_strength(a: &KeyLevel, b: &KeyLevel) -> Ordering {
    a.strength()
        .total_cmp(&b.strength())
        .then(a.touch_count.cmp(&b.touch_count))
        .then(a.last_touch_ms.cmp(&b.last_touch_ms))
}

/// Ordering used when two candidates compete for the same price:
/// touches, then strength, then recency.
fn compare_overlap_preference(a: &KeyLevel, b: &KeyLevel) -> Ordering {
    a.touch_count
        .cmp(&b.touch_count)
        .then(a.strength().total_cmp(&b.strength()))
        .then(a.last_touch_ms.cmp(&b.last_touch_ms))
}

/// Mean touch-bar volume over the window mean. 0 when the window mean is unusable.
pub fn volume_ratio(touch_volumes: &[f64], window_mean_volume: f64) -> f64 {
    if !(window_mean_volume > 0.0 && window_mean_volume.is_finite()) {
        return 0.0;
    }
    mean(touch_volumes).map_or(0.0, |m| m / window_mean_volume)
}

/// One touch per bar. An outside bar whose high and low both fall in the
/// cluster keeps whichever extreme sits closer to the centroid.
fn distinct_touches(cluster: &TouchCluster) -> Vec<SwingPoint> {
    let centroid = cluster.centroid;
    cluster
        .members
        .iter()
        .copied()
        .sorted_by_key(|p| p.timestamp_ms)
        .coalesce(|a, b| {
            if a.timestamp_ms != b.timestamp_ms {
                Err((a, b))
            } else if (b.price - centroid).abs() < (a.price - centroid).abs() {
                Ok(b)
            } else {
                Ok(a)
            }
        })
        .collect()
}

fn candidate_from_cluster(cluster: TouchCluster, params: &ScoringParams) -> LevelCandidate {
    let touches = distinct_touches(&cluster);
    let highs = touches.iter().filter(|p| p.kind == SwingKind::High).count();
    let lows = touches.len() - highs;
    let is_resistance = match highs.cmp(&lows) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => cluster.centroid > params.reference_close,
    };
    // Same price the registry derives from these touches
    let prices: Vec<f64> = touches.iter().map(|p| p.price).collect();
    let volumes: Vec<f64> = touches.iter().map(|p| p.volume).collect();
    let level = KeyLevel::new(
        mean(&prices).unwrap_or(cluster.centroid),
        is_resistance,
        touches.len(),
        cluster.touch_span(),
        volume_ratio(&volumes, params.window_mean_volume),
        &params.ctx,
    );
    LevelCandidate { level, touches }
}

/// Keep only the preferred candidate among any that sit within the touch zone
/// of each other.
fn resolve_overlaps(mut candidates: Vec<LevelCandidate>, touch_zone: f64) -> Vec<LevelCandidate> {
    candidates.sort_by(|a, b| compare_overlap_preference(&b.level, &a.level));
    let mut kept: Vec<LevelCandidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept
            .iter()
            .all(|k| k.level.distance_to(candidate.level.price) > touch_zone)
        {
            kept.push(candidate);
        }
    }
    kept.sort_by(|a, b| a.level.price.total_cmp(&b.level.price));
    kept
}

/// Cluster swing points into levels, score them, and drop those below the
/// touch and strength thresholds.
pub fn score_levels(points: impl IntoIterator<Item = SwingPoint>, params: &ScoringParams) -> ScoredLevels {
    let scored: Vec<LevelCandidate> = cluster_touches(points, params.touch_zone)
        .into_iter()
        .map(|cluster| candidate_from_cluster(cluster, params))
        .collect();

    #[cfg(debug_assertions)]
    if crate::config::debug::PRINT_LEVEL_SCORING {
        for c in &scored {
            log::info!("   candidate {}", c.level);
        }
    }

    let accepted: Vec<LevelCandidate> = scored
        .into_iter()
        .filter(|c| c.level.touch_count >= params.min_touches && c.level.strength() >= params.min_strength)
        .collect();

    let candidates = resolve_overlaps(accepted, params.touch_zone);
    let strongest = candidates
        .iter()
        .map(|c| &c.level)
        .max_by(|a, b| compare_strength(a, b))
        .cloned();

    ScoredLevels {
        candidates,
        strongest,
    }
}
