use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::utils::TimeUtils;

/// Bar granularity, ordered from finest to coarsest.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
    MN1,
}

impl Timeframe {
    pub fn interval_ms(&self) -> i64 {
        match self {
            Timeframe::M1 => TimeUtils::MS_IN_MIN,
            Timeframe::M5 => TimeUtils::MS_IN_5_MIN,
            Timeframe::M15 => TimeUtils::MS_IN_15_MIN,
            Timeframe::M30 => TimeUtils::MS_IN_30_MIN,
            Timeframe::H1 => TimeUtils::MS_IN_H,
            Timeframe::H4 => TimeUtils::MS_IN_4_H,
            Timeframe::D1 => TimeUtils::MS_IN_D,
            Timeframe::W1 => TimeUtils::MS_IN_W,
            Timeframe::MN1 => TimeUtils::MS_IN_1_M,
        }
    }

    /// The next tier up, used as the trend-gating timeframe.
    /// MN1 is its own higher tier.
    pub fn higher(&self) -> Timeframe {
        match self {
            Timeframe::M1 => Timeframe::M5,
            Timeframe::M5 => Timeframe::M15,
            Timeframe::M15 => Timeframe::M30,
            Timeframe::M30 => Timeframe::H1,
            Timeframe::H1 => Timeframe::H4,
            Timeframe::H4 => Timeframe::D1,
            Timeframe::D1 => Timeframe::W1,
            Timeframe::W1 | Timeframe::MN1 => Timeframe::MN1,
        }
    }

    pub fn from_interval_ms(interval_ms: i64) -> Option<Timeframe> {
        use strum::IntoEnumIterator;
        Timeframe::iter().find(|tf| tf.interval_ms() == interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn higher_tier_is_coarser() {
        for tf in Timeframe::iter().filter(|tf| *tf != Timeframe::MN1) {
            assert!(tf.higher() > tf, "{tf} should move up a tier");
            assert!(tf.higher().interval_ms() > tf.interval_ms());
        }
        assert_eq!(Timeframe::MN1.higher(), Timeframe::MN1);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(Timeframe::from_str("h1").unwrap(), Timeframe::H1);
        assert_eq!(Timeframe::from_str("MN1").unwrap(), Timeframe::MN1);
        assert!(Timeframe::from_str("H2").is_err());
    }

    #[test]
    fn interval_round_trip() {
        for tf in Timeframe::iter() {
            assert_eq!(Timeframe::from_interval_ms(tf.interval_ms()), Some(tf));
        }
    }
}
