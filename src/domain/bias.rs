use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Higher-timeframe directional context.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
pub enum TrendBias {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum BreakoutDirection {
    Long,
    Short,
}

impl BreakoutDirection {
    /// The only bias that lets a breakout in this direction through.
    pub fn required_bias(&self) -> TrendBias {
        match self {
            BreakoutDirection::Long => TrendBias::Bullish,
            BreakoutDirection::Short => TrendBias::Bearish,
        }
    }

    pub fn aligns_with(&self, bias: TrendBias) -> bool {
        bias == self.required_bias()
    }

    /// +1 for long, -1 for short. Multiplies price differences so "beyond the
    /// level" is always positive.
    pub fn sign(&self) -> f64 {
        match self {
            BreakoutDirection::Long => 1.0,
            BreakoutDirection::Short => -1.0,
        }
    }
}
