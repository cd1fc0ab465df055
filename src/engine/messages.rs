use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analysis::breakout::BreakoutEvent;
use crate::analysis::report::Report;
use crate::domain::{KeyLevel, Timeframe};

/// Notifications pushed to subscribers and returned from each cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    LevelFound { timeframe: Timeframe, level: KeyLevel },
    LevelLost { timeframe: Timeframe, level: KeyLevel },
    Breakout(BreakoutEvent),
}

impl EngineEvent {
    pub fn timeframe(&self) -> Timeframe {
        match self {
            EngineEvent::LevelFound { timeframe, .. } | EngineEvent::LevelLost { timeframe, .. } => *timeframe,
            EngineEvent::Breakout(event) => event.timeframe,
        }
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EngineEvent::LevelFound { timeframe, level } => write!(f, "[{}] level found: {}", timeframe, level),
            EngineEvent::LevelLost { timeframe, level } => write!(f, "[{}] level lost: {}", timeframe, level),
            EngineEvent::Breakout(event) => write!(f, "[{}] {}", event.timeframe, event),
        }
    }
}

/// The result of one update cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub report: Report,
    pub events: Vec<EngineEvent>,
}
