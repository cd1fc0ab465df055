use crate::domain::KeyLevel;

/// What happened to a timeframe's active level this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelChange {
    Unchanged,
    Found(KeyLevel),
    Replaced { previous: KeyLevel, current: KeyLevel },
    Lost(KeyLevel),
}

/// The active key level tracked on one timeframe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyState {
    pub key_level_found: bool,
    /// Owned copy of the registry's strongest level.
    pub active_key_level: Option<KeyLevel>,
    pub last_update_ms: i64,
}

impl StrategyState {
    /// Adopt this cycle's strongest level.
    ///
    /// A level more than `touch_zone` away from the active one replaces it
    /// wholesale. A nearby one keeps the slot and only refreshes its metrics.
    pub fn update(&mut self, strongest: Option<KeyLevel>, touch_zone: f64, now_ms: i64) -> LevelChange {
        self.last_update_ms = now_ms;
        self.key_level_found = strongest.is_some();

        match (self.active_key_level.take(), strongest) {
            (None, None) => LevelChange::Unchanged,
            (None, Some(current)) => {
                self.active_key_level = Some(current.clone());
                LevelChange::Found(current)
            }
            (Some(previous), None) => LevelChange::Lost(previous),
            (Some(previous), Some(current)) if previous.distance_to(current.price) > touch_zone => {
                self.active_key_level = Some(current.clone());
                LevelChange::Replaced { previous, current }
            }
            (Some(_), Some(current)) => {
                self.active_key_level = Some(current);
                LevelChange::Unchanged
            }
        }
    }
}
