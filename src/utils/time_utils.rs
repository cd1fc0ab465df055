use chrono::{TimeZone, Utc};

pub struct TimeUtils;

impl TimeUtils {
    pub const MS_IN_S: i64 = 1000;
    pub const MS_IN_MIN: i64 = Self::MS_IN_S * 60;
    pub const MS_IN_5_MIN: i64 = Self::MS_IN_S * 60 * 5;
    pub const MS_IN_15_MIN: i64 = Self::MS_IN_S * 60 * 15;
    pub const MS_IN_30_MIN: i64 = Self::MS_IN_S * 60 * 30;
    pub const MS_IN_H: i64 = Self::MS_IN_MIN * 60;
    pub const MS_IN_4_H: i64 = Self::MS_IN_MIN * 60 * 4;
    pub const MS_IN_D: i64 = Self::MS_IN_H * 24;
    pub const MS_IN_W: i64 = Self::MS_IN_D * 7;
    pub const MS_IN_1_M: i64 = Self::MS_IN_D * 30;
    pub const STANDARD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";
}

/// Whole bars elapsed between two timestamps. Negative spans count as zero.
pub fn bars_between(earlier_ms: i64, later_ms: i64, interval_ms: i64) -> f64 {
    if interval_ms <= 0 {
        return 0.0;
    }
    ((later_ms - earlier_ms).max(0) as f64) / interval_ms as f64
}

pub fn epoch_ms_to_utc(epoch_ms: i64) -> String {
    // Used for display purposes
    if let chrono::LocalResult::Single(datetime) = Utc.timestamp_millis_opt(epoch_ms) {
        datetime.format(TimeUtils::STANDARD_TIME_FORMAT).to_string()
    } else {
        // Handle invalid timestamp values
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bars_between_counts_whole_intervals() {
        assert_eq!(bars_between(0, 3 * TimeUtils::MS_IN_H, TimeUtils::MS_IN_H), 3.0);
        assert_eq!(bars_between(5, 0, TimeUtils::MS_IN_H), 0.0);
        assert_eq!(bars_between(0, 100, 0), 0.0);
    }

    #[test]
    fn formats_epoch_ms() {
        assert_eq!(epoch_ms_to_utc(0), "1970-01-01 00:00");
        assert_eq!(epoch_ms_to_utc(TimeUtils::MS_IN_D + TimeUtils::MS_IN_H), "1970-01-02 01:00");
    }
}
