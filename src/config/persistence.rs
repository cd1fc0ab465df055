//! File persistence and serialization configuration

use crate::domain::Timeframe;

/// Directory path for storing bar cache files
pub const KLINE_PATH: &str = "kline_data";

/// Base filename for bar cache files (without extension)
pub const KLINE_FILENAME_WITHOUT_EXT: &str = "bars";

/// Current version of the bar cache serialization format
pub const KLINE_VERSION: f64 = 1.0;

/// Generate timeframe-specific cache filename
/// Example: "bars_H1_v1.bin"
pub fn kline_cache_filename(timeframe: Timeframe) -> String {
    format!(
        "{}_{}_v{}.bin",
        KLINE_FILENAME_WITHOUT_EXT, timeframe, KLINE_VERSION
    )
}
