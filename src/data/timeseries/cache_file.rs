use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::{KLINE_PATH, KLINE_VERSION, kline_cache_filename};
use crate::data::timeseries::TimeSeriesCollection;
use crate::domain::Timeframe;

/// Serialized bar cache: a collection plus the timeframe it was built around.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CacheFile {
    pub version: f64,
    pub timestamp_ms: i64,
    pub primary_timeframe: Timeframe,
    pub data: TimeSeriesCollection,
}

impl CacheFile {
    pub fn new(primary_timeframe: Timeframe, data: TimeSeriesCollection) -> Self {
        Self {
            version: KLINE_VERSION,
            timestamp_ms: Utc::now().timestamp_millis(),
            primary_timeframe,
            data,
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).context(format!("Failed to open cache file: {:?}", path))?;
        let mut reader = BufReader::new(file);
        let cache: CacheFile = bincode::deserialize_from(&mut reader)
            .context(format!("Failed to deserialize cache: {:?}", path))?;

        if cache.version != KLINE_VERSION {
            bail!(
                "Cache version mismatch: file v{} vs required v{}",
                cache.version,
                KLINE_VERSION
            );
        }

        for series in &cache.data.series_data {
            series
                .validate()
                .with_context(|| format!("Corrupt series in cache: {:?}", path))?;
        }

        #[cfg(debug_assertions)]
        if crate::config::debug::PRINT_SERDE {
            log::info!(
                "✅ Cache loaded: {} series from {:?}",
                cache.data.series_data.len(),
                path
            );
        }
        Ok(cache)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create directory: {}", parent.display()))?;
        }
        let file =
            File::create(path).context(format!("Failed to create file: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)
            .context(format!("Failed to serialize cache to: {}", path.display()))
    }

    pub fn default_cache_path(timeframe: Timeframe) -> PathBuf {
        PathBuf::from(KLINE_PATH).join(kline_cache_filename(timeframe))
    }
}
