use anyhow::{Context, Result};
use level_sniper::config::DEMO;
use level_sniper::data::synthetic::synthetic_collection;
use level_sniper::data::timeseries::cache_file::CacheFile;
use level_sniper::demo_specs;

fn main() -> Result<()> {
    build_synthetic_cache()
}

fn build_synthetic_cache() -> Result<()> {
    let primary = DEMO.primary_timeframe;
    let collection = synthetic_collection(&demo_specs(), primary, DEMO.bars)
        .context("Failed to generate synthetic bars")?;

    for series in &collection.series_data {
        if let Some((low, high)) = series.price_range() {
            println!(
                "{} {}: {} bars, {:.5} - {:.5}",
                series.symbol,
                series.timeframe,
                series.klines(),
                low,
                high
            );
        }
    }

    let output_cache = CacheFile::new(primary, collection);
    let output_path = CacheFile::default_cache_path(primary);
    output_cache.save_to_path(&output_path)?;

    println!(
        "✅ Synthetic cache written to {:?} with {} series.",
        output_path,
        output_cache.data.series_data.len()
    );
    Ok(())
}
