//! OHLCV data loading
//!
//! CSV input for the backtest and grid commands. Expected columns:
//! datetime, open, high, low, close, volume.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{info, warn};

use crate::Candle;

/// Load candles from a CSV file, sorted and deduplicated by timestamp.
///
/// Rows that fail candle validation are skipped with a warning rather than
/// aborting the load; a file with no usable rows is an error.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut candles = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("missing datetime column")?;
        let datetime = parse_datetime(dt_str)
            .with_context(|| format!("row {}: bad datetime {:?}", row_idx + 1, dt_str))?;

        let field = |idx: usize, name: &str| -> Result<f64> {
            record
                .get(idx)
                .with_context(|| format!("missing {name} column"))?
                .parse()
                .with_context(|| format!("row {}: bad {name}", row_idx + 1))
        };

        let candle = Candle {
            datetime,
            open: field(1, "open")?,
            high: field(2, "high")?,
            low: field(3, "low")?,
            close: field(4, "close")?,
            volume: field(5, "volume")?,
        };

        if let Err(err) = candle.validate() {
            warn!("row {} skipped: {}", row_idx + 1, err);
            continue;
        }

        candles.push(candle);
    }

    if candles.is_empty() {
        anyhow::bail!("no usable candles in {}", path.display());
    }

    candles.sort_by_key(|c| c.datetime);
    candles.dedup_by_key(|c| c.datetime);

    info!("loaded {} candles from {}", candles.len(), path.display());
    Ok(candles)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = s.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }
    // Naive timestamps are taken as UTC
    let naive = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

/// Save candles to a CSV file in the same column layout `load_csv` reads.
pub fn save_csv(candles: &[Candle], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    writer.write_record(["datetime", "open", "high", "low", "close", "volume"])?;
    for candle in candles {
        writer.write_record([
            candle.datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            candle.open.to_string(),
            candle.high.to_string(),
            candle.low.to_string(),
            candle.close.to_string(),
            candle.volume.to_string(),
        ])?;
    }
    writer.flush()?;

    info!("saved {} candles to {}", candles.len(), path.display());
    Ok(())
}
