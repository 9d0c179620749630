//! Historical candle files (CSV or JSON)

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::common::errors::{CondorError, Result};
use crate::common::types::Candle;

/// Raw CSV row; header `timestamp,open,high,low,close,volume`
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "date")]
    timestamp: String,
    open: String,
    high: String,
    low: String,
    close: String,
    #[serde(default)]
    volume: Option<String>,
}

impl CsvRow {
    fn into_candle(self, line: usize) -> Result<Candle> {
        let decimal = |field: &str, value: &str| {
            Decimal::from_str(value.trim()).map_err(|e| {
                CondorError::DataLoad(format!("row {}: invalid {} {:?}: {}", line, field, value, e))
            })
        };
        Ok(Candle {
            timestamp: parse_timestamp(&self.timestamp).map_err(|e| {
                CondorError::DataLoad(format!("row {}: {}", line, e))
            })?,
            open: decimal("open", &self.open)?,
            high: decimal("high", &self.high)?,
            low: decimal("low", &self.low)?,
            close: decimal("close", &self.close)?,
            volume: match self.volume.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => decimal("volume", v)?,
                _ => Decimal::ZERO,
            },
        })
    }
}

/// RFC 3339, or the broker's `2023-01-10T09:15:00+0530` / `2023-01-10 09:15:00+05:30`
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z"))
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%:z"))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CondorError::DataLoad(format!("invalid timestamp {:?}: {}", value, e)))
}

/// Read candles from CSV
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<Candle>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    reader
        .deserialize::<CsvRow>()
        .enumerate()
        .map(|(i, row)| row?.into_candle(i + 2))
        .collect()
}

/// Read candles from a JSON array
pub fn read_json<R: Read>(reader: R) -> Result<Vec<Candle>> {
    Ok(serde_json::from_reader(reader)?)
}

/// Load a candle file; `.json` is read as JSON, anything else as CSV
pub fn load_candles(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        CondorError::DataLoad(format!("cannot open {}: {}", path.display(), e))
    })?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));

    let candles = if is_json {
        read_json(file)?
    } else {
        read_csv(file)?
    };
    info!(path = %path.display(), candles = candles.len(), "Loaded candles");
    Ok(candles)
}

/// Keep candles inside `[start, end]`; either bound may be open
pub fn filter_window(
    candles: Vec<Candle>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Vec<Candle> {
    candles
        .into_iter()
        .filter(|c| start.map_or(true, |s| c.timestamp >= s))
        .filter(|c| end.map_or(true, |e| c.timestamp <= e))
        .collect()
}

/// Timestamps must be strictly increasing
pub fn ensure_increasing(candles: &[Candle]) -> Result<()> {
    match candles
        .windows(2)
        .position(|w| w[1].timestamp <= w[0].timestamp)
    {
        Some(i) => Err(CondorError::DataLoad(format!(
            "candle timestamps not strictly increasing at index {}: {} then {}",
            i + 1,
            candles[i].timestamp,
            candles[i + 1].timestamp
        ))),
        None => Ok(()),
    }
}
