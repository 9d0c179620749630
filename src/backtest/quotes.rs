//! Per-option quote history for replays
//!
//! CSV layout: `timestamp,instrument,price[,iv]`, one row per instrument and
//! time. The latest quote at or before the current candle is the one in force.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use super::candles::parse_timestamp;
use crate::common::errors::{CondorError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionQuote {
    pub price: Decimal,
    /// Implied volatility in percent
    pub iv: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionQuotes {
    series: BTreeMap<String, BTreeMap<DateTime<Utc>, OptionQuote>>,
}

impl OptionQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, instrument: impl Into<String>, at: DateTime<Utc>, quote: OptionQuote) {
        self.series.entry(instrument.into()).or_default().insert(at, quote);
    }

    /// Whether the instrument is priced from this table at all
    pub fn covers(&self, instrument: &str) -> bool {
        self.series.contains_key(instrument)
    }

    /// Latest quote at or before `at`
    pub fn latest(&self, instrument: &str, at: DateTime<Utc>) -> Option<OptionQuote> {
        self.series
            .get(instrument)?
            .range(..=at)
            .next_back()
            .map(|(_, quote)| *quote)
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct QuoteRow {
    timestamp: String,
    instrument: String,
    price: String,
    #[serde(default)]
    iv: Option<String>,
}

/// Read option quotes from CSV
pub fn read_option_quotes<R: Read>(reader: R) -> Result<OptionQuotes> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut quotes = OptionQuotes::new();
    for (i, row) in reader.deserialize::<QuoteRow>().enumerate() {
        let row = row?;
        let line = i + 2;
        let decimal = |field: &str, value: &str| {
            Decimal::from_str(value).map_err(|e| {
                CondorError::DataLoad(format!("row {}: invalid {} {:?}: {}", line, field, value, e))
            })
        };
        let at = parse_timestamp(&row.timestamp)
            .map_err(|e| CondorError::DataLoad(format!("row {}: {}", line, e)))?;
        let iv = match row.iv.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => Some(decimal("iv", v)?),
            _ => None,
        };
        quotes.insert(
            row.instrument,
            at,
            OptionQuote {
                price: decimal("price", row.price.trim())?,
                iv,
            },
        );
    }
    Ok(quotes)
}

pub fn load_option_quotes(path: impl AsRef<Path>) -> Result<OptionQuotes> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        CondorError::DataLoad(format!("cannot open {}: {}", path.display(), e))
    })?;
    let quotes = read_option_quotes(file)?;
    info!(path = %path.display(), instruments = quotes.series.len(), "Loaded option quotes");
    Ok(quotes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    const CSV: &str = "timestamp,instrument,price,iv
2023-10-23T09:15:00+05:30,NFO:NIFTY26OCT18700PE,40,18.5
2023-10-23T09:17:00+05:30,NFO:NIFTY26OCT18700PE,52.5,
2023-10-23T09:15:00+05:30,NFO:NIFTY26OCT19300CE,45,16
";

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 10, 23, 3, minute, 0).unwrap()
    }

    #[test]
    fn test_latest_quote_in_force() {
        let quotes = read_option_quotes(CSV.as_bytes()).unwrap();
        let pe = "NFO:NIFTY26OCT18700PE";

        assert!(quotes.covers(pe));
        assert!(!quotes.covers("NSE:NIFTY 50"));
        assert_eq!(quotes.latest(pe, at(44)), None);
        assert_eq!(
            quotes.latest(pe, at(46)),
            Some(OptionQuote {
                price: dec!(40),
                iv: Some(dec!(18.5))
            })
        );
        assert_eq!(
            quotes.latest(pe, at(47)),
            Some(OptionQuote {
                price: dec!(52.5),
                iv: None
            })
        );
    }

    #[test]
    fn test_bad_price_names_the_row() {
        let csv = "timestamp,instrument,price\n2023-10-23T09:15:00+05:30,NFO:X,abc\n";
        let err = read_option_quotes(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, CondorError::DataLoad(ref m) if m.contains("row 2")));
    }
}
