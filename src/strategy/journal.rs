use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::common::errors::Result;
use crate::common::types::{OrderRequest, Side};

/// Kind of journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEvent {
    OrderPlaced,
    OrderFailed,
    EntrySkipped,
    Adjustment,
    Terminated,
}

/// One append-only trade/adjustment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub timestamp: DateTime<Utc>,
    pub event: JournalEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Running P&L at the time of the record
    pub pnl: Decimal,
}

impl JournalRecord {
    pub fn order(
        timestamp: DateTime<Utc>,
        request: &OrderRequest,
        result: std::result::Result<&str, String>,
        pnl: Decimal,
    ) -> Self {
        let (event, order_id, reason) = match result {
            Ok(id) => (JournalEvent::OrderPlaced, Some(id.to_string()), None),
            Err(reason) => (JournalEvent::OrderFailed, None, Some(reason)),
        };
        Self {
            timestamp,
            event,
            instrument: Some(request.instrument.clone()),
            side: Some(request.side),
            quantity: Some(request.quantity),
            order_id,
            reason,
            pnl,
        }
    }

    pub fn note(
        timestamp: DateTime<Utc>,
        event: JournalEvent,
        reason: impl Into<String>,
        pnl: Decimal,
    ) -> Self {
        Self {
            timestamp,
            event,
            instrument: None,
            side: None,
            quantity: None,
            order_id: None,
            reason: Some(reason.into()),
            pnl,
        }
    }
}

/// Append-only journal, kept in memory and optionally mirrored to a JSON-lines file
#[derive(Debug, Default)]
pub struct TradeJournal {
    records: Vec<JournalRecord>,
    sink: Option<BufWriter<File>>,
}

impl TradeJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Journal that also appends every record to `path`
    pub fn with_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            records: Vec::new(),
            sink: Some(BufWriter::new(file)),
        })
    }

    pub fn record(&mut self, record: JournalRecord) {
        if let Some(sink) = self.sink.as_mut() {
            let written = serde_json::to_string(&record)
                .map_err(std::io::Error::from)
                .and_then(|line| writeln!(sink, "{}", line))
                .and_then(|_| sink.flush());
            if let Err(e) = written {
                warn!(error = %e, "Failed to write journal record");
            }
        }
        self.records.push(record);
    }

    pub fn records(&self) -> &[JournalRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<JournalRecord> {
        self.records
    }

    /// All records as JSON lines
    pub fn to_jsonl(&self) -> String {
        to_jsonl(&self.records)
    }
}

/// Serialize records as JSON lines
pub fn to_jsonl(records: &[JournalRecord]) -> String {
    records
        .iter()
        .filter_map(|r| serde_json::to_string(r).ok())
        .map(|line| line + "\n")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_records() {
        let ts = Utc.with_ymd_and_hms(2023, 10, 23, 4, 30, 0).unwrap();
        let request = OrderRequest::market("NFO:NIFTY26OCT18700PE", Side::Sell, 250);

        let ok = JournalRecord::order(ts, &request, Ok("SIM-1"), dec!(0));
        assert_eq!(ok.event, JournalEvent::OrderPlaced);
        assert_eq!(ok.order_id.as_deref(), Some("SIM-1"));

        let failed = JournalRecord::order(ts, &request, Err("margin".into()), dec!(-10));
        assert_eq!(failed.event, JournalEvent::OrderFailed);
        assert_eq!(failed.reason.as_deref(), Some("margin"));
        assert!(failed.order_id.is_none());
    }

    #[test]
    fn test_file_sink_appends_json_lines() {
        let path = std::env::temp_dir().join(format!("iron_condor_journal_{}.jsonl", std::process::id()));
        std::fs::remove_file(&path).ok();
        let ts = Utc.with_ymd_and_hms(2023, 10, 23, 4, 30, 0).unwrap();

        let mut journal = TradeJournal::with_file(&path).unwrap();
        journal.record(JournalRecord::note(ts, JournalEvent::Terminated, "session ending", dec!(42)));
        journal.record(JournalRecord::note(ts, JournalEvent::EntrySkipped, "market not open", dec!(0)));

        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(written, journal.to_jsonl());
        assert_eq!(written.lines().count(), 2);
        assert!(written.lines().next().unwrap().contains("\"event\":\"terminated\""));
    }
}
