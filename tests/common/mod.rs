//! Common test utilities and fixtures

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use iron_condor::common::types::Candle;
use rust_decimal::Decimal;

/// Monday 2023-10-23 09:15 IST
pub fn session_open() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 10, 23, 3, 45, 0).unwrap()
}

/// One-minute candles starting at the session open
pub fn minute_candles(prices: &[(Decimal, Decimal)]) -> Vec<Candle> {
    minute_candles_at(session_open(), prices)
}

/// One-minute `(open, close)` candles starting at `start`
pub fn minute_candles_at(start: DateTime<Utc>, prices: &[(Decimal, Decimal)]) -> Vec<Candle> {
    prices
        .iter()
        .enumerate()
        .map(|(i, (open, close))| Candle {
            timestamp: start + Duration::minutes(i as i64),
            open: *open,
            high: (*open).max(*close),
            low: (*open).min(*close),
            close: *close,
            volume: Decimal::from(100 + i as u32),
        })
        .collect()
}

/// Render candles in the CSV layout the loader reads
pub fn to_csv(candles: &[Candle]) -> String {
    let mut out = String::from("timestamp,open,high,low,close,volume\n");
    for c in candles {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            c.timestamp.to_rfc3339(),
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume
        ));
    }
    out
}

/// Unique temp file path for this test process
pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("iron_condor_{}_{}", std::process::id(), name))
}

/// Sample Kite responses
pub mod kite_responses {
    pub const LTP: &str = r#"{
        "status": "success",
        "data": {
            "NSE:NIFTY 50": {"instrument_token": 256265, "last_price": 19012.35}
        }
    }"#;

    pub const ORDER_PLACED: &str = r#"{
        "status": "success",
        "data": {"order_id": "151220000000000"}
    }"#;

    pub const ORDERS: &str = r#"{
        "status": "success",
        "data": [
            {"order_id": "151220000000041", "status": "REJECTED", "tag": "ictest41", "status_message": "Insufficient funds"},
            {"order_id": "151220000000042", "status": "COMPLETE", "tag": "ictest42", "tradingsymbol": "NIFTY26OCT18700PE"}
        ]
    }"#;

    pub const POSITIONS: &str = r#"{
        "status": "success",
        "data": {
            "net": [],
            "day": [
                {"tradingsymbol": "NIFTY26OCT18700PE", "exchange": "NFO", "product": "MIS", "quantity": -250, "average_price": 40, "last_price": 36, "pnl": 1000},
                {"tradingsymbol": "NIFTY26OCT18600PE", "exchange": "NFO", "product": "MIS", "quantity": 250, "average_price": 25, "last_price": 23, "pnl": -500},
                {"tradingsymbol": "NIFTY26OCT19300CE", "exchange": "NFO", "product": "MIS", "quantity": 0, "average_price": 45, "last_price": 44, "pnl": 120.5}
            ]
        }
    }"#;

    pub const TOKEN_ERROR: &str = r#"{
        "status": "error",
        "message": "Incorrect `api_key` or `access_token`.",
        "data": null,
        "error_type": "TokenException"
    }"#;

    pub const MARGIN_ERROR: &str = r#"{
        "status": "error",
        "message": "Insufficient funds. Required margin is 95417.84 but available margin is 74251.80.",
        "data": null,
        "error_type": "MarginException"
    }"#;

    pub const SESSION: &str = r#"{
        "status": "success",
        "data": {"user_id": "XX0000", "user_name": "Trader", "access_token": "new_access_token", "public_token": "pub"}
    }"#;
}
