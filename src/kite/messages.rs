//! Kite Connect v3 request and response types

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Every Kite response is wrapped in this envelope
#[derive(Debug, Clone, Deserialize)]
pub struct KiteEnvelope<T> {
    /// `success` or `error`
    pub status: String,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    /// e.g. `TokenException`, `InputException`, `OrderException`
    #[serde(default)]
    pub error_type: Option<String>,
}

/// Broker error classes that map onto our error variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KiteErrorKind {
    /// Session expired or invalid credentials
    Token,
    /// Order refused: bad input, margin, or order-state errors
    Rejected,
    /// Anything else (network, exchange, general)
    Other,
}

impl KiteErrorKind {
    pub fn from_error_type(error_type: Option<&str>) -> Self {
        match error_type {
            Some("TokenException") | Some("PermissionException") => KiteErrorKind::Token,
            Some("InputException") | Some("OrderException") | Some("MarginException") => {
                KiteErrorKind::Rejected
            }
            _ => KiteErrorKind::Other,
        }
    }
}

/// One entry of `GET /quote/ltp`
#[derive(Debug, Clone, Deserialize)]
pub struct LtpQuote {
    #[serde(default)]
    pub instrument_token: Option<u64>,
    pub last_price: Decimal,
}

/// `GET /quote/ltp` data, keyed by `EXCHANGE:TRADINGSYMBOL`
pub type LtpResponse = BTreeMap<String, LtpQuote>;

/// `POST /orders/regular` data
#[derive(Debug, Clone, Deserialize)]
pub struct OrderPlacedResponse {
    pub order_id: String,
}

/// Form body for `POST /orders/regular`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderParams {
    pub tradingsymbol: String,
    pub exchange: String,
    /// `BUY` or `SELL`
    pub transaction_type: String,
    /// `MARKET` or `LIMIT`
    pub order_type: String,
    pub quantity: u32,
    /// `MIS`, `NRML`, ...
    pub product: String,
    pub validity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// Alphanumeric, at most 20 characters; used to find the order again
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// One row of `GET /orders`
#[derive(Debug, Clone, Deserialize)]
pub struct KiteOrder {
    pub order_id: String,
    /// `OPEN`, `COMPLETE`, `REJECTED`, `CANCELLED`, ...
    pub status: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub tradingsymbol: Option<String>,
}

impl KiteOrder {
    /// The order never reached the exchange book or was refused there
    pub fn is_dead(&self) -> bool {
        matches!(self.status.as_str(), "REJECTED" | "CANCELLED")
    }
}

/// One row of `GET /portfolio/positions`
#[derive(Debug, Clone, Deserialize)]
pub struct KitePosition {
    pub tradingsymbol: String,
    pub exchange: String,
    #[serde(default)]
    pub product: Option<String>,
    pub quantity: i64,
    #[serde(default)]
    pub average_price: Option<Decimal>,
    #[serde(default)]
    pub last_price: Option<Decimal>,
    #[serde(default)]
    pub pnl: Decimal,
}

impl KitePosition {
    /// `EXCHANGE:TRADINGSYMBOL`
    pub fn instrument(&self) -> String {
        format!("{}:{}", self.exchange, self.tradingsymbol)
    }
}

/// `GET /portfolio/positions` data
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PositionsResponse {
    #[serde(default)]
    pub net: Vec<KitePosition>,
    #[serde(default)]
    pub day: Vec<KitePosition>,
}

/// `POST /session/token` data
#[derive(Debug, Clone, Deserialize)]
pub struct SessionResponse {
    pub user_id: String,
    pub access_token: String,
    #[serde(default)]
    pub public_token: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub login_time: Option<String>,
}
