//! Unified types shared by the strategy and both execution surfaces

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side that flattens a position opened with `self`
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// +1 for BUY, -1 for SELL
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Option type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionType::Call => write!(f, "CE"),
            OptionType::Put => write!(f, "PE"),
        }
    }
}

/// A fully-qualified option instrument, e.g. `NFO:NIFTY23OCT19300CE`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentSymbol {
    pub exchange: String,
    pub underlying: String,
    /// Expiry code, `%d%b` upper-cased (e.g. `26OCT`)
    pub expiry: String,
    pub strike: Decimal,
    pub option_type: OptionType,
}

impl InstrumentSymbol {
    /// Trading symbol without the exchange prefix
    pub fn tradingsymbol(&self) -> String {
        format!(
            "{}{}{}{}",
            self.underlying,
            self.expiry,
            self.strike.trunc().normalize(),
            self.option_type
        )
    }
}

impl std::fmt::Display for InstrumentSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.exchange, self.tradingsymbol())
    }
}

/// One order of a multi-leg strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    pub symbol: InstrumentSymbol,
    pub side: Side,
    pub quantity: u32,
}

impl Leg {
    pub fn new(symbol: InstrumentSymbol, side: Side, quantity: u32) -> Self {
        Self {
            symbol,
            side,
            quantity,
        }
    }

    /// Request that opens this leg
    pub fn open_request(&self) -> OrderRequest {
        OrderRequest::market(self.symbol.to_string(), self.side, self.quantity)
    }

    /// Request that flattens this leg
    pub fn close_request(&self) -> OrderRequest {
        OrderRequest::market(self.symbol.to_string(), self.side.opposite(), self.quantity)
    }
}

/// Open quantity in one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Exchange-qualified instrument, e.g. `NFO:NIFTY23OCT18700PE`
    pub instrument: String,
    /// Positive = long, negative = short
    pub quantity: i64,
    /// Mark-to-market P&L as reported by the surface
    pub pnl: Decimal,
}

impl Position {
    pub fn new(instrument: impl Into<String>, quantity: i64, pnl: Decimal) -> Self {
        Self {
            instrument: instrument.into(),
            quantity,
            pnl,
        }
    }

    pub fn is_open(&self) -> bool {
        self.quantity != 0
    }
}

/// An order to submit to an execution surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Exchange-qualified instrument
    pub instrument: String,
    pub side: Side,
    pub quantity: u32,
    /// `None` = market order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    /// Identifies one logical order across retries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl OrderRequest {
    pub fn market(instrument: impl Into<String>, side: Side, quantity: u32) -> Self {
        Self {
            instrument: instrument.into(),
            side,
            quantity,
            limit_price: None,
            tag: None,
        }
    }

    pub fn with_limit(mut self, price: Decimal) -> Self {
        self.limit_price = Some(price);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Opaque broker/simulator order identifier
pub type OrderId = String;

/// Result of one close-out order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub request: OrderRequest,
    /// Order id on success, failure reason otherwise
    pub result: std::result::Result<OrderId, String>,
}

impl OrderOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// One OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Decimal,
}
