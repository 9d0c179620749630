//! Configuration types

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::common::errors::{CondorError, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Kite Connect credentials and endpoint
    #[serde(default)]
    pub kite: KiteConfig,
    /// Strike placement and risk limits
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// Trading session and polling
    #[serde(default)]
    pub session: SessionConfig,
    /// Order retry policy
    #[serde(default)]
    pub orders: RetryPolicy,
    /// Historical replay inputs
    #[serde(default)]
    pub backtest: BacktestConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

impl AppConfig {
    /// Reject settings the strategy cannot run with. Only called at startup.
    pub fn validate(&self) -> Result<()> {
        self.strategy.validate()?;
        self.session.validate()?;
        self.orders.validate()
    }
}

/// Kite Connect configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KiteConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    /// Only needed to exchange a request token for an access token
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    /// Base URL for the Kite Connect REST API
    #[serde(default = "default_kite_base_url")]
    pub base_url: String,
}

impl Default for KiteConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            access_token: None,
            base_url: default_kite_base_url(),
        }
    }
}

fn default_kite_base_url() -> String {
    "https://api.kite.trade".to_string()
}

/// Strike placement, sizing and exit thresholds
///
/// Prices and credits are in premium points; profit and loss limits are in
/// account currency as reported by the surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Underlying name used in option symbols (e.g. NIFTY)
    pub underlying: String,
    /// Instrument quoted for the reference price
    pub reference_instrument: String,
    /// Exchange the option legs trade on
    pub exchange: String,
    /// Broker product code (MIS = intraday)
    pub product: String,
    pub lots: u32,
    pub lot_size: u32,
    /// Valid strike increment
    pub strike_step: Decimal,
    /// Distance of the short strikes from the reference price
    pub strike_distance: Decimal,
    /// Distance of each long strike beyond its short strike
    pub protection_distance: Decimal,
    /// Distance of replacement short strikes from the reference price
    pub adjustment_distance: Decimal,
    pub target_profit: Decimal,
    /// Negative amount; reaching it closes everything
    pub max_loss: Decimal,
    /// P&L above which the trailing stop arms
    pub trail_trigger: Decimal,
    pub trail_step: Decimal,
    /// A spread is adjusted once its loss reaches this multiple of the entry credit
    pub adjustment_loss_multiplier: Decimal,
    /// Minimum credit a replacement spread must collect
    pub adjustment_min_credit: Decimal,
    /// When set, entry is skipped unless the condor collects at least this credit
    pub min_entry_credit: Option<Decimal>,
    /// When either bound is set, entry requires the legs' average implied
    /// volatility (percent) to be known and within the bounds
    pub min_entry_iv: Option<Decimal>,
    pub max_entry_iv: Option<Decimal>,
    /// Weekly expiry weekday
    pub expiry_weekday: Weekday,
}

impl StrategyConfig {
    /// Quantity per leg
    pub fn quantity(&self) -> u32 {
        self.lots.saturating_mul(self.lot_size)
    }

    /// Whether an implied-volatility entry gate is configured
    pub fn has_iv_gate(&self) -> bool {
        self.min_entry_iv.is_some() || self.max_entry_iv.is_some()
    }

    fn validate(&self) -> Result<()> {
        if self.strike_step <= Decimal::ZERO {
            return invalid("strategy.strike_step must be positive");
        }
        if self.strike_distance < self.strike_step {
            return invalid("strategy.strike_distance must be at least one strike step");
        }
        if self.protection_distance < self.strike_step {
            return invalid("strategy.protection_distance must be at least one strike step");
        }
        if self.adjustment_distance < self.strike_step {
            return invalid("strategy.adjustment_distance must be at least one strike step");
        }
        if self.lots == 0 || self.lot_size == 0 {
            return invalid("strategy.lots and strategy.lot_size must be positive");
        }
        if self.lots.checked_mul(self.lot_size).is_none() {
            return invalid("strategy.lots x strategy.lot_size does not fit an order quantity");
        }
        if let (Some(min), Some(max)) = (self.min_entry_iv, self.max_entry_iv) {
            if min > max {
                return invalid("strategy.min_entry_iv must not exceed strategy.max_entry_iv");
            }
        }
        if self.target_profit <= Decimal::ZERO {
            return invalid("strategy.target_profit must be positive");
        }
        if self.max_loss >= Decimal::ZERO {
            return invalid("strategy.max_loss must be negative");
        }
        if self.trail_trigger <= Decimal::ZERO || self.trail_step <= Decimal::ZERO {
            return invalid("strategy.trail_trigger and strategy.trail_step must be positive");
        }
        if self.adjustment_loss_multiplier <= Decimal::ZERO {
            return invalid("strategy.adjustment_loss_multiplier must be positive");
        }
        Ok(())
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            underlying: "NIFTY".to_string(),
            reference_instrument: "NSE:NIFTY 50".to_string(),
            exchange: "NFO".to_string(),
            product: "MIS".to_string(),
            lots: 5,
            lot_size: 50,
            strike_step: dec!(50),
            strike_distance: dec!(300),
            protection_distance: dec!(100),
            adjustment_distance: dec!(200),
            target_profit: dec!(1500),
            max_loss: dec!(-2000),
            trail_trigger: dec!(800),
            trail_step: dec!(200),
            adjustment_loss_multiplier: dec!(3),
            adjustment_min_credit: dec!(30),
            min_entry_credit: None,
            min_entry_iv: None,
            max_entry_iv: None,
            expiry_weekday: Weekday::Thu,
        }
    }
}

/// Trading session window and polling cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Local market open
    pub start: NaiveTime,
    /// Local time at or after which positions are closed
    pub end: NaiveTime,
    /// Offset of the exchange's local time from UTC (IST = 330)
    pub utc_offset_minutes: i32,
    pub trading_days: Vec<Weekday>,
    pub holidays: Vec<NaiveDate>,
    /// Days on which a new condor may be opened (empty = any trading day)
    pub entry_days: Vec<Weekday>,
    /// Earliest local time for entry
    pub entry_time: Option<NaiveTime>,
    pub poll_interval_seconds: u64,
}

impl SessionConfig {
    /// Exchange-local offset; falls back to UTC for an out-of-range value
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// Exchange-local wall-clock time for `now`
    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.with_timezone(&self.offset()).naive_local()
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        self.trading_days.contains(&date.weekday()) && !self.holidays.contains(&date)
    }

    /// Trading day and local time within `[start, end]`
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        let local = self.local_time(now);
        let time = local.time();
        self.is_trading_day(local.date()) && time >= self.start && time <= self.end
    }

    /// Local time has reached the closing cutoff (half-open: `end` itself counts)
    pub fn is_past_end(&self, now: DateTime<Utc>) -> bool {
        self.local_time(now).time() >= self.end
    }

    /// Open market, allowed entry weekday, and at or after the entry time
    pub fn entry_allowed_at(&self, now: DateTime<Utc>) -> bool {
        let local = self.local_time(now);
        self.is_open_at(now)
            && (self.entry_days.is_empty() || self.entry_days.contains(&local.date().weekday()))
            && self.entry_time.map_or(true, |t| local.time() >= t)
    }

    fn validate(&self) -> Result<()> {
        if self.start >= self.end {
            return invalid("session.start must be before session.end");
        }
        if self.utc_offset_minutes.abs() >= 24 * 60 {
            return invalid("session.utc_offset_minutes must be within one day");
        }
        if self.poll_interval_seconds == 0 {
            return invalid("session.poll_interval_seconds must be positive");
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(9, 15, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(15, 20, 0).unwrap_or_default(),
            utc_offset_minutes: 330,
            trading_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            holidays: Vec::new(),
            entry_days: Vec::new(),
            entry_time: None,
            poll_interval_seconds: 60,
        }
    }
}

/// Bounded retry with exponential backoff for order submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: u32,
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Retries without waiting; used by the replay driver
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            backoff_multiplier: 1,
            max_backoff_ms: 0,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return invalid("orders.max_attempts must be at least 1");
        }
        if self.backoff_multiplier == 0 {
            return invalid("orders.backoff_multiplier must be at least 1");
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1000,
            backoff_multiplier: 2,
            max_backoff_ms: 8000,
        }
    }
}

/// Historical replay inputs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// CSV or JSON candle file
    pub data_file: Option<String>,
    /// Inclusive window start (RFC 3339)
    pub start: Option<DateTime<Utc>>,
    /// Inclusive window end (RFC 3339)
    pub end: Option<DateTime<Utc>>,
    /// Mark simulated positions to market at each candle
    pub mark_to_market: bool,
    /// Optional per-option quotes (`timestamp,instrument,price[,iv]`);
    /// without it every instrument is priced off the candle
    pub option_quotes: Option<String>,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Append-only JSON-lines trade journal
    #[serde(default)]
    pub journal_path: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            request_timeout_seconds: default_request_timeout(),
            journal_path: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn invalid<T>(message: &str) -> Result<T> {
    Err(CondorError::InvalidConfiguration(message.to_string()))
}
