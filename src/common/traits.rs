//! Trait definitions for execution surfaces and time sources

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::errors::{CondorError, Result};
use super::types::{OrderId, OrderOutcome, OrderRequest, Position};

/// The capability set the strategy needs from a market (live broker or replay)
///
/// Both implementations honour the same contract so the identical control
/// loop can run against either. Implementations apply their own timeouts;
/// callers never see a hung call as anything other than an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionSurface: Send + Sync {
    /// Whether the market accepts orders right now
    async fn is_market_open(&self) -> bool;

    /// Last traded price of an exchange-qualified instrument
    ///
    /// Failure is always `PriceUnavailable`: the caller skips the decision
    /// this tick and tries again on the next one.
    async fn get_live_price(&self, instrument: &str) -> Result<Decimal>;

    /// Implied volatility of an option, in percent
    ///
    /// Surfaces without a volatility source report `PriceUnavailable`.
    async fn implied_volatility(&self, instrument: &str) -> Result<Decimal> {
        Err(CondorError::price_unavailable(
            instrument,
            format!("{} provides no implied volatility", self.surface_name()),
        ))
    }

    /// Submit one order
    ///
    /// Calling again with the same tagged request after a retryable failure
    /// must not open the position twice: an implementation either knows the
    /// earlier attempt never reached the market or confirms it did and
    /// returns its order id.
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderId>;

    /// Current positions keyed by exchange-qualified instrument
    async fn get_positions(&self) -> Result<BTreeMap<String, Position>>;

    /// Flatten every open position and clear the surface's position view
    ///
    /// The view is cleared even when some of the reverse orders fail.
    async fn close_all_positions(&self) -> Vec<OrderOutcome>;

    /// Sum of per-position P&L as currently known
    async fn calculate_pnl(&self) -> Result<Decimal>;

    /// Name used in logs
    fn surface_name(&self) -> &'static str;
}

/// The single time source the strategy consults
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock for tests and tooling
#[derive(Debug)]
pub struct FixedClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}
