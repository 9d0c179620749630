use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::quotes::OptionQuotes;
use crate::common::errors::{CondorError, Result};
use crate::common::traits::{Clock, ExecutionSurface};
use crate::common::types::{Candle, OrderId, OrderOutcome, OrderRequest, Position, Side};
use crate::strategy::ledger::PositionLedger;

/// One simulated execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimFill {
    pub order_id: OrderId,
    pub timestamp: DateTime<Utc>,
    pub instrument: String,
    pub side: Side,
    pub quantity: u32,
    pub price: Decimal,
}

#[derive(Debug, Default)]
struct SimState {
    current: Option<Candle>,
    quotes: OptionQuotes,
    ledger: PositionLedger,
    /// Cumulative premium received (+) or paid (-) per instrument; survives close-out
    cash: BTreeMap<String, Decimal>,
    fills: Vec<SimFill>,
}

impl SimState {
    /// Quote in force for `instrument`: its own series if it has one,
    /// otherwise the candle close
    fn mark(&self, instrument: &str) -> Option<Decimal> {
        let candle = self.current.as_ref()?;
        if self.quotes.covers(instrument) {
            self.quotes
                .latest(instrument, candle.timestamp)
                .map(|q| q.price)
        } else {
            Some(candle.close)
        }
    }

    fn fill(&mut self, request: &OrderRequest) -> Result<OrderId> {
        let candle = self.current.as_ref().ok_or_else(|| {
            CondorError::SurfaceUnreachable("no current candle to fill against".to_string())
        })?;
        let timestamp = candle.timestamp;
        let price = if self.quotes.covers(&request.instrument) {
            self.quotes
                .latest(&request.instrument, timestamp)
                .map(|q| q.price)
                .ok_or_else(|| {
                    CondorError::price_unavailable(&request.instrument, "no quote yet")
                })?
        } else {
            candle.open
        };
        let order_id = format!("SIM-{}", self.fills.len() + 1);

        let flow = price * Decimal::from(request.quantity);
        let cash = self.cash.entry(request.instrument.clone()).or_default();
        match request.side {
            Side::Buy => *cash -= flow,
            Side::Sell => *cash += flow,
        }
        self.ledger
            .apply_fill(&request.instrument, request.side, request.quantity);
        self.fills.push(SimFill {
            order_id: order_id.clone(),
            timestamp,
            instrument: request.instrument.clone(),
            side: request.side,
            quantity: request.quantity,
            price,
        });
        debug!(order_id = %order_id, instrument = %request.instrument, side = %request.side, price = %price, "Simulated fill");
        Ok(order_id)
    }

    /// Cash flow of the instrument plus its open quantity at the current mark
    fn marked_pnl(&self, instrument: &str) -> Decimal {
        let cash = self.cash.get(instrument).copied().unwrap_or_default();
        let quantity = self.ledger.quantity(instrument);
        if quantity == 0 {
            return cash;
        }
        cash + Decimal::from(quantity) * self.mark(instrument).unwrap_or_default()
    }
}

/// Candle-replay [`ExecutionSurface`] that is also the replay's [`Clock`]
///
/// Instruments with an option quote series are quoted and filled at the
/// latest quote in force; everything else is quoted at the current candle's
/// close and fills at its open. Nothing blocks: the mutex is only held inside
/// synchronous sections.
#[derive(Debug, Default)]
pub struct SimulatedSurface {
    state: Mutex<SimState>,
    mark_to_market: bool,
}

impl SimulatedSurface {
    pub fn new(mark_to_market: bool) -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            mark_to_market,
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Price options from their own quote series
    pub fn with_option_quotes(self, quotes: OptionQuotes) -> Self {
        self.state().quotes = quotes;
        self
    }

    /// Make `candle` the current one
    pub fn advance_to(&self, candle: Candle) {
        self.state().current = Some(candle);
    }

    pub fn current_candle(&self) -> Option<Candle> {
        self.state().current.clone()
    }

    /// Every fill so far, in execution order
    pub fn fills(&self) -> Vec<SimFill> {
        self.state().fills.clone()
    }

    fn pnl(&self, state: &SimState) -> Decimal {
        if !self.mark_to_market {
            return Decimal::ZERO;
        }
        let cash: Decimal = state.cash.values().copied().sum();
        let marked: Decimal = state
            .ledger
            .open_positions()
            .map(|p| Decimal::from(p.quantity) * state.mark(&p.instrument).unwrap_or_default())
            .sum();
        cash + marked
    }
}

impl Clock for SimulatedSurface {
    /// Time of the current candle; the epoch before the first one
    fn now(&self) -> DateTime<Utc> {
        self.state()
            .current
            .as_ref()
            .map(|c| c.timestamp)
            .unwrap_or_default()
    }
}

#[async_trait]
impl ExecutionSurface for SimulatedSurface {
    async fn is_market_open(&self) -> bool {
        true
    }

    async fn get_live_price(&self, instrument: &str) -> Result<Decimal> {
        self.state()
            .mark(instrument)
            .ok_or_else(|| CondorError::price_unavailable(instrument, "no quote in force"))
    }

    async fn implied_volatility(&self, instrument: &str) -> Result<Decimal> {
        let state = self.state();
        state
            .current
            .as_ref()
            .and_then(|c| state.quotes.latest(instrument, c.timestamp))
            .and_then(|q| q.iv)
            .ok_or_else(|| CondorError::price_unavailable(instrument, "no implied volatility in force"))
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderId> {
        self.state().fill(request)
    }

    async fn get_positions(&self) -> Result<BTreeMap<String, Position>> {
        let state = self.state();
        Ok(state
            .ledger
            .snapshot()
            .into_iter()
            .map(|(instrument, mut position)| {
                position.pnl = if self.mark_to_market {
                    state.marked_pnl(&instrument)
                } else {
                    Decimal::ZERO
                };
                (instrument, position)
            })
            .collect())
    }

    async fn close_all_positions(&self) -> Vec<OrderOutcome> {
        let mut state = self.state();
        let requests = state.ledger.reverse_orders();
        let outcomes: Vec<OrderOutcome> = requests
            .into_iter()
            .map(|request| {
                let result = state.fill(&request).map_err(|e| e.to_string());
                OrderOutcome { request, result }
            })
            .collect();
        state.ledger.clear();
        info!(orders = outcomes.len(), "Simulated close of all positions");
        outcomes
    }

    async fn calculate_pnl(&self) -> Result<Decimal> {
        let state = self.state();
        Ok(self.pnl(&state))
    }

    fn surface_name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::quotes::OptionQuote;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn candle(minute: u32, open: Decimal, close: Decimal) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2023, 10, 23, 4, minute, 0).unwrap(),
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: Decimal::ZERO,
        }
    }

    #[tokio::test]
    async fn test_no_candle_means_no_price_and_no_fill() {
        let surface = SimulatedSurface::new(false);
        assert!(matches!(
            surface.get_live_price("NSE:NIFTY 50").await,
            Err(CondorError::PriceUnavailable { .. })
        ));
        let request = OrderRequest::market("NFO:X", Side::Sell, 10);
        assert!(surface.place_order(&request).await.is_err());
        assert_eq!(surface.now(), DateTime::<Utc>::default());
    }

    #[tokio::test]
    async fn test_fills_at_open_and_quotes_close() {
        let surface = SimulatedSurface::new(false);
        surface.advance_to(candle(0, dec!(100), dec!(104)));

        assert_eq!(surface.get_live_price("anything").await.unwrap(), dec!(104));
        let id = surface
            .place_order(&OrderRequest::market("NFO:X", Side::Sell, 10))
            .await
            .unwrap();
        assert_eq!(id, "SIM-1");
        assert_eq!(surface.fills()[0].price, dec!(100));
        assert_eq!(surface.now(), candle(0, dec!(0), dec!(0)).timestamp);

        let positions = surface.get_positions().await.unwrap();
        assert_eq!(positions["NFO:X"].quantity, -10);
        assert_eq!(surface.calculate_pnl().await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_close_all_twice() {
        let surface = SimulatedSurface::new(false);
        surface.advance_to(candle(0, dec!(100), dec!(100)));
        surface
            .place_order(&OrderRequest::market("NFO:A", Side::Sell, 10))
            .await
            .unwrap();
        surface
            .place_order(&OrderRequest::market("NFO:B", Side::Buy, 10))
            .await
            .unwrap();

        let first = surface.close_all_positions().await;
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(OrderOutcome::is_ok));
        assert_eq!(first[0].request, OrderRequest::market("NFO:A", Side::Buy, 10));
        assert!(surface.get_positions().await.unwrap().is_empty());

        let second = surface.close_all_positions().await;
        assert!(second.is_empty());
        assert!(surface.get_positions().await.unwrap().is_empty());
        assert_eq!(surface.fills().len(), 4);
    }

    #[tokio::test]
    async fn test_option_quotes_price_fills_and_marks() {
        let mut quotes = OptionQuotes::new();
        let t0 = candle(0, dec!(19000), dec!(19000)).timestamp;
        let t2 = candle(2, dec!(0), dec!(0)).timestamp;
        quotes.insert("NFO:PE", t0, OptionQuote { price: dec!(40), iv: Some(dec!(18)) });
        quotes.insert("NFO:PE", t2, OptionQuote { price: dec!(55), iv: Some(dec!(21)) });
        let surface = SimulatedSurface::new(true).with_option_quotes(quotes);

        surface.advance_to(candle(0, dec!(19000), dec!(19010)));
        assert_eq!(surface.get_live_price("NSE:NIFTY 50").await.unwrap(), dec!(19010));
        assert_eq!(surface.get_live_price("NFO:PE").await.unwrap(), dec!(40));
        assert_eq!(surface.implied_volatility("NFO:PE").await.unwrap(), dec!(18));
        assert!(surface.implied_volatility("NSE:NIFTY 50").await.is_err());
        surface
            .place_order(&OrderRequest::market("NFO:PE", Side::Sell, 50))
            .await
            .unwrap();
        assert_eq!(surface.fills()[0].price, dec!(40));

        // Quote from t0 stays in force until the next one
        surface.advance_to(candle(1, dec!(18950), dec!(18900)));
        assert_eq!(surface.calculate_pnl().await.unwrap(), Decimal::ZERO);

        surface.advance_to(candle(2, dec!(18900), dec!(18850)));
        assert_eq!(surface.calculate_pnl().await.unwrap(), dec!(-750));
        assert_eq!(surface.get_positions().await.unwrap()["NFO:PE"].pnl, dec!(-750));
    }

    #[tokio::test]
    async fn test_quoted_option_without_quote_yet_is_unpriced() {
        let mut quotes = OptionQuotes::new();
        quotes.insert(
            "NFO:PE",
            candle(5, dec!(0), dec!(0)).timestamp,
            OptionQuote { price: dec!(40), iv: None },
        );
        let surface = SimulatedSurface::new(false).with_option_quotes(quotes);
        surface.advance_to(candle(0, dec!(19000), dec!(19000)));

        assert!(matches!(
            surface.get_live_price("NFO:PE").await,
            Err(CondorError::PriceUnavailable { .. })
        ));
        assert!(surface
            .place_order(&OrderRequest::market("NFO:PE", Side::Sell, 50))
            .await
            .is_err());
        assert!(surface.fills().is_empty());
    }

    #[tokio::test]
    async fn test_mark_to_market_pnl() {
        let surface = SimulatedSurface::new(true);
        surface.advance_to(candle(0, dec!(100), dec!(100)));
        surface
            .place_order(&OrderRequest::market("NFO:A", Side::Sell, 10))
            .await
            .unwrap();
        // Sold 10 at 100, now marked at 90
        surface.advance_to(candle(1, dec!(95), dec!(90)));
        assert_eq!(surface.calculate_pnl().await.unwrap(), dec!(100));
        let positions = surface.get_positions().await.unwrap();
        assert_eq!(positions["NFO:A"].pnl, dec!(100));

        // Bought back at the next open; realized P&L survives the close-out
        surface.advance_to(candle(2, dec!(92), dec!(93)));
        surface.close_all_positions().await;
        assert_eq!(surface.calculate_pnl().await.unwrap(), dec!(80));
    }
}
