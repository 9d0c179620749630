//! The Iron Condor state machine
//!
//! One controller drives one activation: `enter` opens the four legs, then
//! `tick` is called once per polling interval (live) or candle (replay) until
//! it returns `Stop`. The controller never sleeps and never looks at a wall
//! clock of its own; both are owned by whoever drives it.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::common::errors::Result;
use crate::common::traits::{Clock, ExecutionSurface};
use crate::common::types::{Leg, OrderOutcome, OrderRequest, Side};
use crate::config::types::{SessionConfig, StrategyConfig};
use crate::strategy::gateway::OrderGateway;
use crate::strategy::journal::{JournalEvent, JournalRecord, TradeJournal};
use crate::strategy::ledger::PositionLedger;
use crate::strategy::risk::{evaluate_pnl, PnlVerdict, RiskLimits};
use crate::strategy::strikes::{construct_symbol, expiry_code, next_expiry, StrikeSelector};
use crate::strategy::types::{
    EntryOutcome, SkipReason, SpreadPosition, SpreadSide, StopReason, StrategyContext,
    StrategyState, TickOutcome,
};

pub struct StrategyController {
    surface: Arc<dyn ExecutionSurface>,
    clock: Arc<dyn Clock>,
    gateway: OrderGateway,
    selector: StrikeSelector,
    strategy: StrategyConfig,
    session: SessionConfig,
    limits: RiskLimits,
    ledger: PositionLedger,
    journal: TradeJournal,
    state: StrategyState,
    context: Option<StrategyContext>,
    stop_reason: Option<StopReason>,
    last_pnl: Decimal,
}

impl StrategyController {
    pub fn new(
        surface: Arc<dyn ExecutionSurface>,
        clock: Arc<dyn Clock>,
        strategy: StrategyConfig,
        session: SessionConfig,
        gateway: OrderGateway,
    ) -> Result<Self> {
        let selector = StrikeSelector::new(strategy.strike_step)?;
        let limits = RiskLimits::from(&strategy);
        Ok(Self {
            surface,
            clock,
            gateway,
            selector,
            strategy,
            session,
            limits,
            ledger: PositionLedger::new(),
            journal: TradeJournal::new(),
            state: StrategyState::Idle,
            context: None,
            stop_reason: None,
            last_pnl: Decimal::ZERO,
        })
    }

    /// Replace the in-memory journal, e.g. with a file-backed one
    pub fn with_journal(mut self, journal: TradeJournal) -> Self {
        self.journal = journal;
        self
    }

    pub fn state(&self) -> StrategyState {
        self.state
    }

    pub fn context(&self) -> Option<&StrategyContext> {
        self.context.as_ref()
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn journal(&self) -> &TradeJournal {
        &self.journal
    }

    pub fn into_journal(self) -> TradeJournal {
        self.journal
    }

    /// Reason recorded when the activation terminated
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    /// P&L seen on the most recent successful reading
    pub fn last_pnl(&self) -> Decimal {
        self.last_pnl
    }

    /// Open the condor around the current reference price
    pub async fn enter(&mut self) -> EntryOutcome {
        if self.state != StrategyState::Idle {
            return EntryOutcome::Skipped(SkipReason::AlreadyActivated);
        }
        if !self.surface.is_market_open().await {
            return self.skip_entry(SkipReason::MarketClosed);
        }

        let reference = match self
            .surface
            .get_live_price(&self.strategy.reference_instrument)
            .await
        {
            Ok(price) => price,
            Err(e) => return self.skip_entry(SkipReason::PriceUnavailable(e.to_string())),
        };

        let now = self.clock.now();
        let expiry = expiry_code(next_expiry(
            self.session.local_time(now).date(),
            self.strategy.expiry_weekday,
        ));
        let strikes = self.selector.select_strikes(
            reference,
            self.strategy.strike_distance,
            self.strategy.protection_distance,
        );
        info!(
            reference = %reference,
            expiry = %expiry,
            short_put = %strikes.short_put,
            long_put = %strikes.long_put,
            short_call = %strikes.short_call,
            long_call = %strikes.long_call,
            "Selected condor strikes"
        );

        let mut put_spread =
            self.build_spread(SpreadSide::Put, &expiry, strikes.short_put, strikes.long_put);
        let mut call_spread =
            self.build_spread(SpreadSide::Call, &expiry, strikes.short_call, strikes.long_call);
        put_spread.entry_credit = self.quote_credit(&put_spread).await;
        call_spread.entry_credit = self.quote_credit(&call_spread).await;
        let net_credit = put_spread
            .entry_credit
            .zip(call_spread.entry_credit)
            .map(|(put, call)| put + call);

        if let Some(required) = self.strategy.min_entry_credit {
            if net_credit.map_or(true, |credit| credit < required) {
                return self.skip_entry(SkipReason::InsufficientCredit {
                    credit: net_credit,
                    required,
                });
            }
        }

        if self.strategy.has_iv_gate() {
            let iv = self.average_iv(&put_spread, &call_spread).await;
            let within = iv.is_some_and(|iv| {
                self.strategy.min_entry_iv.map_or(true, |min| iv >= min)
                    && self.strategy.max_entry_iv.map_or(true, |max| iv <= max)
            });
            if !within {
                return self.skip_entry(SkipReason::VolatilityOutOfRange {
                    iv,
                    min: self.strategy.min_entry_iv,
                    max: self.strategy.max_entry_iv,
                });
            }
        }

        self.state = StrategyState::Entering;
        info!(
            surface = self.surface.surface_name(),
            net_credit = ?net_credit,
            quantity = self.strategy.quantity(),
            "Entering iron condor"
        );

        let mut legs_placed = 0;
        let mut legs_failed = 0;
        for leg in put_spread.legs().into_iter().chain(call_spread.legs()) {
            if self.submit(leg.open_request()).await {
                legs_placed += 1;
            } else {
                legs_failed += 1;
            }
        }
        if legs_failed > 0 {
            warn!(legs_placed, legs_failed, "Condor entered with missing legs");
        }

        self.context = Some(StrategyContext {
            put_spread: Some(put_spread),
            call_spread: Some(call_spread),
            entry_time: now,
            trail_base: Decimal::ZERO,
            tick_count: 0,
            net_credit,
            adjustments: 0,
        });
        self.state = StrategyState::Monitoring;

        EntryOutcome::Entered {
            legs_placed,
            legs_failed,
        }
    }

    /// One monitoring step
    pub async fn tick(&mut self) -> TickOutcome {
        match self.state {
            StrategyState::Terminated => {
                return TickOutcome::Stop(self.stop_reason.unwrap_or(StopReason::NotEntered));
            }
            StrategyState::Idle | StrategyState::Entering => {
                return TickOutcome::Stop(StopReason::NotEntered);
            }
            _ => {}
        }

        let tick = match self.context.as_mut() {
            Some(ctx) => {
                ctx.tick_count += 1;
                ctx.tick_count
            }
            None => return TickOutcome::Stop(StopReason::NotEntered),
        };

        match self.surface.get_positions().await {
            Ok(positions) => self.ledger.rebuild(positions.into_values()),
            Err(e) => warn!(tick, error = %e, "Failed to refresh positions, keeping previous view"),
        }

        match self.surface.calculate_pnl().await {
            Ok(pnl) => {
                self.last_pnl = pnl;
                let trail_base = self
                    .context
                    .as_ref()
                    .map_or(Decimal::ZERO, |ctx| ctx.trail_base);
                debug!(tick, pnl = %pnl, trail_base = %trail_base, "Monitoring");

                match evaluate_pnl(pnl, trail_base, &self.limits) {
                    PnlVerdict::Exit(reason) => return self.close_and_terminate(reason).await,
                    PnlVerdict::Hold { trail_base } => {
                        if let Some(ctx) = self.context.as_mut() {
                            ctx.trail_base = trail_base;
                        }
                    }
                }
            }
            Err(e) => warn!(tick, error = %e, "P&L unavailable, skipping exit rules this tick"),
        }

        let now = self.clock.now();
        if self.session.is_past_end(now) {
            info!(tick, local_time = %self.session.local_time(now), "Session ending");
            return self.close_and_terminate(StopReason::SessionEnd).await;
        }

        self.check_adjustment().await;

        TickOutcome::Continue
    }

    /// Close everything and terminate, regardless of the rules
    pub async fn shutdown(&mut self, reason: StopReason) -> TickOutcome {
        match self.state {
            StrategyState::Terminated => {
                TickOutcome::Stop(self.stop_reason.unwrap_or(reason))
            }
            StrategyState::Idle => {
                info!(reason = %reason, "Shutting down before entry");
                self.terminate(reason);
                TickOutcome::Stop(reason)
            }
            _ => self.close_and_terminate(reason).await,
        }
    }

    async fn close_and_terminate(&mut self, reason: StopReason) -> TickOutcome {
        self.state = StrategyState::Closing;
        info!(reason = %reason, pnl = %self.last_pnl, "Closing all positions");

        let outcomes = self.surface.close_all_positions().await;
        for outcome in &outcomes {
            self.journal_outcome(outcome);
        }
        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        if failed > 0 {
            warn!(failed, "Some close-out orders failed");
        }
        self.ledger.clear();

        self.terminate(reason);
        TickOutcome::Stop(reason)
    }

    fn terminate(&mut self, reason: StopReason) {
        self.state = StrategyState::Terminated;
        self.stop_reason = Some(reason);
        self.journal.record(JournalRecord::note(
            self.clock.now(),
            JournalEvent::Terminated,
            reason.to_string(),
            self.last_pnl,
        ));
        info!(reason = %reason, pnl = %self.last_pnl, "Strategy terminated");
    }

    fn skip_entry(&mut self, reason: SkipReason) -> EntryOutcome {
        warn!(reason = %reason, "Entry skipped");
        self.journal.record(JournalRecord::note(
            self.clock.now(),
            JournalEvent::EntrySkipped,
            reason.to_string(),
            self.last_pnl,
        ));
        EntryOutcome::Skipped(reason)
    }

    /// Check each live spread (put first) and adjust at most one
    async fn check_adjustment(&mut self) {
        let net_credit = match self.context.as_ref().and_then(|ctx| ctx.net_credit) {
            Some(credit) if credit > Decimal::ZERO => credit,
            _ => return,
        };
        let threshold = self.strategy.adjustment_loss_multiplier * net_credit;

        for side in [SpreadSide::Put, SpreadSide::Call] {
            let spread = match self.context.as_ref().and_then(|ctx| ctx.spread(side)) {
                Some(spread) => spread.clone(),
                None => continue,
            };
            let Some(entry_credit) = spread.entry_credit else {
                continue;
            };
            let Some(value) = self.quote_credit(&spread).await else {
                continue;
            };

            let loss = value - entry_credit;
            if loss >= threshold {
                info!(
                    side = %side,
                    value = %value,
                    entry_credit = %entry_credit,
                    loss = %loss,
                    threshold = %threshold,
                    "Spread breached, adjusting"
                );
                self.adjust(spread).await;
                return;
            }
        }
    }

    /// Exit one spread and, if the credit is worth it, reopen it further out
    async fn adjust(&mut self, spread: SpreadPosition) {
        self.state = StrategyState::Adjusting;
        let side = spread.side;

        for leg in spread.legs() {
            self.submit(leg.close_request()).await;
        }

        let replacement = match self
            .surface
            .get_live_price(&self.strategy.reference_instrument)
            .await
        {
            Ok(reference) => {
                let strikes = self.selector.adjustment_spread(
                    reference,
                    side,
                    self.strategy.adjustment_distance,
                    self.strategy.protection_distance,
                );
                let mut candidate =
                    self.build_spread(side, &spread.short.symbol.expiry, strikes.short, strikes.long);
                match self.quote_credit(&candidate).await {
                    Some(credit) if credit >= self.strategy.adjustment_min_credit => {
                        for leg in candidate.legs() {
                            self.submit(leg.open_request()).await;
                        }
                        candidate.entry_credit = Some(credit);
                        Some(candidate)
                    }
                    credit => {
                        info!(
                            side = %side,
                            credit = ?credit,
                            min_credit = %self.strategy.adjustment_min_credit,
                            "Replacement credit too low, leaving side flat"
                        );
                        None
                    }
                }
            }
            Err(e) => {
                warn!(side = %side, error = %e, "Reference price unavailable, leaving side flat");
                None
            }
        };

        let note = match &replacement {
            Some(new) => format!(
                "{} spread {}/{} replaced with {}/{}",
                side,
                spread.short.symbol.strike,
                spread.long.symbol.strike,
                new.short.symbol.strike,
                new.long.symbol.strike
            ),
            None => format!(
                "{} spread {}/{} closed, side left flat",
                side, spread.short.symbol.strike, spread.long.symbol.strike
            ),
        };
        self.journal.record(JournalRecord::note(
            self.clock.now(),
            JournalEvent::Adjustment,
            note,
            self.last_pnl,
        ));

        if let Some(ctx) = self.context.as_mut() {
            ctx.set_spread(side, replacement);
            ctx.adjustments += 1;
        }
        self.state = StrategyState::Monitoring;
    }

    fn build_spread(
        &self,
        side: SpreadSide,
        expiry: &str,
        short_strike: Decimal,
        long_strike: Decimal,
    ) -> SpreadPosition {
        let quantity = self.strategy.quantity();
        let symbol = |strike| {
            construct_symbol(
                &self.strategy.exchange,
                &self.strategy.underlying,
                expiry,
                strike,
                side.option_type(),
            )
        };
        SpreadPosition {
            side,
            short: Leg::new(symbol(short_strike), Side::Sell, quantity),
            long: Leg::new(symbol(long_strike), Side::Buy, quantity),
            entry_credit: None,
        }
    }

    /// Premium of the short leg minus premium of the long leg, per unit
    async fn quote_credit(&self, spread: &SpreadPosition) -> Option<Decimal> {
        let short = self
            .surface
            .get_live_price(&spread.short.symbol.to_string())
            .await;
        let long = self
            .surface
            .get_live_price(&spread.long.symbol.to_string())
            .await;
        match (short, long) {
            (Ok(short), Ok(long)) => Some(short - long),
            (Err(e), _) | (_, Err(e)) => {
                debug!(side = %spread.side, error = %e, "Spread premium not quotable");
                None
            }
        }
    }

    /// Mean implied volatility over the four legs; `None` if any is missing
    async fn average_iv(&self, put: &SpreadPosition, call: &SpreadPosition) -> Option<Decimal> {
        let mut total = Decimal::ZERO;
        let mut count = 0u32;
        for leg in put.legs().into_iter().chain(call.legs()) {
            let instrument = leg.symbol.to_string();
            match self.surface.implied_volatility(&instrument).await {
                Ok(iv) => {
                    total += iv;
                    count += 1;
                }
                Err(e) => {
                    debug!(instrument = %instrument, error = %e, "Implied volatility not available");
                    return None;
                }
            }
        }
        (count > 0).then(|| total / Decimal::from(count))
    }

    /// Submit through the gateway; journal and track the fill
    async fn submit(&mut self, request: OrderRequest) -> bool {
        let result = self.gateway.submit(self.surface.as_ref(), &request).await;
        let now = self.clock.now();
        match result {
            Ok(order_id) => {
                self.ledger
                    .apply_fill(&request.instrument, request.side, request.quantity);
                self.journal.record(JournalRecord::order(
                    now,
                    &request,
                    Ok(order_id.as_str()),
                    self.last_pnl,
                ));
                true
            }
            Err(e) => {
                warn!(instrument = %request.instrument, side = %request.side, error = %e, "Leg not placed");
                self.journal.record(JournalRecord::order(
                    now,
                    &request,
                    Err(e.to_string()),
                    self.last_pnl,
                ));
                false
            }
        }
    }

    fn journal_outcome(&mut self, outcome: &OrderOutcome) {
        let result = outcome.result.as_deref().map_err(|e| e.to_string());
        self.journal.record(JournalRecord::order(
            self.clock.now(),
            &outcome.request,
            result,
            self.last_pnl,
        ));
    }
}
