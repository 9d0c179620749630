use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::candles::ensure_increasing;
use super::quotes::OptionQuotes;
use super::surface::{SimFill, SimulatedSurface};
use crate::common::errors::{CondorError, Result};
use crate::common::traits::ExecutionSurface;
use crate::common::types::{Candle, Position};
use crate::config::types::{AppConfig, RetryPolicy, SessionConfig, StrategyConfig};
use crate::strategy::controller::StrategyController;
use crate::strategy::gateway::OrderGateway;
use crate::strategy::journal::{to_jsonl, JournalRecord};
use crate::strategy::types::{EntryOutcome, StopReason, TickOutcome};

/// Everything a replay produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Candles in the replay window
    pub candles: usize,
    /// Candles actually ticked
    pub ticks: usize,
    pub entry: EntryOutcome,
    /// `None` when the data ran out before any exit rule fired
    pub outcome: Option<StopReason>,
    pub fills: Vec<SimFill>,
    pub journal: Vec<JournalRecord>,
    pub final_pnl: Decimal,
    /// Positions still open when the data ran out
    pub open_positions: BTreeMap<String, Position>,
}

impl ReplayReport {
    /// Journal as JSON lines
    pub fn journal_jsonl(&self) -> String {
        to_jsonl(&self.journal)
    }
}

/// Feeds historical candles through the live control loop
#[derive(Debug, Clone)]
pub struct ReplayDriver {
    strategy: StrategyConfig,
    session: SessionConfig,
    mark_to_market: bool,
    max_attempts: u32,
    quotes: OptionQuotes,
}

impl ReplayDriver {
    pub fn new(strategy: StrategyConfig, session: SessionConfig) -> Self {
        Self {
            strategy,
            session,
            mark_to_market: false,
            max_attempts: 1,
            quotes: OptionQuotes::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.strategy.clone(), config.session.clone())
            .with_mark_to_market(config.backtest.mark_to_market)
            .with_max_attempts(config.orders.max_attempts)
    }

    pub fn with_mark_to_market(mut self, enabled: bool) -> Self {
        self.mark_to_market = enabled;
        self
    }

    /// Price option legs from their own quote series instead of the candle
    pub fn with_option_quotes(mut self, quotes: OptionQuotes) -> Self {
        self.quotes = quotes;
        self
    }

    /// Attempts per order; retries never wait
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Enter on the first candle, then tick once per candle until a stop
    pub async fn run(&self, candles: &[Candle]) -> Result<ReplayReport> {
        let Some(first) = candles.first() else {
            return Err(CondorError::DataLoad("no candles in the replay window".to_string()));
        };
        ensure_increasing(candles)?;

        let surface = Arc::new(
            SimulatedSurface::new(self.mark_to_market).with_option_quotes(self.quotes.clone()),
        );
        surface.advance_to(first.clone());

        let mut controller = StrategyController::new(
            surface.clone(),
            surface.clone(),
            self.strategy.clone(),
            self.session.clone(),
            OrderGateway::new(RetryPolicy::immediate(self.max_attempts)),
        )?;

        let entry = controller.enter().await;
        info!(entry = ?entry, first_candle = %first.timestamp, "Replay entry");

        let mut ticks = 0;
        let mut outcome = None;
        if entry.is_entered() {
            for candle in candles {
                surface.advance_to(candle.clone());
                ticks += 1;
                if let TickOutcome::Stop(reason) = controller.tick().await {
                    info!(reason = %reason, at = %candle.timestamp, "Replay stopped");
                    outcome = Some(reason);
                    break;
                }
            }
        }

        let final_pnl = surface.calculate_pnl().await?;
        let open_positions = surface
            .get_positions()
            .await?
            .into_iter()
            .filter(|(_, p)| p.is_open())
            .collect();

        Ok(ReplayReport {
            candles: candles.len(),
            ticks,
            entry,
            outcome,
            fills: surface.fills(),
            journal: controller.into_journal().into_records(),
            final_pnl,
            open_positions,
        })
    }
}
