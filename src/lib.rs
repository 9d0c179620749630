//! Iron Condor Library
//!
//! An options-selling control loop that opens a four-leg Iron Condor and
//! manages it with profit, loss, trailing-stop and adjustment rules, against
//! either a live Kite Connect account or a historical candle replay.

pub mod backtest;
pub mod common;
pub mod config;
pub mod kite;
pub mod strategy;

// Re-export commonly used types
pub use backtest::{OptionQuotes, ReplayDriver, ReplayReport, SimulatedSurface};
pub use common::errors::{CondorError, Result};
pub use common::traits::{Clock, ExecutionSurface, FixedClock, SystemClock};
pub use common::types::{
    Candle, InstrumentSymbol, Leg, OptionType, OrderOutcome, OrderRequest, Position, Side,
};
pub use config::types::AppConfig;
pub use kite::{KiteRestClient, LiveSurface};

// Strategy types
pub use strategy::{
    EntryOutcome, LiveScheduler, OrderGateway, PositionLedger, StopReason, StrategyController,
    StrategyState, StrikeSelector, TickOutcome, TradeJournal,
};
