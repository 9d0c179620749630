//! Iron Condor strategy: strike selection, order flow and risk control
//!
//! The same controller runs against a live broker or a historical replay;
//! only the [`ExecutionSurface`](crate::common::traits::ExecutionSurface)
//! and the [`Clock`](crate::common::traits::Clock) differ.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    DRIVERS                                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  LiveScheduler (poll interval, Ctrl-C)                      │
//! │  ReplayDriver  (one tick per candle, never sleeps)          │
//! └─────────────────────────────────────────────────────────────┘
//!        │ enter() once, then tick() until Stop
//!        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    StrategyController                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Idle → Entering → Monitoring ⇄ Adjusting → Closing         │
//! │                                      → Terminated           │
//! │                                                             │
//! │  StrikeSelector   strikes, symbols, weekly expiry           │
//! │  evaluate_pnl     target / max loss / trailing stop         │
//! │  OrderGateway     bounded retry with backoff                │
//! │  PositionLedger   signed quantity per instrument            │
//! │  TradeJournal     append-only order and event log           │
//! └─────────────────────────────────────────────────────────────┘
//!        │
//!        ▼
//!   ExecutionSurface (LiveSurface | SimulatedSurface)
//! ```

pub mod controller;
pub mod gateway;
pub mod journal;
pub mod ledger;
pub mod risk;
pub mod scheduler;
pub mod strikes;
pub mod types;

pub use controller::StrategyController;
pub use gateway::OrderGateway;
pub use journal::{JournalEvent, JournalRecord, TradeJournal};
pub use ledger::PositionLedger;
pub use risk::{evaluate_pnl, PnlVerdict, RiskLimits};
pub use scheduler::LiveScheduler;
pub use strikes::{
    construct_symbol, expiry_code, next_expiry, CondorStrikes, SpreadStrikes, StrikeSelector,
};
pub use types::{
    EntryOutcome, SkipReason, SpreadPosition, SpreadSide, StopReason, StrategyContext,
    StrategyState, TickOutcome,
};
