use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::types::{Leg, OptionType};

/// Lifecycle of one strategy activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyState {
    Idle,
    Entering,
    Monitoring,
    /// Transient sub-state of Monitoring while one spread is being replaced
    Adjusting,
    Closing,
    /// Absorbing: further ticks do nothing
    Terminated,
}

/// Which vertical spread of the condor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpreadSide {
    Put,
    Call,
}

impl SpreadSide {
    pub fn option_type(self) -> OptionType {
        match self {
            SpreadSide::Put => OptionType::Put,
            SpreadSide::Call => OptionType::Call,
        }
    }
}

impl std::fmt::Display for SpreadSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpreadSide::Put => write!(f, "put"),
            SpreadSide::Call => write!(f, "call"),
        }
    }
}

/// A short option protected by a further out-of-the-money long option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadPosition {
    pub side: SpreadSide,
    pub short: Leg,
    pub long: Leg,
    /// Premium collected per unit when the spread was opened, if it was quotable
    pub entry_credit: Option<Decimal>,
}

impl SpreadPosition {
    pub fn legs(&self) -> [&Leg; 2] {
        [&self.short, &self.long]
    }
}

/// Mutable state of one activation, owned by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyContext {
    /// `None` once the side has been closed without replacement
    pub put_spread: Option<SpreadPosition>,
    pub call_spread: Option<SpreadPosition>,
    pub entry_time: DateTime<Utc>,
    /// 0 until the trailing stop arms; never decreases afterwards
    pub trail_base: Decimal,
    pub tick_count: u64,
    /// Net credit per unit across all four legs at entry
    pub net_credit: Option<Decimal>,
    pub adjustments: u32,
}

impl StrategyContext {
    pub fn spread(&self, side: SpreadSide) -> Option<&SpreadPosition> {
        match side {
            SpreadSide::Put => self.put_spread.as_ref(),
            SpreadSide::Call => self.call_spread.as_ref(),
        }
    }

    pub(crate) fn set_spread(&mut self, side: SpreadSide, spread: Option<SpreadPosition>) {
        match side {
            SpreadSide::Put => self.put_spread = spread,
            SpreadSide::Call => self.call_spread = spread,
        }
    }

    /// Every leg still held, put spread first
    pub fn legs(&self) -> Vec<&Leg> {
        self.put_spread
            .iter()
            .chain(self.call_spread.iter())
            .flat_map(|s| s.legs())
            .collect()
    }
}

/// Why an activation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetProfit,
    MaxLoss,
    TrailingStop,
    SessionEnd,
    MarketClosed,
    Interrupted,
    /// `tick` was called before a successful entry
    NotEntered,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::TargetProfit => write!(f, "target profit reached"),
            StopReason::MaxLoss => write!(f, "max loss reached"),
            StopReason::TrailingStop => write!(f, "trailing stop hit"),
            StopReason::SessionEnd => write!(f, "session ending"),
            StopReason::MarketClosed => write!(f, "market closed"),
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::NotEntered => write!(f, "strategy not entered"),
        }
    }
}

/// Result of one monitoring step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickOutcome {
    Continue,
    Stop(StopReason),
}

impl TickOutcome {
    pub fn is_stop(&self) -> bool {
        matches!(self, TickOutcome::Stop(_))
    }
}

/// Why `enter` did not open a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    MarketClosed,
    PriceUnavailable(String),
    InsufficientCredit {
        credit: Option<Decimal>,
        required: Decimal,
    },
    /// Average implied volatility unknown or outside the configured bounds
    VolatilityOutOfRange {
        iv: Option<Decimal>,
        min: Option<Decimal>,
        max: Option<Decimal>,
    },
    AlreadyActivated,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MarketClosed => write!(f, "market not open"),
            SkipReason::PriceUnavailable(reason) => write!(f, "reference price unavailable: {}", reason),
            SkipReason::InsufficientCredit { credit: Some(c), required } => {
                write!(f, "net credit {} below required {}", c, required)
            }
            SkipReason::InsufficientCredit { credit: None, required } => {
                write!(f, "net credit not quotable, {} required", required)
            }
            SkipReason::VolatilityOutOfRange { iv: Some(iv), min, max } => {
                write!(f, "average IV {} outside {:?}..={:?}", iv, min, max)
            }
            SkipReason::VolatilityOutOfRange { iv: None, .. } => {
                write!(f, "implied volatility not available")
            }
            SkipReason::AlreadyActivated => write!(f, "strategy already activated"),
        }
    }
}

/// Result of an entry attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntryOutcome {
    Entered { legs_placed: usize, legs_failed: usize },
    Skipped(SkipReason),
}

impl EntryOutcome {
    pub fn is_entered(&self) -> bool {
        matches!(self, EntryOutcome::Entered { .. })
    }
}
