//! Strike placement, option symbols and weekly expiry resolution

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::errors::{CondorError, Result};
use crate::common::types::{InstrumentSymbol, OptionType};
use crate::strategy::types::SpreadSide;

/// The four strikes of an Iron Condor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CondorStrikes {
    pub short_put: Decimal,
    pub long_put: Decimal,
    pub short_call: Decimal,
    pub long_call: Decimal,
}

/// Strikes of one vertical spread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadStrikes {
    pub short: Decimal,
    pub long: Decimal,
}

/// Rounds prices onto the exchange's strike grid
#[derive(Debug, Clone, Copy)]
pub struct StrikeSelector {
    step: Decimal,
}

impl StrikeSelector {
    pub fn new(step: Decimal) -> Result<Self> {
        if step <= Decimal::ZERO {
            return Err(CondorError::InvalidConfiguration(format!(
                "strike step must be positive, got {}",
                step
            )));
        }
        Ok(Self { step })
    }

    /// Nearest valid strike; exact midpoints round to the even multiple
    pub fn round_to_strike(&self, price: Decimal) -> Decimal {
        ((price / self.step).round() * self.step).normalize()
    }

    /// Place the condor around `reference`
    ///
    /// With both distances at least one step, the result always satisfies
    /// `long_put < short_put < reference < short_call < long_call`.
    pub fn select_strikes(
        &self,
        reference: Decimal,
        short_distance: Decimal,
        protection_distance: Decimal,
    ) -> CondorStrikes {
        let atm = self.round_to_strike(reference);
        let short_put = self.round_to_strike(atm - short_distance);
        let short_call = self.round_to_strike(atm + short_distance);
        CondorStrikes {
            short_put,
            long_put: self.round_to_strike(short_put - protection_distance),
            short_call,
            long_call: self.round_to_strike(short_call + protection_distance),
        }
    }

    /// Replacement spread for one side, offset from the current reference price
    pub fn adjustment_spread(
        &self,
        reference: Decimal,
        side: SpreadSide,
        adjustment_distance: Decimal,
        protection_distance: Decimal,
    ) -> SpreadStrikes {
        match side {
            SpreadSide::Put => {
                let short = self.round_to_strike(reference - adjustment_distance);
                SpreadStrikes {
                    short,
                    long: self.round_to_strike(short - protection_distance),
                }
            }
            SpreadSide::Call => {
                let short = self.round_to_strike(reference + adjustment_distance);
                SpreadStrikes {
                    short,
                    long: self.round_to_strike(short + protection_distance),
                }
            }
        }
    }
}

/// Build an option symbol, e.g. `NFO:NIFTY26OCT19300CE`
pub fn construct_symbol(
    exchange: &str,
    underlying: &str,
    expiry: &str,
    strike: Decimal,
    option_type: OptionType,
) -> InstrumentSymbol {
    InstrumentSymbol {
        exchange: exchange.to_string(),
        underlying: underlying.to_string(),
        expiry: expiry.to_string(),
        strike,
        option_type,
    }
}

/// Next weekly expiry strictly after `today`
///
/// On the expiry weekday itself this is the following week's expiry.
pub fn next_expiry(today: NaiveDate, expiry_weekday: Weekday) -> NaiveDate {
    let today_idx = i64::from(today.weekday().num_days_from_monday());
    let target_idx = i64::from(expiry_weekday.num_days_from_monday());
    let mut days = (target_idx - today_idx).rem_euclid(7);
    if days == 0 {
        days = 7;
    }
    today + Duration::days(days)
}

/// Expiry code used inside option symbols (`%d%b`, upper-cased)
pub fn expiry_code(expiry: NaiveDate) -> String {
    expiry.format("%d%b").to_string().to_uppercase()
}
