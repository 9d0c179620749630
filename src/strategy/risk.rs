//! Profit target, loss limit and trailing-stop rules.
//!
//! Pure functions of the current P&L and the trailing base, so the exact
//! ordering of checks can be tested without any execution surface.

use rust_decimal::Decimal;

use crate::config::types::StrategyConfig;
use crate::strategy::types::StopReason;

/// P&L thresholds of one activation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskLimits {
    pub target_profit: Decimal,
    pub max_loss: Decimal,
    pub trail_trigger: Decimal,
    pub trail_step: Decimal,
}

impl From<&StrategyConfig> for RiskLimits {
    fn from(config: &StrategyConfig) -> Self {
        Self {
            target_profit: config.target_profit,
            max_loss: config.max_loss,
            trail_trigger: config.trail_trigger,
            trail_step: config.trail_step,
        }
    }
}

/// Outcome of applying the rules to one P&L reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PnlVerdict {
    /// Close everything
    Exit(StopReason),
    /// Keep going with this trailing base
    Hold { trail_base: Decimal },
}

/// Apply target / max-loss first, then arm, fire and ratchet the trailing stop
pub fn evaluate_pnl(pnl: Decimal, trail_base: Decimal, limits: &RiskLimits) -> PnlVerdict {
    if pnl >= limits.target_profit {
        tracing::info!(pnl = %pnl, target = %limits.target_profit, "Target profit reached");
        return PnlVerdict::Exit(StopReason::TargetProfit);
    }
    if pnl <= limits.max_loss {
        tracing::warn!(pnl = %pnl, max_loss = %limits.max_loss, "Max loss limit reached");
        return PnlVerdict::Exit(StopReason::MaxLoss);
    }

    let mut base = trail_base;
    if pnl > limits.trail_trigger && base.is_zero() {
        base = limits.trail_trigger;
        tracing::info!(pnl = %pnl, trail_base = %base, "Trailing stop armed");
    }

    if base > Decimal::ZERO && pnl < base {
        tracing::info!(pnl = %pnl, trail_base = %base, "Trailing stop hit");
        return PnlVerdict::Exit(StopReason::TrailingStop);
    }

    if base > Decimal::ZERO && pnl > base + limits.trail_step {
        base = pnl - limits.trail_step;
        tracing::info!(pnl = %pnl, trail_base = %base, "Trailing base raised");
    }

    PnlVerdict::Hold { trail_base: base }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limits(target: Decimal, max_loss: Decimal) -> RiskLimits {
        RiskLimits {
            target_profit: target,
            max_loss,
            trail_trigger: dec!(800),
            trail_step: dec!(200),
        }
    }

    fn run(sequence: &[Decimal], limits: &RiskLimits) -> (Vec<PnlVerdict>, Vec<Decimal>) {
        let mut base = Decimal::ZERO;
        let mut verdicts = Vec::new();
        let mut bases = Vec::new();
        for pnl in sequence {
            let verdict = evaluate_pnl(*pnl, base, limits);
            verdicts.push(verdict);
            if let PnlVerdict::Hold { trail_base } = verdict {
                base = trail_base;
            }
            bases.push(base);
            if matches!(verdict, PnlVerdict::Exit(_)) {
                break;
            }
        }
        (verdicts, bases)
    }

    #[test]
    fn test_target_checked_before_trailing() {
        let (verdicts, bases) = run(&[dec!(500), dec!(900), dec!(1850)], &limits(dec!(1500), dec!(-2000)));
        assert_eq!(verdicts[0], PnlVerdict::Hold { trail_base: dec!(0) });
        assert_eq!(verdicts[1], PnlVerdict::Hold { trail_base: dec!(800) });
        assert_eq!(verdicts[2], PnlVerdict::Exit(StopReason::TargetProfit));
        assert_eq!(bases, vec![dec!(0), dec!(800), dec!(800)]);
    }

    #[test]
    fn test_trailing_stop_fires_without_ratchet() {
        let (verdicts, _) = run(&[dec!(850), dec!(1000), dec!(700)], &limits(dec!(5000), dec!(-2000)));
        assert_eq!(verdicts[0], PnlVerdict::Hold { trail_base: dec!(800) });
        // 1000 is not strictly above 800 + 200
        assert_eq!(verdicts[1], PnlVerdict::Hold { trail_base: dec!(800) });
        assert_eq!(verdicts[2], PnlVerdict::Exit(StopReason::TrailingStop));
    }

    #[test]
    fn test_ratchet_only_moves_up() {
        let sequence = [
            dec!(900),
            dec!(1300),
            dec!(1200),
            dec!(1600),
            dec!(1450),
            dec!(2100),
            dec!(1950),
        ];
        let (verdicts, bases) = run(&sequence, &limits(dec!(5000), dec!(-2000)));
        assert!(verdicts.iter().all(|v| matches!(v, PnlVerdict::Hold { .. })));
        assert_eq!(
            bases,
            vec![
                dec!(800),
                dec!(1100),
                dec!(1100),
                dec!(1400),
                dec!(1400),
                dec!(1900),
                dec!(1900)
            ]
        );
        assert!(bases.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_max_loss() {
        let verdict = evaluate_pnl(dec!(-2000), Decimal::ZERO, &limits(dec!(1500), dec!(-2000)));
        assert_eq!(verdict, PnlVerdict::Exit(StopReason::MaxLoss));
        let verdict = evaluate_pnl(dec!(-1999.5), Decimal::ZERO, &limits(dec!(1500), dec!(-2000)));
        assert_eq!(verdict, PnlVerdict::Hold { trail_base: dec!(0) });
    }

    #[test]
    fn test_exact_target_closes_even_when_trailing() {
        let verdict = evaluate_pnl(dec!(1500), dec!(1400), &limits(dec!(1500), dec!(-2000)));
        assert_eq!(verdict, PnlVerdict::Exit(StopReason::TargetProfit));
    }
}
