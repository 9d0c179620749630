use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::common::types::{OrderRequest, Position, Side};

/// In-memory view of open quantity per instrument
///
/// Keyed by exchange-qualified instrument in a sorted map, so iteration
/// order (and therefore the order of close-out requests) is stable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionLedger {
    positions: BTreeMap<String, Position>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Additive fill: BUY increases, SELL decreases the signed quantity
    pub fn apply_fill(&mut self, instrument: &str, side: Side, quantity: u32) {
        let entry = self
            .positions
            .entry(instrument.to_string())
            .or_insert_with(|| Position::new(instrument, 0, Decimal::ZERO));
        entry.quantity += side.sign() * i64::from(quantity);
    }

    /// Replace the whole view with a surface snapshot
    pub fn rebuild(&mut self, snapshot: impl IntoIterator<Item = Position>) {
        self.positions = snapshot
            .into_iter()
            .map(|p| (p.instrument.clone(), p))
            .collect();
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }

    pub fn quantity(&self, instrument: &str) -> i64 {
        self.positions
            .get(instrument)
            .map(|p| p.quantity)
            .unwrap_or(0)
    }

    /// Positions with nonzero quantity
    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| p.is_open())
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Opposite-side market orders that would flatten every open position
    pub fn reverse_orders(&self) -> Vec<OrderRequest> {
        self.open_positions()
            .filter_map(|p| {
                let side = if p.quantity < 0 { Side::Buy } else { Side::Sell };
                u32::try_from(p.quantity.unsigned_abs())
                    .ok()
                    .map(|qty| OrderRequest::market(p.instrument.clone(), side, qty))
            })
            .collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Position> {
        self.positions.clone()
    }
}
