//! Live execution surface backed by Kite Connect

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use super::messages::OrderParams;
use super::rest::KiteRestClient;
use crate::common::errors::{CondorError, Result};
use crate::common::traits::{Clock, ExecutionSurface};
use crate::common::types::{OrderId, OrderOutcome, OrderRequest, Position};
use crate::config::types::{KiteConfig, SessionConfig};
use crate::strategy::gateway::OrderGateway;
use crate::strategy::ledger::PositionLedger;

/// Broker-backed [`ExecutionSurface`]
///
/// Market hours come from the session calendar and the injected clock.
/// Close-out works from the last position snapshot, so a second call after
/// a successful close submits nothing.
///
/// A tagged order that was already sent once is looked up in the order book
/// before it is sent again, so a timeout after the broker accepted it does
/// not open the leg twice.
pub struct LiveSurface {
    rest: KiteRestClient,
    gateway: OrderGateway,
    session: SessionConfig,
    clock: Arc<dyn Clock>,
    product: String,
    ledger: Mutex<PositionLedger>,
    sent_tags: Mutex<HashSet<String>>,
}

impl LiveSurface {
    pub fn new(
        rest: KiteRestClient,
        gateway: OrderGateway,
        session: SessionConfig,
        clock: Arc<dyn Clock>,
        product: impl Into<String>,
    ) -> Self {
        Self {
            rest,
            gateway,
            session,
            clock,
            product: product.into(),
            ledger: Mutex::new(PositionLedger::new()),
            sent_tags: Mutex::new(HashSet::new()),
        }
    }

    /// Build an authenticated REST client from configuration
    pub fn rest_client(config: &KiteConfig, timeout: std::time::Duration) -> Result<KiteRestClient> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| CondorError::Authentication("kite.api_key is not set".to_string()))?;
        let access_token = config.access_token.as_deref().ok_or_else(|| {
            CondorError::Authentication(
                "kite.access_token is not set; run the session command first".to_string(),
            )
        })?;
        Ok(KiteRestClient::with_timeout(&config.base_url, timeout)?
            .with_credentials(api_key, access_token))
    }

    fn ledger(&self) -> MutexGuard<'_, PositionLedger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sent_tags(&self) -> MutexGuard<'_, HashSet<String>> {
        self.sent_tags.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn order_params(&self, request: &OrderRequest) -> Result<OrderParams> {
        let (exchange, tradingsymbol) = request.instrument.split_once(':').ok_or_else(|| {
            CondorError::OrderRejected(format!(
                "instrument {} is not exchange-qualified",
                request.instrument
            ))
        })?;
        Ok(OrderParams {
            tradingsymbol: tradingsymbol.to_string(),
            exchange: exchange.to_string(),
            transaction_type: request.side.to_string(),
            order_type: if request.limit_price.is_some() {
                "LIMIT"
            } else {
                "MARKET"
            }
            .to_string(),
            quantity: request.quantity,
            product: self.product.clone(),
            validity: "DAY".to_string(),
            price: request.limit_price,
            tag: request.tag.clone(),
        })
    }

    /// Order id of an earlier attempt that reached the broker, if any
    async fn find_sent_order(&self, tag: &str) -> Result<Option<OrderId>> {
        let orders = self.rest.get_orders().await.map_err(|e| {
            CondorError::SurfaceUnreachable(format!("cannot confirm order {}: {}", tag, e))
        })?;
        match orders.into_iter().find(|o| o.tag.as_deref() == Some(tag)) {
            Some(order) if order.status == "REJECTED" => Err(CondorError::OrderRejected(
                order
                    .status_message
                    .unwrap_or_else(|| format!("order {} rejected", order.order_id)),
            )),
            Some(order) if order.is_dead() => Ok(None),
            Some(order) => {
                info!(tag, order_id = %order.order_id, status = %order.status, "Earlier attempt was accepted");
                Ok(Some(order.order_id))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ExecutionSurface for LiveSurface {
    async fn is_market_open(&self) -> bool {
        self.session.is_open_at(self.clock.now())
    }

    async fn get_live_price(&self, instrument: &str) -> Result<Decimal> {
        let quotes = self
            .rest
            .get_ltp(&[instrument])
            .await
            .map_err(|e| CondorError::price_unavailable(instrument, e))?;
        quotes
            .get(instrument)
            .copied()
            .ok_or_else(|| CondorError::price_unavailable(instrument, "instrument missing from quote"))
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderId> {
        let params = self.order_params(request)?;
        let resent = match &request.tag {
            Some(tag) => !self.sent_tags().insert(tag.clone()),
            None => false,
        };

        let existing = match (&request.tag, resent) {
            (Some(tag), true) => self.find_sent_order(tag).await?,
            _ => None,
        };
        let order_id = match existing {
            Some(order_id) => order_id,
            None => self.rest.place_order(&params).await?,
        };
        self.ledger()
            .apply_fill(&request.instrument, request.side, request.quantity);
        Ok(order_id)
    }

    async fn get_positions(&self) -> Result<BTreeMap<String, Position>> {
        let positions = self.rest.get_positions().await?;
        let snapshot: BTreeMap<String, Position> = positions
            .day
            .iter()
            .map(|p| (p.instrument(), Position::new(p.instrument(), p.quantity, p.pnl)))
            .collect();
        self.ledger().rebuild(snapshot.values().cloned());
        Ok(snapshot)
    }

    #[instrument(skip(self))]
    async fn close_all_positions(&self) -> Vec<OrderOutcome> {
        let requests = self.ledger().reverse_orders();
        info!(orders = requests.len(), "Closing all live positions");

        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            let result = self
                .gateway
                .submit(self, &request)
                .await
                .map_err(|e| e.to_string());
            if let Err(reason) = &result {
                warn!(instrument = %request.instrument, reason = %reason, "Close-out order failed");
            }
            outcomes.push(OrderOutcome { request, result });
        }

        self.ledger().clear();
        outcomes
    }

    async fn calculate_pnl(&self) -> Result<Decimal> {
        let positions = self.rest.get_positions().await?;
        Ok(positions.day.iter().map(|p| p.pnl).sum())
    }

    fn surface_name(&self) -> &'static str {
        "kite"
    }
}
