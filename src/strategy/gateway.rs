use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::common::errors::{CondorError, Result};
use crate::common::traits::ExecutionSurface;
use crate::common::types::{OrderId, OrderRequest};
use crate::config::types::RetryPolicy;

/// Submits orders with bounded retry and exponential backoff
///
/// Every logical order carries one tag for all of its attempts, so a surface
/// can tell a retry from a new order. Clones share the tag sequence.
/// A failed leg comes back as `OrderFailed`; the caller decides what that
/// means for the rest of the strategy.
#[derive(Debug, Clone)]
pub struct OrderGateway {
    policy: RetryPolicy,
    tag_prefix: String,
    sequence: Arc<AtomicU64>,
}

impl OrderGateway {
    pub fn new(policy: RetryPolicy) -> Self {
        // Kite tags: alphanumeric, at most 20 characters
        let tag_prefix = format!("ic{}", Utc::now().format("%m%d%H%M%S"));
        Self {
            policy,
            tag_prefix,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Delay before attempt `attempt + 1` (attempts are 1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.policy.backoff_multiplier.max(1))
            .saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .policy
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.policy.max_backoff_ms);
        Duration::from_millis(ms)
    }

    fn next_tag(&self) -> String {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}{}", self.tag_prefix, n)
    }

    pub async fn submit(
        &self,
        surface: &dyn ExecutionSurface,
        request: &OrderRequest,
    ) -> Result<OrderId> {
        let tagged;
        let request = match request.tag {
            Some(_) => request,
            None => {
                tagged = request.clone().with_tag(self.next_tag());
                &tagged
            }
        };
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();
        let mut attempts = 0;

        for attempt in 1..=max_attempts {
            attempts = attempt;
            match surface.place_order(request).await {
                Ok(order_id) => {
                    info!(
                        surface = surface.surface_name(),
                        instrument = %request.instrument,
                        side = %request.side,
                        quantity = request.quantity,
                        limit_price = ?request.limit_price,
                        attempt,
                        tag = ?request.tag,
                        order_id = %order_id,
                        "Order placed"
                    );
                    return Ok(order_id);
                }
                Err(e) => {
                    warn!(
                        surface = surface.surface_name(),
                        instrument = %request.instrument,
                        side = %request.side,
                        quantity = request.quantity,
                        attempt,
                        max_attempts,
                        tag = ?request.tag,
                        error = %e,
                        "Order attempt failed"
                    );
                    let retryable = e.is_retryable();
                    last_error = e.to_string();
                    if !retryable {
                        break;
                    }
                    if attempt < max_attempts {
                        let delay = self.backoff(attempt);
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        Err(CondorError::OrderFailed {
            symbol: request.instrument.clone(),
            side: request.side,
            attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::traits::MockExecutionSurface;
    use crate::common::types::Side;
    use std::sync::atomic::AtomicU32;

    fn request() -> OrderRequest {
        OrderRequest::market("NFO:NIFTY26OCT18700PE", Side::Sell, 250)
    }

    fn surface_failing(times: u32, error: fn() -> CondorError) -> (MockExecutionSurface, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut surface = MockExecutionSurface::new();
        surface.expect_surface_name().return_const("mock");
        surface.expect_place_order().returning(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= times {
                Err(error())
            } else {
                Ok(format!("ORD-{}", n))
            }
        });
        (surface, calls)
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let gateway = OrderGateway::new(RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 500,
            backoff_multiplier: 2,
            max_backoff_ms: 1500,
        });
        assert_eq!(gateway.backoff(1), Duration::from_millis(500));
        assert_eq!(gateway.backoff(2), Duration::from_millis(1000));
        assert_eq!(gateway.backoff(3), Duration::from_millis(1500));
        assert_eq!(gateway.backoff(10), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let (surface, calls) =
            surface_failing(2, || CondorError::SurfaceUnreachable("502".into()));
        let gateway = OrderGateway::new(RetryPolicy::immediate(3));

        let order_id = gateway.submit(&surface, &request()).await.unwrap();
        assert_eq!(order_id, "ORD-3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let (surface, calls) =
            surface_failing(u32::MAX, || CondorError::SurfaceUnreachable("timeout".into()));
        let gateway = OrderGateway::new(RetryPolicy::immediate(3));

        let err = gateway.submit(&surface, &request()).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            CondorError::OrderFailed {
                symbol,
                side,
                attempts,
                last_error,
            } => {
                assert_eq!(symbol, "NFO:NIFTY26OCT18700PE");
                assert_eq!(side, Side::Sell);
                assert_eq!(attempts, 3);
                assert!(last_error.contains("timeout"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let (surface, calls) =
            surface_failing(u32::MAX, || CondorError::OrderRejected("insufficient margin".into()));
        let gateway = OrderGateway::new(RetryPolicy::immediate(3));

        let err = gateway.submit(&surface, &request()).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, CondorError::OrderFailed { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_retries_reuse_one_tag() {
        let tags = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = tags.clone();
        let mut surface = MockExecutionSurface::new();
        surface.expect_surface_name().return_const("mock");
        surface.expect_place_order().returning(move |request| {
            let mut seen = seen.lock().unwrap();
            seen.push(request.tag.clone());
            if seen.len() == 2 {
                Ok("ORD-1".to_string())
            } else {
                Err(CondorError::SurfaceUnreachable("timeout".into()))
            }
        });
        let gateway = OrderGateway::new(RetryPolicy::immediate(3));

        gateway.submit(&surface, &request()).await.unwrap();
        gateway.clone().submit(&surface, &request()).await.unwrap_err();

        let tags = tags.lock().unwrap().clone();
        assert_eq!(tags.len(), 5);
        assert!(tags.iter().all(|t| t.as_ref().is_some_and(|t| t.len() <= 20)));
        assert_eq!(tags[0], tags[1]);
        assert_ne!(tags[1], tags[2]);
        assert_eq!(tags[2], tags[4]);
    }

    #[tokio::test]
    async fn test_caller_tag_is_kept() {
        let mut surface = MockExecutionSurface::new();
        surface.expect_surface_name().return_const("mock");
        surface
            .expect_place_order()
            .withf(|request| request.tag.as_deref() == Some("ictest7"))
            .returning(|_| Ok("ORD-7".to_string()));
        let gateway = OrderGateway::new(RetryPolicy::immediate(1));

        let order_id = gateway
            .submit(&surface, &request().with_tag("ictest7"))
            .await
            .unwrap();
        assert_eq!(order_id, "ORD-7");
    }

    #[tokio::test]
    async fn test_unreadable_acknowledgement_is_not_retried() {
        let (surface, calls) =
            surface_failing(u32::MAX, || CondorError::InvalidResponse("<html>ok</html>".into()));
        let gateway = OrderGateway::new(RetryPolicy::immediate(3));

        let err = gateway.submit(&surface, &request()).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, CondorError::OrderFailed { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_waits_between_attempts() {
        let (surface, _) = surface_failing(1, || CondorError::SurfaceUnreachable("reset".into()));
        let gateway = OrderGateway::new(RetryPolicy {
            max_attempts: 2,
            initial_backoff_ms: 20,
            backoff_multiplier: 2,
            max_backoff_ms: 100,
        });

        let started = std::time::Instant::now();
        gateway.submit(&surface, &request()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
