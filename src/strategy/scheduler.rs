use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::common::traits::{Clock, ExecutionSurface};
use crate::config::types::SessionConfig;
use crate::strategy::controller::StrategyController;
use crate::strategy::types::{EntryOutcome, SkipReason, StopReason, TickOutcome};

/// Drives a controller against a live surface at a fixed polling interval
pub struct LiveScheduler {
    surface: Arc<dyn ExecutionSurface>,
    clock: Arc<dyn Clock>,
    session: SessionConfig,
    poll_interval: Duration,
}

impl LiveScheduler {
    pub fn new(
        surface: Arc<dyn ExecutionSurface>,
        clock: Arc<dyn Clock>,
        session: SessionConfig,
    ) -> Self {
        let poll_interval = Duration::from_secs(session.poll_interval_seconds);
        Self {
            surface,
            clock,
            session,
            poll_interval,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Wait for the entry window, enter, then tick until the controller stops
    ///
    /// `shutdown` resolving at any point, entry included, abandons the step in
    /// progress, closes all positions and ends the run with `Interrupted`. `enter_now` skips the entry-day/entry-time gate but
    /// still requires an open market.
    pub async fn run<F>(
        &self,
        controller: &mut StrategyController,
        enter_now: bool,
        shutdown: F,
    ) -> StopReason
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let now = self.clock.now();
            if enter_now || self.session.entry_allowed_at(now) {
                let entry = tokio::select! {
                    biased;
                    _ = shutdown.as_mut() => None,
                    outcome = controller.enter() => Some(outcome),
                };
                let Some(entry) = entry else {
                    info!("Shutdown requested during entry");
                    return stop_reason(controller.shutdown(StopReason::Interrupted).await);
                };
                match entry {
                    EntryOutcome::Entered {
                        legs_placed,
                        legs_failed,
                    } => {
                        info!(legs_placed, legs_failed, "Entry complete, monitoring");
                        break;
                    }
                    EntryOutcome::Skipped(SkipReason::AlreadyActivated) => break,
                    EntryOutcome::Skipped(reason) => {
                        debug!(reason = %reason, "Entry not possible yet");
                    }
                }
            }
            if self.session.is_past_end(now) {
                info!("Session over without entry");
                return stop_reason(controller.shutdown(StopReason::SessionEnd).await);
            }
            if self.pause(shutdown.as_mut()).await {
                return stop_reason(controller.shutdown(StopReason::Interrupted).await);
            }
        }

        loop {
            if !self.surface.is_market_open().await {
                warn!("Market closed while positions are open");
                return stop_reason(controller.shutdown(StopReason::MarketClosed).await);
            }
            if let TickOutcome::Stop(reason) = controller.tick().await {
                return reason;
            }
            if self.pause(shutdown.as_mut()).await {
                info!("Shutdown requested");
                return stop_reason(controller.shutdown(StopReason::Interrupted).await);
            }
        }
    }

    /// Sleep one interval; true if shutdown fired first
    async fn pause<F>(&self, shutdown: Pin<&mut F>) -> bool
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = shutdown => true,
            _ = tokio::time::sleep(self.poll_interval) => false,
        }
    }
}

fn stop_reason(outcome: TickOutcome) -> StopReason {
    match outcome {
        TickOutcome::Stop(reason) => reason,
        TickOutcome::Continue => StopReason::Interrupted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::CondorError;
    use crate::common::traits::{FixedClock, MockExecutionSurface};
    use crate::strategy::types::StrategyState;
    use crate::config::types::{RetryPolicy, StrategyConfig};
    use crate::strategy::gateway::OrderGateway;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    struct Harness {
        surface: Arc<dyn ExecutionSurface>,
        clock: Arc<FixedClock>,
        open: Arc<AtomicBool>,
        close_calls: Arc<AtomicU32>,
    }

    fn harness(pnl: &[Decimal]) -> Harness {
        let open = Arc::new(AtomicBool::new(true));
        let close_calls = Arc::new(AtomicU32::new(0));
        let pnl = Arc::new(Mutex::new(pnl.iter().copied().collect::<VecDeque<_>>()));

        let mut surface = MockExecutionSurface::new();
        surface.expect_surface_name().return_const("mock");
        let is_open = open.clone();
        surface
            .expect_is_market_open()
            .returning(move || is_open.load(Ordering::SeqCst));
        surface
            .expect_get_live_price()
            .returning(|instrument| Ok(if instrument.starts_with("NSE:") { dec!(19000) } else { dec!(20) }));
        surface
            .expect_place_order()
            .returning(|request| Ok(format!("ORD-{}", request.instrument)));
        surface
            .expect_get_positions()
            .returning(|| Ok(BTreeMap::new()));
        surface
            .expect_calculate_pnl()
            .returning(move || Ok(pnl.lock().unwrap().pop_front().unwrap_or(Decimal::ZERO)));
        let closes = close_calls.clone();
        surface.expect_close_all_positions().returning(move || {
            closes.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        });

        Harness {
            surface: Arc::new(surface),
            // Monday 10:00 IST
            clock: Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2023, 10, 23, 4, 30, 0).unwrap())),
            open,
            close_calls,
        }
    }

    fn setup(h: &Harness) -> (StrategyController, LiveScheduler) {
        let controller = StrategyController::new(
            h.surface.clone(),
            h.clock.clone(),
            StrategyConfig::default(),
            SessionConfig::default(),
            OrderGateway::new(RetryPolicy::immediate(1)),
        )
        .unwrap();
        let scheduler = LiveScheduler::new(h.surface.clone(), h.clock.clone(), SessionConfig::default())
            .with_poll_interval(Duration::from_millis(1));
        (controller, scheduler)
    }

    #[tokio::test]
    async fn test_runs_until_target() {
        let h = harness(&[dec!(100), dec!(400), dec!(1600)]);
        let (mut controller, scheduler) = setup(&h);

        let reason = scheduler
            .run(&mut controller, false, std::future::pending())
            .await;
        assert_eq!(reason, StopReason::TargetProfit);
        assert_eq!(controller.context().unwrap().tick_count, 3);
        assert_eq!(h.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_market_close_flattens() {
        let h = harness(&[]);
        let (mut controller, scheduler) = setup(&h);
        controller.enter().await;
        h.open.store(false, Ordering::SeqCst);

        let reason = scheduler
            .run(&mut controller, true, std::future::pending())
            .await;
        assert_eq!(reason, StopReason::MarketClosed);
        assert_eq!(h.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_entry_places_nothing() {
        let h = harness(&[]);
        let (mut controller, scheduler) = setup(&h);

        let reason = scheduler
            .run(&mut controller, true, std::future::ready(()))
            .await;
        assert_eq!(reason, StopReason::Interrupted);
        assert_eq!(h.close_calls.load(Ordering::SeqCst), 0);
        assert!(controller.context().is_none());
        assert_eq!(controller.state(), StrategyState::Terminated);
    }

    #[tokio::test]
    async fn test_shutdown_while_monitoring_closes_once() {
        let h = harness(&[]);
        let (mut controller, scheduler) = setup(&h);
        let scheduler = scheduler.with_poll_interval(Duration::from_secs(60));

        let reason = scheduler
            .run(
                &mut controller,
                true,
                tokio::time::sleep(Duration::from_millis(20)),
            )
            .await;
        assert_eq!(reason, StopReason::Interrupted);
        assert_eq!(h.close_calls.load(Ordering::SeqCst), 1);
        assert_eq!(controller.context().unwrap().tick_count, 1);
    }

    #[tokio::test]
    async fn test_shutdown_during_entry_retries_flattens() {
        let close_calls = Arc::new(AtomicU32::new(0));
        let mut surface = MockExecutionSurface::new();
        surface.expect_surface_name().return_const("mock");
        surface.expect_is_market_open().returning(|| true);
        surface
            .expect_get_live_price()
            .returning(|instrument| Ok(if instrument.starts_with("NSE:") { dec!(19000) } else { dec!(20) }));
        surface
            .expect_place_order()
            .returning(|_| Err(CondorError::SurfaceUnreachable("connection reset".into())));
        let closes = close_calls.clone();
        surface.expect_close_all_positions().returning(move || {
            closes.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        });
        let surface: Arc<dyn ExecutionSurface> = Arc::new(surface);
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2023, 10, 23, 4, 30, 0).unwrap()));

        let gateway = OrderGateway::new(RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 200,
            backoff_multiplier: 2,
            max_backoff_ms: 1000,
        });
        let mut controller = StrategyController::new(
            surface.clone(),
            clock.clone(),
            StrategyConfig::default(),
            SessionConfig::default(),
            gateway,
        )
        .unwrap();
        let scheduler = LiveScheduler::new(surface, clock, SessionConfig::default());

        let reason = tokio::time::timeout(
            Duration::from_secs(2),
            scheduler.run(
                &mut controller,
                true,
                tokio::time::sleep(Duration::from_millis(20)),
            ),
        )
        .await
        .expect("shutdown should cut the entry retries short");
        assert_eq!(reason, StopReason::Interrupted);
        assert_eq!(close_calls.load(Ordering::SeqCst), 1);
        assert_eq!(controller.state(), StrategyState::Terminated);
        assert!(controller.context().is_none());
    }

    #[tokio::test]
    async fn test_no_entry_after_session_end() {
        let h = harness(&[]);
        // 15:30 IST
        h.clock.set(Utc.with_ymd_and_hms(2023, 10, 23, 10, 0, 0).unwrap());
        h.open.store(false, Ordering::SeqCst);
        let (mut controller, scheduler) = setup(&h);

        let reason = scheduler
            .run(&mut controller, false, std::future::pending())
            .await;
        assert_eq!(reason, StopReason::SessionEnd);
        assert!(controller.context().is_none());
        assert_eq!(h.close_calls.load(Ordering::SeqCst), 0);
    }
}
