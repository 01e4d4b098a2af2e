//! Paired order execution: pricing, atomic submission, fill tracking,
//! partial-fill remediation, and reconciliation.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use super::order::{
    BatchOrderRequest, ExecutionReport, LegResult, LegStatus, OrderLeg, OrderState,
    PartialFillEscalation, RemediationAction, Side, TimeInForce,
};
use super::venue::Venue;
use crate::config::{Config, PartialFillPolicy};
use crate::error::ExecutionError;
use crate::market::{Leg, PairedMarket};
use crate::metrics;

/// Highest limit price ever quoted. Paying $0.99 for a share settling at
/// $1.00 is the worst acceptable entry.
const MAX_LIMIT_PRICE: Decimal = dec!(0.99);

/// Limit price used to market-out a missing leg.
const MARKET_OUT_PRICE: Decimal = dec!(0.99);

/// Builds and executes two-leg order batches against a [`Venue`].
#[derive(Debug)]
pub struct ExecutionEngine {
    price_buffer: Decimal,
    tick_size: Decimal,
    order_timeout: Duration,
    poll_interval: Duration,
    partial_fill_policy: PartialFillPolicy,
    dry_run: bool,
    sim_balance: Decimal,
    next_attempt: u64,
}

impl ExecutionEngine {
    /// Create an engine from config.
    pub fn new(config: &Config) -> Self {
        Self {
            price_buffer: config.price_buffer,
            tick_size: config.tick_size,
            order_timeout: Duration::from_millis(config.order_timeout_ms),
            poll_interval: Duration::from_millis(config.order_poll_interval_ms),
            partial_fill_policy: config.partial_fill_policy,
            dry_run: config.dry_run,
            sim_balance: config.sim_balance,
            next_attempt: 0,
        }
    }

    /// Remaining simulated balance (dry-run mode).
    pub fn sim_balance(&self) -> Decimal {
        self.sim_balance
    }

    /// Limit price for one leg: observed ask plus the buffer, rounded up
    /// to the tick, clamped at [`MAX_LIMIT_PRICE`]. Never rounds against
    /// the trader: the result is always at least the observed ask.
    pub fn limit_price(&self, best_ask: Decimal) -> Decimal {
        let padded = best_ask + self.price_buffer;
        let ticks = (padded / self.tick_size).ceil();
        let rounded = ticks * self.tick_size;
        rounded.min(MAX_LIMIT_PRICE).max(best_ask)
    }

    /// Build the atomic batch for one trade attempt.
    pub fn build_request(
        &mut self,
        market: &PairedMarket,
        ask_up: Decimal,
        ask_down: Decimal,
        size: Decimal,
    ) -> Result<BatchOrderRequest, ExecutionError> {
        self.next_attempt += 1;
        let request = BatchOrderRequest {
            client_order_id: format!(
                "pair-{}-{}",
                chrono::Utc::now().timestamp_millis(),
                self.next_attempt
            ),
            expiry_ts: chrono::Utc::now().timestamp() + 3600,
            legs: vec![
                OrderLeg {
                    leg: Leg::Up,
                    token_id: market.up_token_id.clone(),
                    side: Side::Buy,
                    limit_price: self.limit_price(ask_up),
                    size,
                    tif: TimeInForce::FAK,
                },
                OrderLeg {
                    leg: Leg::Down,
                    token_id: market.down_token_id.clone(),
                    side: Side::Buy,
                    limit_price: self.limit_price(ask_down),
                    size,
                    tif: TimeInForce::FAK,
                },
            ],
        };
        request.validate().map_err(ExecutionError::InvalidParams)?;
        Ok(request)
    }

    /// Execute a batch and classify the outcome of both legs.
    ///
    /// Only authentication failures propagate as errors; every other
    /// outcome, including venue rejection and unknown results, is
    /// expressed in the returned report.
    #[instrument(skip(self, venue, request), fields(client_order_id = %request.client_order_id))]
    pub async fn execute(
        &mut self,
        venue: &dyn Venue,
        request: &BatchOrderRequest,
    ) -> Result<ExecutionReport, ExecutionError> {
        if self.dry_run {
            return Ok(self.execute_simulated(request));
        }

        let _timer = metrics::LatencyTimer::new(metrics::EXECUTION_LATENCY);

        // Balance check first; a known shortfall is a clean rejection,
        // not an attempt.
        match venue.balance().await {
            Ok(balance) if balance < request.max_cost() => {
                warn!(
                    required = %request.max_cost(),
                    available = %balance,
                    "Insufficient balance, skipping submission"
                );
                return Ok(rejected_report(request));
            }
            Ok(_) => {}
            Err(e) => {
                // Balance endpoint down is not an order outcome; we have
                // not submitted anything yet.
                warn!(error = %e, "Balance check failed, proceeding to submission");
            }
        }

        info!(
            up_price = %request.legs[0].limit_price,
            down_price = %request.legs[1].limit_price,
            size = %request.legs[0].size,
            "Submitting paired orders"
        );

        let acks = match venue.submit_batch(request).await {
            Ok(acks) => acks,
            Err(ExecutionError::AuthenticationFailed(reason)) => {
                error!(reason = %reason, "Authentication failed");
                return Err(ExecutionError::AuthenticationFailed(reason));
            }
            Err(ExecutionError::OrderRejected { reason }) => {
                // The venue answered: nothing was placed.
                warn!(reason = %reason, "Batch rejected by venue");
                metrics::inc_orders_rejected();
                return Ok(rejected_report(request));
            }
            Err(ExecutionError::InsufficientFunds { required, available }) => {
                warn!(%required, %available, "Batch rejected: insufficient funds");
                metrics::inc_orders_rejected();
                return Ok(rejected_report(request));
            }
            Err(e) => {
                // No acknowledgement. The orders may or may not exist;
                // never assume either way.
                error!(error = %e, "Batch submission outcome unknown");
                return Ok(ExecutionReport::new(
                    request.client_order_id.clone(),
                    LegResult::empty(Leg::Up, LegStatus::Unknown),
                    LegResult::empty(Leg::Down, LegStatus::Unknown),
                    None,
                ));
            }
        };

        let up_order_id = acks.iter().find(|a| a.leg == Leg::Up).map(|a| a.order_id.clone());
        let down_order_id = acks.iter().find(|a| a.leg == Leg::Down).map(|a| a.order_id.clone());

        let (up_outcome, down_outcome) = tokio::join!(
            self.await_leg(venue, up_order_id.as_deref()),
            self.await_leg(venue, down_order_id.as_deref()),
        );

        let up = classify_leg(request, Leg::Up, up_order_id, up_outcome);
        let down = classify_leg(request, Leg::Down, down_order_id, down_outcome);

        Ok(self.finish(venue, request, up, down).await)
    }

    /// Poll one order to a terminal state within the execution timeout.
    /// `Ok(None)` means the deadline passed without a terminal answer.
    async fn await_leg(
        &self,
        venue: &dyn Venue,
        order_id: Option<&str>,
    ) -> Option<OrderState> {
        let order_id = order_id?;
        let poll = async {
            loop {
                match venue.order_status(order_id).await {
                    Ok(state)
                        if state.status.map(|s| s.is_terminal()).unwrap_or(false) =>
                    {
                        return state;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!(order_id = %order_id, error = %e, "Status poll failed, retrying");
                    }
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        match timeout(self.order_timeout, poll).await {
            Ok(state) => Some(state),
            Err(_) => {
                warn!(order_id = %order_id, "Order did not reach terminal status in time");
                None
            }
        }
    }

    /// Apply remediation if the outcome is one-sided, then assemble the
    /// final report.
    async fn finish(
        &mut self,
        venue: &dyn Venue,
        request: &BatchOrderRequest,
        up: LegResult,
        down: LegResult,
    ) -> ExecutionReport {
        // Unknown legs go to reconciliation, not remediation; we cannot
        // safely act on a position we are not sure exists.
        if up.status == LegStatus::Unknown || down.status == LegStatus::Unknown {
            warn!("Leg outcome unknown, deferring to reconciliation");
            return ExecutionReport::new(request.client_order_id.clone(), up, down, None);
        }

        let escalation = if up.filled_size != down.filled_size {
            metrics::inc_partial_fills();
            let token_up = request.leg(Leg::Up).map(|l| l.token_id.clone()).unwrap_or_default();
            let token_down = request.leg(Leg::Down).map(|l| l.token_id.clone()).unwrap_or_default();
            Some(self.remediate(venue, &token_up, &token_down, &up, &down).await)
        } else {
            None
        };

        let report =
            ExecutionReport::new(request.client_order_id.clone(), up, down, escalation);
        if report.both_filled() {
            metrics::inc_trades_executed();
            info!(
                profit = %report.realized_profit.unwrap_or_default(),
                cost = %report.total_cost(),
                "Both legs filled"
            );
        }
        report
    }

    /// Compensating action for a one-sided fill. Always logged, always
    /// reflected in the report; never silently ignored.
    async fn remediate(
        &mut self,
        venue: &dyn Venue,
        token_up: &str,
        token_down: &str,
        up: &LegResult,
        down: &LegResult,
    ) -> PartialFillEscalation {
        let (long, short) = if up.filled_size > down.filled_size {
            (up, down)
        } else {
            (down, up)
        };
        let missing = long.filled_size - short.filled_size;

        warn!(
            filled_leg = %long.leg,
            filled = %long.filled_size,
            unfilled_leg = %short.leg,
            missing = %missing,
            policy = ?self.partial_fill_policy,
            "Partial fill, taking compensating action"
        );

        // Cancel anything still resting on either leg first.
        let open_ids: Vec<String> = [up, down]
            .iter()
            .filter(|r| r.status != LegStatus::Filled)
            .filter_map(|r| r.order_id.clone())
            .collect();

        let cancel_result = if open_ids.is_empty() {
            Ok(())
        } else {
            venue.cancel_orders(&open_ids).await
        };

        let remediation = match cancel_result {
            Err(e) => {
                error!(error = %e, "Cancel failed, position still naked");
                RemediationAction::CancelFailed {
                    reason: e.to_string(),
                }
            }
            Ok(()) => match self.partial_fill_policy {
                PartialFillPolicy::CancelRemainder => RemediationAction::RemainderCanceled,
                PartialFillPolicy::MarketOut => {
                    let token_id = match short.leg {
                        Leg::Up => token_up,
                        Leg::Down => token_down,
                    };
                    let recovered = self
                        .market_out(venue, token_id, short.leg, missing)
                        .await;
                    RemediationAction::MarketOut {
                        recovered_size: recovered,
                    }
                }
            },
        };

        PartialFillEscalation {
            filled_leg: long.leg,
            filled_size: long.filled_size,
            unfilled_leg: short.leg,
            missing_size: missing,
            remediation,
        }
    }

    /// Best-effort buy of the missing size at an aggressive marketable
    /// limit. Returns the size recovered.
    async fn market_out(
        &self,
        venue: &dyn Venue,
        token_id: &str,
        leg: Leg,
        size: Decimal,
    ) -> Decimal {
        if token_id.is_empty() {
            return Decimal::ZERO;
        }

        let order = OrderLeg {
            leg,
            token_id: token_id.to_string(),
            side: Side::Buy,
            limit_price: MARKET_OUT_PRICE,
            size,
            tif: TimeInForce::FAK,
        };

        info!(leg = %leg, size = %size, price = %MARKET_OUT_PRICE, "Market-out buy for missing leg");

        match venue.submit_order(&order).await {
            Ok(ack) => {
                let state = self.await_leg(venue, Some(&ack.order_id)).await;
                let recovered = state
                    .and_then(|s| s.filled_size)
                    .unwrap_or(Decimal::ZERO);
                info!(recovered = %recovered, "Market-out result");
                recovered
            }
            Err(e) => {
                error!(error = %e, "Market-out order failed");
                Decimal::ZERO
            }
        }
    }

    /// Resolve Unknown legs by querying order status, falling back to
    /// positions when the status endpoint cannot answer. Returns the
    /// updated report; legs it still cannot resolve stay Unknown and the
    /// caller must retry before arming any new trade. A resolution that
    /// turns out one-sided gets the same compensating action as a
    /// directly observed partial fill.
    #[instrument(skip(self, venue, report), fields(client_order_id = %report.client_order_id))]
    pub async fn reconcile(
        &mut self,
        venue: &dyn Venue,
        market: &PairedMarket,
        report: &ExecutionReport,
        ordered_size: Decimal,
    ) -> ExecutionReport {
        let up = self
            .reconcile_leg(venue, market, &report.up, ordered_size)
            .await;
        let down = self
            .reconcile_leg(venue, market, &report.down, ordered_size)
            .await;

        let resolved =
            up.status != LegStatus::Unknown && down.status != LegStatus::Unknown;
        let escalation = if resolved
            && up.filled_size != down.filled_size
            && report.escalation.is_none()
        {
            metrics::inc_partial_fills();
            Some(
                self.remediate(
                    venue,
                    &market.up_token_id,
                    &market.down_token_id,
                    &up,
                    &down,
                )
                .await,
            )
        } else {
            report.escalation.clone()
        };

        ExecutionReport::new(report.client_order_id.clone(), up, down, escalation)
    }

    async fn reconcile_leg(
        &self,
        venue: &dyn Venue,
        market: &PairedMarket,
        result: &LegResult,
        ordered_size: Decimal,
    ) -> LegResult {
        if result.status != LegStatus::Unknown {
            return result.clone();
        }

        if let Some(order_id) = &result.order_id {
            match venue.order_status(order_id).await {
                Ok(state)
                    if state.status.map(|s| s.is_terminal()).unwrap_or(false) =>
                {
                    return classify_state(result.leg, Some(order_id.clone()), ordered_size, state);
                }
                Ok(_) => {
                    debug!(order_id = %order_id, "Order still open during reconciliation");
                }
                Err(e) => {
                    warn!(order_id = %order_id, error = %e, "Status query failed, checking positions");
                }
            }
        }

        // Lost-ack path: the position is the ground truth.
        let token_id = market.token_id(result.leg);
        match venue.positions().await {
            Ok(positions) => {
                let held = positions
                    .iter()
                    .find(|p| p.token_id == token_id)
                    .map(|p| p.size)
                    .unwrap_or(Decimal::ZERO);
                let avg_price = positions
                    .iter()
                    .find(|p| p.token_id == token_id)
                    .and_then(|p| p.avg_price)
                    .unwrap_or(Decimal::ZERO);

                let status = if held >= ordered_size {
                    LegStatus::Filled
                } else if held > Decimal::ZERO {
                    LegStatus::PartiallyFilled
                } else {
                    LegStatus::Rejected
                };

                info!(leg = %result.leg, held = %held, status = %status, "Leg resolved from positions");

                LegResult {
                    leg: result.leg,
                    order_id: result.order_id.clone(),
                    status,
                    filled_size: held.min(ordered_size),
                    avg_fill_price: avg_price,
                }
            }
            Err(e) => {
                warn!(leg = %result.leg, error = %e, "Positions query failed, leg stays unknown");
                result.clone()
            }
        }
    }

    /// Simulated execution: both legs fill at their limit prices against
    /// the simulated balance. No venue calls.
    fn execute_simulated(&mut self, request: &BatchOrderRequest) -> ExecutionReport {
        info!("DRY RUN - no real orders will be placed");

        let cost = request.max_cost();
        if self.sim_balance < cost {
            warn!(
                required = %cost,
                available = %self.sim_balance,
                "Insufficient simulated balance"
            );
            return rejected_report(request);
        }

        self.sim_balance -= cost;
        metrics::inc_trades_executed();

        let leg_result = |leg: Leg| {
            let order = request.leg(leg).cloned().unwrap_or(OrderLeg {
                leg,
                token_id: String::new(),
                side: Side::Buy,
                limit_price: Decimal::ZERO,
                size: Decimal::ZERO,
                tif: TimeInForce::FAK,
            });
            LegResult {
                leg,
                order_id: Some(format!("sim-{}-{leg}", request.client_order_id)),
                status: LegStatus::Filled,
                filled_size: order.size,
                avg_fill_price: order.limit_price,
            }
        };

        let report = ExecutionReport::new(
            request.client_order_id.clone(),
            leg_result(Leg::Up),
            leg_result(Leg::Down),
            None,
        );

        info!(
            cost = %cost,
            sim_balance = %self.sim_balance,
            profit = %report.realized_profit.unwrap_or_default(),
            "Simulated trade executed"
        );

        report
    }
}

/// Report for a batch the venue cleanly rejected or that was never sent.
fn rejected_report(request: &BatchOrderRequest) -> ExecutionReport {
    ExecutionReport::new(
        request.client_order_id.clone(),
        LegResult::empty(Leg::Up, LegStatus::Rejected),
        LegResult::empty(Leg::Down, LegStatus::Rejected),
        None,
    )
}

/// Classify one leg from its polled terminal state, or Unknown if the
/// deadline passed without one.
fn classify_leg(
    request: &BatchOrderRequest,
    leg: Leg,
    order_id: Option<String>,
    outcome: Option<OrderState>,
) -> LegResult {
    let ordered_size = request.leg(leg).map(|l| l.size).unwrap_or(Decimal::ZERO);
    match outcome {
        Some(state) => classify_state(leg, order_id, ordered_size, state),
        None => LegResult {
            leg,
            order_id,
            status: LegStatus::Unknown,
            filled_size: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
        },
    }
}

fn classify_state(
    leg: Leg,
    order_id: Option<String>,
    ordered_size: Decimal,
    state: OrderState,
) -> LegResult {
    let filled = state.filled_size.unwrap_or(Decimal::ZERO);
    let avg_price = state.avg_fill_price.unwrap_or(Decimal::ZERO);

    let status = match state.status {
        Some(s) if s.is_filled() => LegStatus::Filled,
        Some(s) if s.is_terminal() => {
            if filled >= ordered_size && filled > Decimal::ZERO {
                LegStatus::Filled
            } else if filled > Decimal::ZERO {
                LegStatus::PartiallyFilled
            } else {
                LegStatus::Rejected
            }
        }
        _ => LegStatus::Unknown,
    };

    let filled_size = if status == LegStatus::Filled && filled == Decimal::ZERO {
        // Some venues report FILLED without echoing the size.
        ordered_size
    } else {
        filled
    };

    LegResult {
        leg,
        order_id,
        status,
        filled_size,
        avg_fill_price: avg_price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::order::OrderStatus;
    use crate::market::MockVenue;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn engine() -> ExecutionEngine {
        ExecutionEngine::new(&Config::default())
    }

    fn test_market() -> PairedMarket {
        PairedMarket {
            slug: "btc-updown-15m-123".to_string(),
            id: "market-id".to_string(),
            up_token_id: "up-token".to_string(),
            down_token_id: "down-token".to_string(),
            start_timestamp: 0,
            end_timestamp: 900,
            tick_size: dec!(0.01),
            min_order_size: dec!(5),
            question: None,
        }
    }

    #[test]
    fn limit_price_adds_buffer_and_rounds_to_tick() {
        let e = engine();
        assert_eq!(e.limit_price(dec!(0.48)), dec!(0.49));
        assert_eq!(e.limit_price(dec!(0.49)), dec!(0.50));
        // Off-tick ask rounds up, never down.
        assert_eq!(e.limit_price(dec!(0.481)), dec!(0.50));
    }

    #[test]
    fn limit_price_clamps_at_ceiling() {
        let e = engine();
        assert_eq!(e.limit_price(dec!(0.985)), dec!(0.99));
        assert_eq!(e.limit_price(dec!(0.99)), dec!(0.99));
    }

    #[test]
    fn limit_price_never_below_observed_ask() {
        let config = Config {
            price_buffer: dec!(0),
            ..Config::default()
        };
        let e = ExecutionEngine::new(&config);
        // Ask above the clamp: the clamp must not push the limit under
        // the ask.
        assert!(e.limit_price(dec!(0.995)) >= dec!(0.995));
        // Zero buffer, on-tick ask: limit equals the ask.
        assert_eq!(e.limit_price(dec!(0.50)), dec!(0.50));
    }

    #[test]
    fn build_request_prices_both_legs() {
        let mut e = engine();
        let request = e
            .build_request(&test_market(), dec!(0.48), dec!(0.49), dec!(10))
            .unwrap();

        assert_eq!(request.legs.len(), 2);
        assert_eq!(request.leg(Leg::Up).unwrap().limit_price, dec!(0.49));
        assert_eq!(request.leg(Leg::Down).unwrap().limit_price, dec!(0.50));
        assert_eq!(request.leg(Leg::Up).unwrap().side, Side::Buy);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn build_request_ids_are_unique() {
        let mut e = engine();
        let a = e
            .build_request(&test_market(), dec!(0.48), dec!(0.49), dec!(10))
            .unwrap();
        let b = e
            .build_request(&test_market(), dec!(0.48), dec!(0.49), dec!(10))
            .unwrap();
        assert_ne!(a.client_order_id, b.client_order_id);
    }

    #[test]
    fn classify_state_maps_statuses() {
        let state = |status, filled: Decimal| OrderState {
            order_id: "o".to_string(),
            status: Some(status),
            filled_size: Some(filled),
            remaining_size: None,
            avg_fill_price: Some(dec!(0.49)),
        };

        let filled = classify_state(Leg::Up, None, dec!(10), state(OrderStatus::Filled, dec!(10)));
        assert_eq!(filled.status, LegStatus::Filled);

        let partial =
            classify_state(Leg::Up, None, dec!(10), state(OrderStatus::Canceled, dec!(4)));
        assert_eq!(partial.status, LegStatus::PartiallyFilled);
        assert_eq!(partial.filled_size, dec!(4));

        let rejected =
            classify_state(Leg::Up, None, dec!(10), state(OrderStatus::Rejected, dec!(0)));
        assert_eq!(rejected.status, LegStatus::Rejected);

        let open = classify_state(Leg::Up, None, dec!(10), state(OrderStatus::Live, dec!(0)));
        assert_eq!(open.status, LegStatus::Unknown);
    }

    #[test]
    fn filled_without_size_assumes_ordered_size() {
        let state = OrderState {
            order_id: "o".to_string(),
            status: Some(OrderStatus::Filled),
            filled_size: None,
            remaining_size: None,
            avg_fill_price: Some(dec!(0.49)),
        };
        let result = classify_state(Leg::Up, None, dec!(10), state);
        assert_eq!(result.filled_size, dec!(10));
    }

    #[tokio::test]
    async fn dry_run_fills_at_limit_prices() {
        let mut e = engine();
        let mut request = e
            .build_request(&test_market(), dec!(0.48), dec!(0.49), dec!(10))
            .unwrap();
        request.client_order_id = "pair-test".to_string();

        // No venue needed for a simulated fill.
        let report = e.execute_simulated(&request);

        assert!(report.both_filled());
        assert_eq!(report.up.avg_fill_price, dec!(0.49));
        assert_eq!(report.down.avg_fill_price, dec!(0.50));
        // 10 shares at 0.49 + 0.50 costs 9.90, pays 10.00.
        assert_eq!(report.realized_profit, Some(dec!(0.10)));
        assert_eq!(e.sim_balance(), dec!(90.10));
    }

    #[tokio::test]
    async fn dry_run_rejects_on_insufficient_sim_balance() {
        let config = Config {
            sim_balance: dec!(1),
            ..Config::default()
        };
        let mut e = ExecutionEngine::new(&config);
        let request = e
            .build_request(&test_market(), dec!(0.48), dec!(0.49), dec!(10))
            .unwrap();

        let report = e.execute_simulated(&request);
        assert!(report.fully_rejected());
        assert_eq!(e.sim_balance(), dec!(1));
    }

    fn unknown_leg(leg: Leg) -> LegResult {
        LegResult {
            leg,
            order_id: Some(format!("{leg}-order")),
            status: LegStatus::Unknown,
            filled_size: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
        }
    }

    fn filled_leg(leg: Leg, size: Decimal, price: Decimal) -> LegResult {
        LegResult {
            leg,
            order_id: Some(format!("{leg}-order")),
            status: LegStatus::Filled,
            filled_size: size,
            avg_fill_price: price,
        }
    }

    #[tokio::test]
    async fn reconcile_uses_positions_when_status_fails() {
        let mut e = engine();
        let venue = MockVenue::filling(dec!(100));
        venue.fail_status(true);
        venue.add_position("up-token", dec!(10), dec!(0.48));

        let report = ExecutionReport::new(
            "batch-1".to_string(),
            unknown_leg(Leg::Up),
            filled_leg(Leg::Down, dec!(10), dec!(0.51)),
            None,
        );
        let resolved = e.reconcile(&venue, &test_market(), &report, dec!(10)).await;

        assert_eq!(resolved.up.status, LegStatus::Filled);
        assert_eq!(resolved.up.filled_size, dec!(10));
        assert!(resolved.both_filled());
        assert_eq!(resolved.realized_profit, Some(dec!(0.10)));
    }

    #[tokio::test]
    async fn reconcile_keeps_unknown_when_venue_is_dark() {
        let mut e = engine();
        let venue = MockVenue::filling(dec!(100));
        venue.fail_status(true);
        venue.fail_positions(true);

        let report = ExecutionReport::new(
            "batch-2".to_string(),
            unknown_leg(Leg::Up),
            filled_leg(Leg::Down, dec!(10), dec!(0.51)),
            None,
        );
        let resolved = e.reconcile(&venue, &test_market(), &report, dec!(10)).await;

        // Neither endpoint answered; the leg must not be guessed either way.
        assert!(resolved.has_unknown());
        assert!(resolved.escalation.is_none());
    }

    #[tokio::test]
    async fn failed_cancel_reports_naked_position() {
        let mut e = engine();
        let venue = MockVenue::filling(dec!(100));
        venue.fail_cancel(true);

        // No position held: the unknown UP leg resolves as rejected and
        // the filled DOWN leg is left naked.
        let report = ExecutionReport::new(
            "batch-3".to_string(),
            unknown_leg(Leg::Up),
            filled_leg(Leg::Down, dec!(10), dec!(0.51)),
            None,
        );
        let resolved = e.reconcile(&venue, &test_market(), &report, dec!(10)).await;

        assert_eq!(resolved.up.status, LegStatus::Rejected);
        let escalation = resolved.escalation.expect("one-sided fill must escalate");
        assert_eq!(escalation.filled_leg, Leg::Down);
        assert!(matches!(
            escalation.remediation,
            RemediationAction::CancelFailed { .. }
        ));
    }
}
