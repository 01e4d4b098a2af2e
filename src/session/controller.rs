//! Session state machine: feed ingestion, evaluation, and trade lifecycle.
//!
//! One controller loop owns all mutable state (books, history, risk) and
//! consumes a single event queue. Execution runs as a spawned task so
//! ingestion continues while orders are in flight, but at most one trade
//! is in flight and nothing new is evaluated until its outcome is fully
//! reconciled.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tokio::sync::{mpsc, RwLock};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use super::stats::SessionStats;
use crate::arbitrage::{DenyReason, GateDecision, RiskGate, SpreadEvaluator};
use crate::config::Config;
use crate::error::ExecutionError;
use crate::execution::{ExecutionEngine, ExecutionReport, Venue};
use crate::market::{Leg, PairedMarket};
use crate::metrics;
use crate::orderbook::{Applied, BookEvent, OrderbookState, PriceHistory};

/// Delay between reconciliation attempts for an unknown outcome.
const RECONCILE_RETRY: Duration = Duration::from_secs(1);

/// Reconciliation attempts before the session gives up as fatal.
const MAX_RECONCILE_ATTEMPTS: u32 = 60;

/// Inbound events for the session loop.
#[derive(Debug)]
pub enum SessionEvent {
    /// A parsed orderbook event from the feed.
    Book(BookEvent),
    /// External stop request. An in-flight trade is still reconciled
    /// before the session terminates.
    Stop,
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, not yet running.
    Idle,
    /// Watching the feed, ready to trade.
    Armed,
    /// Processing an update against the strategy.
    Evaluating,
    /// A trade is in flight.
    Executing,
    /// Resolving the outcome of a trade.
    Reconciling,
    /// Finished. No further trades.
    Terminated,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// The session trade cap was reached.
    SessionLimitReached,
    /// External stop request.
    Stopped,
    /// The feed channel closed.
    FeedClosed,
    /// Unrecoverable error.
    Fatal(String),
}

type ExecutionOutcome = (ExecutionEngine, Result<ExecutionReport, ExecutionError>);

/// Drives one trading session over one paired market.
pub struct SessionController {
    state: SessionState,
    termination: Option<TerminationReason>,
    books: OrderbookState,
    history: PriceHistory,
    evaluator: SpreadEvaluator,
    gate: RiskGate,
    /// Taken while a spawned task owns the engine.
    engine: Option<ExecutionEngine>,
    venue: Arc<dyn Venue>,
    events: mpsc::Receiver<SessionEvent>,
    in_flight: Option<JoinHandle<ExecutionOutcome>>,
    order_size: Decimal,
    stats: SessionStats,
    shared_stats: Arc<RwLock<SessionStats>>,
    stopping: bool,
    events_closed: bool,
    pending_stop: Option<TerminationReason>,
    reconcile_attempts: u32,
    crash_active: [bool; 2],
}

impl SessionController {
    /// Build a controller for one market. Returns the controller and the
    /// sender the feed (and shutdown path) writes into.
    pub fn new(
        config: &Config,
        market: PairedMarket,
        venue: Arc<dyn Venue>,
    ) -> (Self, mpsc::Sender<SessionEvent>) {
        let (tx, rx) = mpsc::channel(1024);
        let controller = Self {
            state: SessionState::Idle,
            termination: None,
            books: OrderbookState::new(market),
            history: PriceHistory::new(
                config.flash_crash_window_seconds,
                config.flash_crash_drop,
            ),
            evaluator: SpreadEvaluator::new(config.min_spread, config.price_buffer),
            gate: RiskGate::new(config),
            engine: Some(ExecutionEngine::new(config)),
            venue,
            events: rx,
            in_flight: None,
            order_size: config.order_size,
            stats: SessionStats::default(),
            shared_stats: Arc::new(RwLock::new(SessionStats::default())),
            stopping: false,
            events_closed: false,
            pending_stop: None,
            reconcile_attempts: 0,
            crash_active: [false; 2],
        };
        (controller, tx)
    }

    /// Handle the API reads to watch live stats.
    pub fn stats_handle(&self) -> Arc<RwLock<SessionStats>> {
        self.shared_stats.clone()
    }

    /// Publish stats into an existing handle instead of this session's
    /// own, so one API surface can follow rotating sessions.
    pub fn share_stats(&mut self, handle: Arc<RwLock<SessionStats>>) {
        self.shared_stats = handle;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to termination.
    pub async fn run(mut self) -> (TerminationReason, SessionStats) {
        self.state = SessionState::Armed;
        info!(
            market = %self.books.market().slug,
            size = %self.order_size,
            "Session armed"
        );

        loop {
            if let Some(reason) = self.termination.clone() {
                self.publish_stats().await;
                info!(
                    reason = ?reason,
                    trades = self.stats.trades_executed,
                    profit = %self.stats.cumulative_profit,
                    invested = %self.stats.total_invested,
                    "Session terminated"
                );
                return (reason, self.stats);
            }

            if let Some(mut handle) = self.in_flight.take() {
                if self.events_closed {
                    // Feed is gone; just wait the in-flight trade out.
                    let joined = (&mut handle).await;
                    self.handle_joined(joined).await;
                } else {
                    tokio::select! {
                        joined = &mut handle => {
                            self.handle_joined(joined).await;
                        }
                        event = self.events.recv() => {
                            self.in_flight = Some(handle);
                            match event {
                                Some(SessionEvent::Book(ev)) => {
                                    // Ingestion never stops, trading does.
                                    self.ingest(&ev);
                                }
                                Some(SessionEvent::Stop) => {
                                    info!("Stop requested, waiting for in-flight trade");
                                    self.stopping = true;
                                    self.pending_stop = Some(TerminationReason::Stopped);
                                }
                                None => {
                                    warn!("Feed closed with a trade in flight");
                                    self.events_closed = true;
                                    self.stopping = true;
                                    self.pending_stop = Some(TerminationReason::FeedClosed);
                                }
                            }
                        }
                    }
                }
            } else {
                match self.events.recv().await {
                    Some(SessionEvent::Book(ev)) => self.on_book_event(ev).await,
                    Some(SessionEvent::Stop) => {
                        self.terminate(TerminationReason::Stopped);
                    }
                    None => {
                        self.terminate(TerminationReason::FeedClosed);
                    }
                }
            }
        }
    }

    /// Apply a feed event to books and history. Returns true when the
    /// book actually changed.
    fn ingest(&mut self, event: &BookEvent) -> bool {
        let updated = match self.books.apply(event) {
            Ok(Applied::Updated(_)) => true,
            Ok(Applied::Stale(leg)) => {
                debug!(%leg, ts = event.timestamp_ms, "Stale update discarded");
                false
            }
            Err(e) => {
                warn!(error = %e, "Dropping bad feed event");
                false
            }
        };

        if updated {
            for leg in Leg::BOTH {
                if let Some(mid) = self.books.mid_price(leg) {
                    self.history.record(leg, mid, event.timestamp_ms);
                }
            }
            self.check_flash_crashes(event.timestamp_ms);
        }

        updated
    }

    /// Alert-only flash crash watch, edge-triggered per leg so a
    /// sustained crash does not spam one alert per tick.
    fn check_flash_crashes(&mut self, now_ms: i64) {
        for (idx, leg) in Leg::BOTH.iter().enumerate() {
            match self.history.detect_flash_crash(*leg, now_ms) {
                Some(event) if !self.crash_active[idx] => {
                    self.crash_active[idx] = true;
                    self.stats.flash_crash_alerts += 1;
                    metrics::inc_flash_crash_alerts();
                    warn!(
                        leg = %event.leg,
                        old = %event.old_price,
                        new = %event.new_price,
                        drop = %event.drop,
                        drop_pct = %event.drop_percent(),
                        "FLASH CRASH detected"
                    );
                }
                Some(_) => {}
                None => self.crash_active[idx] = false,
            }
        }
    }

    async fn on_book_event(&mut self, event: BookEvent) {
        let _timer = metrics::LatencyTimer::new(metrics::EVALUATION_LATENCY);
        if !self.ingest(&event) {
            return;
        }
        if self.state == SessionState::Armed && !self.stopping {
            self.maybe_trade().await;
        }
    }

    /// Evaluate the current books and start a trade when everything
    /// lines up.
    async fn maybe_trade(&mut self) {
        self.state = SessionState::Evaluating;

        let signal = self.evaluator.evaluate(
            self.books.best_ask(Leg::Up),
            self.books.best_ask(Leg::Down),
        );

        if !signal.tradable {
            self.state = SessionState::Armed;
            return;
        }

        // Inverted books produce nonsense asks; never trade against them.
        if self.books.is_inverted(Leg::Up) || self.books.is_inverted(Leg::Down) {
            warn!("Tradable signal on an inverted book, skipping");
            self.state = SessionState::Armed;
            return;
        }

        self.stats.opportunities_seen += 1;
        metrics::inc_signals_detected();
        debug!(
            buffered = ?self.evaluator.spread_after_buffer(&signal),
            "Signal past threshold"
        );

        match self.gate.check(Instant::now(), self.order_size) {
            GateDecision::Denied(DenyReason::SessionLimitReached) => {
                self.terminate(TerminationReason::SessionLimitReached);
            }
            GateDecision::Denied(DenyReason::Cooldown { remaining }) => {
                debug!(remaining_ms = remaining.as_millis() as u64, "Cooldown active, skipping");
                self.state = SessionState::Armed;
            }
            GateDecision::Denied(DenyReason::SizeExceeded) => {
                warn!(size = %self.order_size, "Order size over per-trade ceiling, skipping");
                self.state = SessionState::Armed;
            }
            GateDecision::Allowed => {
                let (Some(ask_up), Some(ask_down)) = (signal.ask_up, signal.ask_down) else {
                    self.state = SessionState::Armed;
                    return;
                };
                self.start_execution(ask_up, ask_down);
            }
        }
    }

    fn start_execution(&mut self, ask_up: Decimal, ask_down: Decimal) {
        // The state machine guarantees the engine is home when no trade
        // is in flight.
        let Some(mut engine) = self.engine.take() else {
            error!("Engine missing outside of an in-flight trade");
            self.terminate(TerminationReason::Fatal(
                "execution engine unavailable".to_string(),
            ));
            return;
        };

        let market = self.books.market().clone();
        let request = match engine.build_request(&market, ask_up, ask_down, self.order_size) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Could not build order batch");
                self.engine = Some(engine);
                self.state = SessionState::Armed;
                return;
            }
        };

        info!(
            client_order_id = %request.client_order_id,
            up_limit = %request.legs[0].limit_price,
            down_limit = %request.legs[1].limit_price,
            "Executing trade"
        );

        let venue = self.venue.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let result = engine.execute(venue.as_ref(), &request).await;
            (engine, result)
        }));
        self.state = SessionState::Executing;
    }

    async fn handle_joined(&mut self, joined: Result<ExecutionOutcome, JoinError>) {
        match joined {
            Err(e) => {
                error!(error = %e, "Execution task failed");
                self.terminate(TerminationReason::Fatal(e.to_string()));
            }
            Ok((engine, result)) => {
                self.engine = Some(engine);
                match result {
                    Err(e) => {
                        // Only fatal errors (authentication) escape the
                        // engine as errors.
                        error!(error = %e, "Execution failed fatally");
                        self.terminate(TerminationReason::Fatal(e.to_string()));
                    }
                    Ok(report) if report.has_unknown() => {
                        self.start_reconcile(report);
                    }
                    Ok(report) => {
                        self.finalize(report).await;
                    }
                }
            }
        }
    }

    /// A leg outcome is unconfirmed; query the venue before anything
    /// else may trade.
    fn start_reconcile(&mut self, report: ExecutionReport) {
        self.reconcile_attempts += 1;
        if self.reconcile_attempts > MAX_RECONCILE_ATTEMPTS {
            error!(
                attempts = self.reconcile_attempts,
                "Could not reconcile trade outcome"
            );
            self.terminate(TerminationReason::Fatal(
                "trade outcome unresolvable".to_string(),
            ));
            return;
        }

        let Some(mut engine) = self.engine.take() else {
            self.terminate(TerminationReason::Fatal(
                "execution engine unavailable".to_string(),
            ));
            return;
        };

        warn!(
            client_order_id = %report.client_order_id,
            attempt = self.reconcile_attempts,
            "Reconciling unknown trade outcome"
        );

        let venue = self.venue.clone();
        let market = self.books.market().clone();
        let size = self.order_size;
        self.in_flight = Some(tokio::spawn(async move {
            tokio::time::sleep(RECONCILE_RETRY).await;
            let resolved = engine.reconcile(venue.as_ref(), &market, &report, size).await;
            (engine, Ok(resolved))
        }));
        self.state = SessionState::Reconciling;
    }

    /// Apply a fully resolved report to risk state and stats, then
    /// re-arm or terminate.
    async fn finalize(&mut self, report: ExecutionReport) {
        self.reconcile_attempts = 0;
        let now = Instant::now();
        self.stats.total_invested += report.total_cost();

        if let Some(escalation) = &report.escalation {
            // Naked position risk event. Operator attention required.
            error!(
                filled_leg = %escalation.filled_leg,
                filled = %escalation.filled_size,
                missing_leg = %escalation.unfilled_leg,
                missing = %escalation.missing_size,
                remediation = ?escalation.remediation,
                "PARTIAL FILL escalation"
            );
            self.stats.partial_fills += 1;
            // The attempt took exposure; it counts and starts cooldown.
            self.gate.record_filled(now, Decimal::ZERO);
        } else if report.both_filled() {
            let profit = report.realized_profit.unwrap_or_default();
            self.stats.cumulative_profit += profit;
            self.gate.record_filled(now, profit);
        } else if report.fully_rejected() {
            info!(
                client_order_id = %report.client_order_id,
                "Trade rejected, no position taken"
            );
            self.stats.rejected_trades += 1;
            self.gate.record_rejected();
        } else {
            // Matched partial fills on both legs: exposure is hedged but
            // smaller than requested.
            warn!(
                up_filled = %report.up.filled_size,
                down_filled = %report.down.filled_size,
                "Trade completed below requested size"
            );
            if report.up.filled_size > Decimal::ZERO {
                self.gate.record_filled(now, Decimal::ZERO);
            } else {
                self.gate.record_rejected();
            }
        }

        self.stats.trades_executed = self.gate.state().trades_executed;
        self.publish_stats().await;

        if self.gate.session_limit_reached() {
            self.terminate(TerminationReason::SessionLimitReached);
        } else if let Some(reason) = self.pending_stop.take() {
            self.terminate(reason);
        } else if self.stopping {
            self.terminate(TerminationReason::Stopped);
        } else {
            self.state = SessionState::Armed;
        }
    }

    fn terminate(&mut self, reason: TerminationReason) {
        self.state = SessionState::Terminated;
        self.termination = Some(reason);
    }

    async fn publish_stats(&self) {
        *self.shared_stats.write().await = self.stats.clone();
    }
}
