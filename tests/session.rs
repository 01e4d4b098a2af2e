//! End-to-end session tests against the scriptable mock venue.
//!
//! These drive the full controller loop with synthetic book events and
//! assert on the terminal stats and venue interactions.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use updown_arb::config::{Config, PartialFillPolicy};
use updown_arb::market::{Leg, MockVenue, PairedMarket, ScriptedOutcome, SubmitBehavior};
use updown_arb::orderbook::{BookEvent, BookEventKind, PriceLevel};
use updown_arb::session::{SessionController, SessionEvent, SessionStats, TerminationReason};

const UP_TOKEN: &str = "up-token";
const DOWN_TOKEN: &str = "down-token";

fn test_config() -> Config {
    Config {
        // Well-known development key, not a live wallet.
        private_key: "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
            .to_string(),
        api_key: None,
        api_secret: None,
        api_passphrase: None,
        signature_type: 0,
        funder: None,
        coin: "BTC".to_string(),
        order_size: dec!(10),
        min_spread: dec!(0.02),
        price_buffer: dec!(0.01),
        tick_size: dec!(0.01),
        cooldown_seconds: 0,
        max_trades: 10,
        max_trade_size: dec!(100),
        count_rejected_trades: false,
        partial_fill_policy: PartialFillPolicy::CancelRemainder,
        flash_crash_drop: dec!(0.30),
        flash_crash_window_seconds: 10,
        order_timeout_ms: 200,
        order_poll_interval_ms: 20,
        dry_run: false,
        sim_balance: dec!(100),
        market_slug: None,
        ws_url: "wss://test.invalid".to_string(),
        clob_url: "https://test.invalid".to_string(),
        ws_reconnect_max_delay_s: 30,
        port: 8080,
        rust_log: "info".to_string(),
    }
}

fn test_market() -> PairedMarket {
    PairedMarket {
        slug: "btc-updown-15m-900".to_string(),
        id: "m1".to_string(),
        up_token_id: UP_TOKEN.to_string(),
        down_token_id: DOWN_TOKEN.to_string(),
        start_timestamp: 0,
        end_timestamp: i64::MAX / 2,
        tick_size: dec!(0.01),
        min_order_size: dec!(5),
        question: None,
    }
}

fn snapshot(token_id: &str, ts: i64, bid: rust_decimal::Decimal, ask: rust_decimal::Decimal) -> BookEvent {
    BookEvent {
        token_id: token_id.to_string(),
        timestamp_ms: ts,
        kind: BookEventKind::Snapshot,
        bids: vec![PriceLevel {
            price: bid,
            size: dec!(500),
        }],
        asks: vec![PriceLevel {
            price: ask,
            size: dec!(500),
        }],
    }
}

/// Queue the given events plus a final Stop, then run the session to
/// termination.
async fn run_session(
    config: &Config,
    venue: MockVenue,
    events: Vec<BookEvent>,
) -> (TerminationReason, SessionStats) {
    let (controller, tx) = SessionController::new(config, test_market(), Arc::new(venue));

    for event in events {
        tx.send(SessionEvent::Book(event)).await.unwrap();
    }
    tx.send(SessionEvent::Stop).await.unwrap();

    tokio::time::timeout(Duration::from_secs(10), controller.run())
        .await
        .expect("session did not terminate")
}

#[tokio::test]
async fn tradable_spread_executes_both_legs() {
    let venue = MockVenue::filling(dec!(1000));
    let events = vec![
        snapshot(UP_TOKEN, 1000, dec!(0.45), dec!(0.47)),
        snapshot(DOWN_TOKEN, 2000, dec!(0.48), dec!(0.50)),
    ];

    let (reason, stats) = run_session(&test_config(), venue.clone(), events).await;

    assert_eq!(reason, TerminationReason::Stopped);
    assert_eq!(venue.batch_count(), 1);
    assert_eq!(stats.trades_executed, 1);
    assert_eq!(stats.opportunities_seen, 1);
    // Limits: 0.47 -> 0.48, 0.50 -> 0.51; profit = 10 - (4.80 + 5.10)
    assert_eq!(stats.cumulative_profit, dec!(0.10));
    assert_eq!(stats.total_invested, dec!(9.90));
    assert_eq!(stats.partial_fills, 0);
}

#[tokio::test]
async fn spread_exactly_at_threshold_trades() {
    let venue = MockVenue::filling(dec!(1000));
    // 1.00 - (0.48 + 0.50) = 0.02 = min_spread
    let events = vec![
        snapshot(UP_TOKEN, 1000, dec!(0.46), dec!(0.48)),
        snapshot(DOWN_TOKEN, 2000, dec!(0.48), dec!(0.50)),
    ];

    let (_, stats) = run_session(&test_config(), venue.clone(), events).await;

    assert_eq!(venue.batch_count(), 1);
    assert_eq!(stats.trades_executed, 1);
}

#[tokio::test]
async fn sub_threshold_spread_never_trades() {
    let venue = MockVenue::filling(dec!(1000));
    // Combined ask 0.99, spread 0.01 < 0.02
    let events = vec![
        snapshot(UP_TOKEN, 1000, dec!(0.47), dec!(0.49)),
        snapshot(DOWN_TOKEN, 2000, dec!(0.48), dec!(0.50)),
    ];

    let (reason, stats) = run_session(&test_config(), venue.clone(), events).await;

    assert_eq!(reason, TerminationReason::Stopped);
    assert_eq!(venue.batch_count(), 0);
    assert_eq!(stats.opportunities_seen, 0);
    assert_eq!(stats.trades_executed, 0);
}

#[tokio::test]
async fn session_limit_terminates_the_session() {
    let mut config = test_config();
    config.max_trades = 1;

    let venue = MockVenue::filling(dec!(1000));
    let events = vec![
        snapshot(UP_TOKEN, 1000, dec!(0.45), dec!(0.47)),
        snapshot(DOWN_TOKEN, 2000, dec!(0.48), dec!(0.50)),
        // More tradable updates arrive after the cap is hit.
        snapshot(UP_TOKEN, 3000, dec!(0.45), dec!(0.47)),
    ];

    let (reason, stats) = run_session(&config, venue.clone(), events).await;

    assert_eq!(reason, TerminationReason::SessionLimitReached);
    assert_eq!(venue.batch_count(), 1);
    assert_eq!(stats.trades_executed, 1);
}

#[tokio::test]
async fn rejected_batch_takes_no_position_and_rearms() {
    let venue = MockVenue::filling(dec!(1000));
    venue.set_submit_behavior(SubmitBehavior::RejectBatch("post only".to_string()));

    let events = vec![
        snapshot(UP_TOKEN, 1000, dec!(0.45), dec!(0.47)),
        snapshot(DOWN_TOKEN, 2000, dec!(0.48), dec!(0.50)),
    ];

    let (reason, stats) = run_session(&test_config(), venue.clone(), events).await;

    // Rejection is not a trade: nothing held, nothing counted, and the
    // session keeps running until the stop request.
    assert_eq!(reason, TerminationReason::Stopped);
    assert_eq!(stats.trades_executed, 0);
    assert_eq!(stats.rejected_trades, 1);
    assert_eq!(stats.total_invested, dec!(0));
}

#[tokio::test]
async fn partial_fill_escalates_and_cancels_remainder() {
    let venue = MockVenue::filling(dec!(1000));
    venue.script(Leg::Down, ScriptedOutcome::Partial(dec!(4)));

    let events = vec![
        snapshot(UP_TOKEN, 1000, dec!(0.45), dec!(0.47)),
        snapshot(DOWN_TOKEN, 2000, dec!(0.48), dec!(0.50)),
    ];

    let (reason, stats) = run_session(&test_config(), venue.clone(), events).await;

    assert_eq!(reason, TerminationReason::Stopped);
    assert_eq!(stats.partial_fills, 1);
    // A one-sided attempt still counts against the session and starts
    // no realized profit.
    assert_eq!(stats.trades_executed, 1);
    assert_eq!(stats.cumulative_profit, dec!(0));
    // The down remainder was canceled, never silently dropped.
    assert_eq!(venue.canceled_orders().len(), 1);
}

#[tokio::test]
async fn market_out_policy_buys_missing_leg() {
    let mut config = test_config();
    config.partial_fill_policy = PartialFillPolicy::MarketOut;

    let venue = MockVenue::filling(dec!(1000));
    venue.script(Leg::Down, ScriptedOutcome::Partial(dec!(4)));

    let events = vec![
        snapshot(UP_TOKEN, 1000, dec!(0.45), dec!(0.47)),
        snapshot(DOWN_TOKEN, 2000, dec!(0.48), dec!(0.50)),
    ];

    let (reason, stats) = run_session(&config, venue.clone(), events).await;

    assert_eq!(reason, TerminationReason::Stopped);
    assert_eq!(stats.partial_fills, 1);
    // The remainder is canceled first, then the 6 missing DOWN shares
    // are re-bought with a single marketable order.
    assert_eq!(venue.canceled_orders().len(), 1);
    let singles = venue.single_orders();
    assert_eq!(singles.len(), 1);
    assert_eq!(singles[0].leg, Leg::Down);
    assert_eq!(singles[0].size, dec!(6));
}

#[tokio::test]
async fn no_ack_submission_resolves_via_positions() {
    let venue = MockVenue::filling(dec!(1000));
    venue.set_submit_behavior(SubmitBehavior::TransportError);

    let events = vec![
        snapshot(UP_TOKEN, 1000, dec!(0.45), dec!(0.47)),
        snapshot(DOWN_TOKEN, 2000, dec!(0.48), dec!(0.50)),
    ];

    let (reason, stats) = run_session(&test_config(), venue.clone(), events).await;

    // Both legs come back unknown; with no positions held the session
    // settles the attempt as rejected and keeps running.
    assert_eq!(reason, TerminationReason::Stopped);
    assert_eq!(stats.trades_executed, 0);
    assert_eq!(stats.rejected_trades, 1);
    assert_eq!(stats.total_invested, dec!(0));
}

#[tokio::test]
async fn auth_failure_is_fatal() {
    let venue = MockVenue::filling(dec!(1000));
    venue.set_submit_behavior(SubmitBehavior::AuthFailure);

    let events = vec![
        snapshot(UP_TOKEN, 1000, dec!(0.45), dec!(0.47)),
        snapshot(DOWN_TOKEN, 2000, dec!(0.48), dec!(0.50)),
    ];

    let (reason, stats) = run_session(&test_config(), venue.clone(), events).await;

    assert!(matches!(reason, TerminationReason::Fatal(_)));
    assert_eq!(stats.trades_executed, 0);
}

#[tokio::test]
async fn unresolved_leg_reconciles_before_terminating() {
    let venue = MockVenue::filling(dec!(1000));
    // UP never reaches a terminal status inside the poll deadline.
    venue.script(Leg::Up, ScriptedOutcome::Hang);

    let events = vec![
        snapshot(UP_TOKEN, 1000, dec!(0.45), dec!(0.47)),
        snapshot(DOWN_TOKEN, 2000, dec!(0.48), dec!(0.50)),
        // These arrive while the trade is in flight; ingestion continues
        // but no second trade may start before reconciliation finishes.
        snapshot(UP_TOKEN, 3000, dec!(0.45), dec!(0.46)),
        snapshot(DOWN_TOKEN, 4000, dec!(0.48), dec!(0.50)),
    ];

    let (reason, stats) = run_session(&test_config(), venue.clone(), events).await;

    assert_eq!(reason, TerminationReason::Stopped);
    assert_eq!(venue.batch_count(), 1);
    // No position held on UP, so reconciliation resolves it as rejected
    // and the filled DOWN leg is escalated as a partial fill.
    assert_eq!(stats.partial_fills, 1);
    assert!(!venue.canceled_orders().is_empty());
}

#[tokio::test]
async fn stale_updates_do_not_create_signals() {
    let venue = MockVenue::filling(dec!(1000));
    let events = vec![
        snapshot(UP_TOKEN, 5000, dec!(0.50), dec!(0.60)),
        // Older tradable-looking snapshot must be discarded.
        snapshot(UP_TOKEN, 1000, dec!(0.45), dec!(0.40)),
        snapshot(DOWN_TOKEN, 6000, dec!(0.48), dec!(0.50)),
    ];

    let (_, stats) = run_session(&test_config(), venue.clone(), events).await;

    assert_eq!(venue.batch_count(), 0);
    assert_eq!(stats.opportunities_seen, 0);
}
