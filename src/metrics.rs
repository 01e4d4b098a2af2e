//! Prometheus metrics for the engine.
//!
//! Covers feed throughput, signal detection, execution latency, and
//! trade outcomes. The recorder is installed once at startup and its
//! render handle is served at /metrics by the HTTP API.

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

// === Metric Name Constants ===

/// End-to-end execution latency (submit to classified report).
pub const EXECUTION_LATENCY: &str = "execution_latency_ms";
/// WebSocket message parse latency.
pub const WS_MESSAGE_LATENCY: &str = "ws_message_latency_ms";
/// Tick evaluation latency (book apply + spread check).
pub const EVALUATION_LATENCY: &str = "evaluation_latency_ms";
/// Cryptographic signing latency.
pub const SIGNING_LATENCY: &str = "signing_latency_ms";
/// Tradable signals seen.
pub const SIGNALS_DETECTED: &str = "signals_detected_total";
/// Trades with both legs filled.
pub const TRADES_EXECUTED: &str = "trades_executed_total";
/// Batches rejected by the venue.
pub const ORDERS_REJECTED: &str = "orders_rejected_total";
/// Trades that ended one-sided.
pub const PARTIAL_FILLS: &str = "partial_fills_total";
/// Flash crash alerts raised.
pub const FLASH_CRASH_ALERTS: &str = "flash_crash_alerts_total";
/// WebSocket messages received.
pub const WS_MESSAGES_RECEIVED: &str = "ws_messages_received_total";
/// WebSocket reconnections.
pub const WS_RECONNECTS: &str = "ws_reconnects_total";

/// Install the Prometheus recorder and register metric descriptions.
/// Call once at startup; the returned handle renders the scrape body.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_histogram!(EXECUTION_LATENCY, "Paired execution latency in milliseconds");
    describe_histogram!(
        WS_MESSAGE_LATENCY,
        "WebSocket message processing latency in milliseconds"
    );
    describe_histogram!(
        EVALUATION_LATENCY,
        "Tick evaluation latency in milliseconds"
    );
    describe_histogram!(SIGNING_LATENCY, "Cryptographic signing latency in milliseconds");

    describe_counter!(SIGNALS_DETECTED, "Total tradable signals detected");
    describe_counter!(TRADES_EXECUTED, "Total trades with both legs filled");
    describe_counter!(ORDERS_REJECTED, "Total batches rejected by the venue");
    describe_counter!(PARTIAL_FILLS, "Total one-sided execution outcomes");
    describe_counter!(FLASH_CRASH_ALERTS, "Total flash crash alerts raised");
    describe_counter!(WS_MESSAGES_RECEIVED, "Total WebSocket messages received");
    describe_counter!(WS_RECONNECTS, "Total WebSocket reconnections");

    debug!("Metrics initialized");
    Ok(handle)
}

/// Record WebSocket message processing latency.
pub fn record_ws_message_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(WS_MESSAGE_LATENCY).record(latency_ms);
}

/// Record signing operation latency.
pub fn record_signing_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(SIGNING_LATENCY).record(latency_ms);
}

/// Increment tradable signal counter.
pub fn inc_signals_detected() {
    counter!(SIGNALS_DETECTED).increment(1);
}

/// Increment trades executed counter.
pub fn inc_trades_executed() {
    counter!(TRADES_EXECUTED).increment(1);
}

/// Increment venue rejection counter.
pub fn inc_orders_rejected() {
    counter!(ORDERS_REJECTED).increment(1);
}

/// Increment partial fill counter.
pub fn inc_partial_fills() {
    counter!(PARTIAL_FILLS).increment(1);
}

/// Increment flash crash alert counter.
pub fn inc_flash_crash_alerts() {
    counter!(FLASH_CRASH_ALERTS).increment(1);
}

/// Increment WebSocket messages received counter.
pub fn inc_ws_messages_received() {
    counter!(WS_MESSAGES_RECEIVED).increment(1);
}

/// Increment WebSocket reconnects counter.
pub fn inc_ws_reconnects() {
    counter!(WS_RECONNECTS).increment(1);
}

/// RAII guard for timing operations. Records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name).record(latency_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn latency_timer_measures_time() {
        let timer = LatencyTimer::new("test_metric");
        sleep(Duration::from_millis(10));
        let elapsed = timer.elapsed_ms();
        assert!(elapsed >= 9.0); // Allow some tolerance
    }
}
