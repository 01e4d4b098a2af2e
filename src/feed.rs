//! WebSocket market data feed.
//!
//! Connects to the venue's CLOB feed, subscribes to both legs' token ids,
//! and turns raw messages into typed [`BookEvent`]s on an mpsc channel.
//! Book state itself lives in [`crate::orderbook::OrderbookState`], owned
//! by the session loop; the feed only parses and forwards.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::error::WsError;
use crate::metrics;
use crate::orderbook::{BookEvent, BookEventKind, PriceLevel};

/// Price level from the wire, prices and sizes as strings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WsLevel {
    /// Price as string.
    pub price: String,
    /// Size as string.
    pub size: String,
}

impl WsLevel {
    fn to_level(&self) -> Option<PriceLevel> {
        Some(PriceLevel {
            price: self.price.parse().ok()?,
            size: self.size.parse().ok()?,
        })
    }
}

/// Price change from the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct WsPriceChange {
    /// Asset ID.
    pub asset_id: Option<String>,
    /// Price as string.
    pub price: String,
    /// Size as string. Absolute replacement, zero removes the level.
    pub size: String,
    /// Side: "BUY" or "SELL".
    pub side: String,
}

/// Raw feed event.
#[derive(Debug, Clone, Deserialize)]
pub struct WsEvent {
    /// Event type: "book" or "price_change".
    pub event_type: Option<String>,
    /// Asset ID (for book events).
    pub asset_id: Option<String>,
    /// Bid levels (for book events).
    pub bids: Option<Vec<WsLevel>>,
    /// Ask levels (for book events).
    pub asks: Option<Vec<WsLevel>>,
    /// Price changes (for price_change events).
    pub price_changes: Option<Vec<WsPriceChange>>,
    /// Timestamp in milliseconds.
    pub timestamp: Option<i64>,
}

/// WebSocket subscription message.
#[derive(Debug, Serialize)]
struct SubscribeMessage {
    /// Message type.
    #[serde(rename = "type")]
    msg_type: String,
    /// Asset IDs to subscribe to.
    assets_ids: Vec<String>,
}

/// Reconnection configuration for the feed.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum backoff delay in seconds.
    pub max_delay_s: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_s: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_s: 30,
            backoff_multiplier: 2.0,
            heartbeat_interval_s: 30,
        }
    }
}

impl ReconnectConfig {
    /// Create from config values.
    pub fn from_config(max_delay_s: u64) -> Self {
        Self {
            max_delay_s,
            ..Default::default()
        }
    }

    /// Calculate next delay with exponential backoff.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let max_delay_ms = self.max_delay_s * 1000;
        let clamped_ms = delay_ms.min(max_delay_ms as f64) as u64;
        Duration::from_millis(clamped_ms)
    }
}

/// Manages the WebSocket connection and event parsing.
pub struct MarketFeed {
    /// WebSocket base URL.
    ws_url: String,
    /// Reconnection configuration.
    reconnect_config: ReconnectConfig,
    /// Connection state (atomic for thread safety).
    connected: Arc<AtomicBool>,
    /// Reconnection attempt counter.
    reconnect_attempts: Arc<AtomicU64>,
    /// Last successful message timestamp.
    last_message_time: Arc<std::sync::RwLock<Option<Instant>>>,
}

impl MarketFeed {
    /// Create a new feed client.
    pub fn new(ws_url: String) -> Self {
        Self::with_reconnect_config(ws_url, ReconnectConfig::default())
    }

    /// Create with custom reconnection config.
    pub fn with_reconnect_config(ws_url: String, config: ReconnectConfig) -> Self {
        Self {
            ws_url,
            reconnect_config: config,
            connected: Arc::new(AtomicBool::new(false)),
            reconnect_attempts: Arc::new(AtomicU64::new(0)),
            last_message_time: Arc::new(std::sync::RwLock::new(None)),
        }
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Get reconnection attempt count.
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Check if connection appears stale (no messages in twice the
    /// heartbeat interval).
    pub fn is_stale(&self) -> bool {
        if let Ok(time) = self.last_message_time.read() {
            if let Some(last) = *time {
                return last.elapsed()
                    > Duration::from_secs(self.reconnect_config.heartbeat_interval_s * 2);
            }
        }
        false
    }

    /// Connect once, yielding parsed book events.
    pub async fn run(
        &self,
        asset_ids: Vec<String>,
    ) -> Result<impl futures::Stream<Item = BookEvent> + '_, WsError> {
        let url = format!("{}/ws/market", self.ws_url.trim_end_matches('/'));

        info!(url = %url, assets = ?asset_ids, "Connecting to WebSocket");

        let (ws_stream, _) = connect_async(&url).await?;

        self.connected.store(true, Ordering::SeqCst);
        self.reconnect_attempts.store(0, Ordering::SeqCst);

        let (mut write, read) = ws_stream.split();

        let subscribe_msg = SubscribeMessage {
            msg_type: "MARKET".to_string(),
            assets_ids: asset_ids.clone(),
        };

        let msg_json = serde_json::to_string(&subscribe_msg)
            .map_err(|e| WsError::SendFailed(e.to_string()))?;

        write.send(Message::Text(msg_json)).await?;

        info!("Subscribed to {} assets", asset_ids.len());

        let connected = self.connected.clone();
        let last_msg_time = self.last_message_time.clone();

        let stream = read.flat_map(move |msg| {
            let connected = connected.clone();
            let last_msg_time = last_msg_time.clone();

            if let Ok(mut time) = last_msg_time.write() {
                *time = Some(Instant::now());
            }

            let events = match msg {
                Ok(Message::Text(text)) => {
                    let start = Instant::now();
                    metrics::inc_ws_messages_received();
                    let events = parse_message(&text);
                    metrics::record_ws_message_latency(start);
                    events
                }
                Ok(Message::Ping(_)) => {
                    // tungstenite auto-responds to pings
                    debug!("Received ping");
                    Vec::new()
                }
                Ok(Message::Pong(_)) => Vec::new(),
                Ok(Message::Close(frame)) => {
                    warn!(frame = ?frame, "WebSocket closed");
                    connected.store(false, Ordering::SeqCst);
                    Vec::new()
                }
                Ok(_) => Vec::new(),
                Err(e) => {
                    error!(error = %e, "WebSocket error");
                    connected.store(false, Ordering::SeqCst);
                    Vec::new()
                }
            };

            futures::stream::iter(events)
        });

        Ok(stream)
    }

    /// Run with automatic reconnection on disconnect. Returns a channel
    /// receiver that yields book events until the receiver is dropped.
    pub async fn run_with_reconnect(
        self: Arc<Self>,
        asset_ids: Vec<String>,
    ) -> mpsc::Receiver<BookEvent> {
        let (tx, rx) = mpsc::channel(1000);

        let feed = self;
        let assets = asset_ids;

        tokio::spawn(async move {
            let mut attempt = 0u32;

            loop {
                info!(attempt = attempt, "Attempting WebSocket connection");

                match feed.run(assets.clone()).await {
                    Ok(stream) => {
                        attempt = 0;

                        let mut stream = Box::pin(stream);

                        while let Some(event) = stream.next().await {
                            if tx.send(event).await.is_err() {
                                info!("Channel closed, stopping feed");
                                return;
                            }
                        }

                        warn!("WebSocket stream ended, will reconnect");
                    }
                    Err(e) => {
                        error!(error = %e, attempt = attempt, "WebSocket connection failed");
                    }
                }

                let delay = feed.reconnect_config.next_delay(attempt);
                feed.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
                metrics::inc_ws_reconnects();

                info!(delay_ms = delay.as_millis(), "Reconnecting after delay");
                tokio::time::sleep(delay).await;

                attempt = attempt.saturating_add(1);
            }
        });

        rx
    }
}

/// Parse a raw feed message into zero or more book events.
///
/// "book" events become full snapshots; "price_change" events become one
/// delta per touched asset. Events without a usable asset id or timestamp
/// are dropped with a log (the book guard needs both).
fn parse_message(text: &str) -> Vec<BookEvent> {
    // Messages can be single objects or arrays
    let raw_events: Vec<WsEvent> = if text.starts_with('[') {
        match serde_json::from_str(text) {
            Ok(events) => events,
            Err(e) => {
                debug!(error = %e, "Unparseable feed message");
                return Vec::new();
            }
        }
    } else {
        match serde_json::from_str::<WsEvent>(text) {
            Ok(event) => vec![event],
            Err(e) => {
                debug!(error = %e, "Unparseable feed message");
                return Vec::new();
            }
        }
    };

    let mut events = Vec::new();

    for raw in raw_events {
        let timestamp_ms = raw
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        match raw.event_type.as_deref() {
            Some("book") => {
                let Some(asset_id) = raw.asset_id else {
                    continue;
                };
                events.push(BookEvent {
                    token_id: asset_id,
                    timestamp_ms,
                    kind: BookEventKind::Snapshot,
                    bids: parse_levels(raw.bids.unwrap_or_default()),
                    asks: parse_levels(raw.asks.unwrap_or_default()),
                });
            }
            Some("price_change") => {
                for change in raw.price_changes.unwrap_or_default() {
                    let Some(asset_id) = change.asset_id.clone() else {
                        continue;
                    };
                    let (Ok(price), Ok(size)) = (
                        change.price.parse::<Decimal>(),
                        change.size.parse::<Decimal>(),
                    ) else {
                        continue;
                    };
                    let level = PriceLevel { price, size };
                    let (bids, asks) = match change.side.to_uppercase().as_str() {
                        "BUY" => (vec![level], Vec::new()),
                        "SELL" => (Vec::new(), vec![level]),
                        _ => continue,
                    };
                    events.push(BookEvent {
                        token_id: asset_id,
                        timestamp_ms,
                        kind: BookEventKind::Delta,
                        bids,
                        asks,
                    });
                }
            }
            _ => {}
        }
    }

    events
}

fn parse_levels(levels: Vec<WsLevel>) -> Vec<PriceLevel> {
    levels.iter().filter_map(WsLevel::to_level).collect()
}
