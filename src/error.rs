//! Unified error types for the arbitrage engine.

use rust_decimal::Decimal;
use thiserror::Error;

/// Unified error type for the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Market-related error.
    #[error("market error: {0}")]
    Market(#[from] MarketError),

    /// Feed/orderbook error.
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    /// Order execution error.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Market discovery and management errors.
#[derive(Error, Debug)]
pub enum MarketError {
    /// No active 15-minute UP/DOWN market could be found.
    #[error("no active {coin} 15min market found")]
    NoActiveMarketFound {
        /// Coin whose market was searched for.
        coin: String,
    },

    /// Failed to fetch market information.
    #[error("failed to fetch market {slug}: {reason}")]
    FetchFailed {
        /// The market slug that failed.
        slug: String,
        /// Reason for failure.
        reason: String,
    },

    /// Market is closed.
    #[error("market {slug} is closed")]
    MarketClosed {
        /// The closed market slug.
        slug: String,
    },

    /// Failed to parse market data.
    #[error("failed to parse market data: {0}")]
    ParseError(String),

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Orderbook feed ingestion errors.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Event token id does not belong to either leg of the tracked market.
    #[error("unknown token id {token_id}, not a leg of the tracked market")]
    InvalidLeg {
        /// The unrecognised token id.
        token_id: String,
    },
}

/// Order execution and reconciliation errors.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Batch submission failed.
    #[error("order submission failed: {0}")]
    SubmissionFailed(String),

    /// Failed to cancel order.
    #[error("failed to cancel order {order_id}: {reason}")]
    CancelFailed {
        /// Order ID that failed to cancel.
        order_id: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to get order status.
    #[error("failed to get order status for {order_id}: {reason}")]
    StatusFailed {
        /// Order ID.
        order_id: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to fetch positions during reconciliation.
    #[error("failed to fetch positions: {0}")]
    PositionsFailed(String),

    /// Invalid order parameters.
    #[error("invalid order parameters: {0}")]
    InvalidParams(String),

    /// Signing error.
    #[error("signing error: {0}")]
    SigningError(String),

    /// Authentication failed. Fatal for the session.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Order rejected by the venue.
    #[error("order rejected: {reason}")]
    OrderRejected {
        /// Rejection reason from the venue.
        reason: String,
    },

    /// Insufficient funds for the paired order.
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        /// Required amount.
        required: Decimal,
        /// Available amount.
        available: Decimal,
    },
}

/// WebSocket connection and message errors.
#[derive(Error, Debug)]
pub enum WsError {
    /// Send failed.
    #[error("failed to send websocket message: {0}")]
    SendFailed(String),

    /// Transport error from the underlying connection.
    #[error("websocket transport error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, EngineError>;
