//! Signed CLOB venue client.
//!
//! Implements [`Venue`] over the venue's REST API: batch submission,
//! status polling, cancels, positions, and balance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::{EngineError, ExecutionError};
use crate::execution::{
    BatchOrderRequest, OrderLeg, OrderState, OrderStatus, Position, Side, SubmittedOrder,
    TimeInForce, Venue,
};
use crate::signing::{self, SignatureType};

use async_trait::async_trait;

/// Polygon mainnet.
const CHAIN_ID: u64 = 137;

/// Signed CLOB API client.
#[derive(Debug, Clone)]
pub struct VenueClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Base URL for the CLOB API.
    clob_url: String,
    /// Wallet private key.
    private_key: String,
    /// How orders are signed on chain.
    signature_type: SignatureType,
    /// Funder address for proxy wallets.
    funder: Option<String>,
}

/// One signed order in the submission body.
#[derive(Debug, Clone, Serialize)]
struct WireOrder {
    token_id: String,
    side: String,
    price: String,
    size: String,
    fee_rate_bps: String,
    nonce: String,
    expiration: String,
    taker: String,
    maker: String,
    signature_type: u8,
    signature: String,
    order_type: String,
    neg_risk: bool,
}

/// Submission result, tolerant of the venue's field name variants.
#[derive(Debug, Clone, Deserialize)]
struct SubmitResult {
    #[serde(alias = "orderID", alias = "orderId", alias = "order_id", alias = "id")]
    order_id: Option<String>,
    error: Option<String>,
    #[serde(default)]
    success: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct BalanceAllowanceResponse {
    balance: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PositionResponse {
    #[serde(alias = "tokenId", alias = "asset_id", alias = "assetId")]
    token_id: Option<String>,
    size: Option<String>,
    #[serde(alias = "avgPrice", alias = "avg_price")]
    avg_price: Option<String>,
}

impl VenueClient {
    /// Build a client from config with low-latency HTTP settings.
    pub fn new(config: &Config) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(2))
            .connect_timeout(std::time::Duration::from_millis(500))
            // Nagle off; every round trip counts inside a 15m window
            .tcp_nodelay(true)
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()?;

        Ok(Self {
            http,
            clob_url: config.clob_url.clone(),
            private_key: config.private_key.clone(),
            signature_type: SignatureType::from_u8(config.signature_type),
            funder: config.funder.clone(),
        })
    }

    /// Wallet address derived from the private key.
    pub fn address(&self) -> Result<String, ExecutionError> {
        signing::address_from_private_key(&self.private_key)
    }

    /// Chain the venue settles on.
    pub fn chain_id(&self) -> u64 {
        CHAIN_ID
    }

    /// Funder address for proxy wallets.
    pub fn funder(&self) -> Option<&str> {
        self.funder.as_deref()
    }

    /// Sign one order leg into its wire form.
    async fn sign_order(&self, order: &OrderLeg, expiry_ts: i64) -> Result<WireOrder, ExecutionError> {
        let address = self.address()?;
        let nonce = chrono::Utc::now().timestamp_millis().to_string();
        let expiration = expiry_ts.to_string();

        let side = match order.side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };
        let order_type = match order.tif {
            TimeInForce::FOK => "FOK",
            TimeInForce::FAK => "FAK",
            TimeInForce::GTC => "GTC",
        };

        let message = format!(
            "{}:{}:{}:{}:{}:{}",
            order.token_id, side, order.limit_price, order.size, nonce, expiration
        );
        let signature_bytes =
            signing::sign_message(&self.private_key, message.as_bytes()).await?;

        Ok(WireOrder {
            token_id: order.token_id.clone(),
            side: side.to_string(),
            price: order.limit_price.to_string(),
            size: order.size.to_string(),
            fee_rate_bps: "0".to_string(),
            nonce,
            expiration,
            taker: "0x0000000000000000000000000000000000000000".to_string(),
            maker: self.funder.clone().unwrap_or(address),
            signature_type: self.signature_type.as_u8(),
            signature: format!("0x{}", hex::encode(&signature_bytes)),
            order_type: order_type.to_string(),
            // 15m UP/DOWN markets are neg-risk markets
            neg_risk: true,
        })
    }

    async fn auth_headers(&self) -> Result<Vec<(String, String)>, ExecutionError> {
        signing::generate_auth_headers(&self.private_key).await
    }

    fn classify_submit_status(
        status: reqwest::StatusCode,
        body: String,
    ) -> ExecutionError {
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            ExecutionError::AuthenticationFailed(format!("HTTP {status}: {body}"))
        } else if status.is_client_error() {
            ExecutionError::OrderRejected {
                reason: format!("HTTP {status}: {body}"),
            }
        } else {
            ExecutionError::SubmissionFailed(format!("HTTP {status}: {body}"))
        }
    }
}

#[async_trait]
impl Venue for VenueClient {
    #[instrument(skip(self, request), fields(client_order_id = %request.client_order_id))]
    async fn submit_batch(
        &self,
        request: &BatchOrderRequest,
    ) -> Result<Vec<SubmittedOrder>, ExecutionError> {
        let mut wire_orders = Vec::with_capacity(request.legs.len());
        for order in &request.legs {
            wire_orders.push(self.sign_order(order, request.expiry_ts).await?);
        }

        let url = format!("{}/orders", self.clob_url);
        let mut http_request = self.http.post(&url).json(&wire_orders);
        for (key, value) in self.auth_headers().await? {
            http_request = http_request.header(&key, &value);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| ExecutionError::SubmissionFailed(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_submit_status(status, body));
        }

        let results: Vec<SubmitResult> = response
            .json()
            .await
            .map_err(|e| ExecutionError::SubmissionFailed(format!("Bad response body: {e}")))?;

        let mut acks = Vec::new();
        for (order, result) in request.legs.iter().zip(results) {
            match result.order_id {
                Some(order_id) if result.success != Some(false) => {
                    debug!(leg = %order.leg, order_id = %order_id, "Order accepted");
                    acks.push(SubmittedOrder {
                        leg: order.leg,
                        order_id,
                    });
                }
                _ => {
                    warn!(
                        leg = %order.leg,
                        error = result.error.as_deref().unwrap_or("no order id"),
                        "Order entry not acknowledged"
                    );
                }
            }
        }

        if acks.is_empty() {
            return Err(ExecutionError::OrderRejected {
                reason: "No order in the batch was accepted".to_string(),
            });
        }

        Ok(acks)
    }

    #[instrument(skip(self, order), fields(leg = %order.leg))]
    async fn submit_order(&self, order: &OrderLeg) -> Result<SubmittedOrder, ExecutionError> {
        order.validate().map_err(ExecutionError::InvalidParams)?;

        let expiry = chrono::Utc::now().timestamp() + 3600;
        let wire = self.sign_order(order, expiry).await?;

        let url = format!("{}/order", self.clob_url);
        let mut http_request = self.http.post(&url).json(&wire);
        for (key, value) in self.auth_headers().await? {
            http_request = http_request.header(&key, &value);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| ExecutionError::SubmissionFailed(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_submit_status(status, body));
        }

        let result: SubmitResult = response
            .json()
            .await
            .map_err(|e| ExecutionError::SubmissionFailed(format!("Bad response body: {e}")))?;

        if let Some(error) = result.error {
            return Err(ExecutionError::OrderRejected { reason: error });
        }

        let order_id = result
            .order_id
            .ok_or_else(|| ExecutionError::SubmissionFailed("No order ID in response".to_string()))?;

        info!(order_id = %order_id, price = %order.limit_price, size = %order.size, "Order submitted");
        Ok(SubmittedOrder {
            leg: order.leg,
            order_id,
        })
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderState, ExecutionError> {
        let url = format!("{}/order/{}", self.clob_url, order_id);

        let response =
            self.http
                .get(&url)
                .send()
                .await
                .map_err(|e| ExecutionError::StatusFailed {
                    order_id: order_id.to_string(),
                    reason: format!("HTTP request failed: {e}"),
                })?;

        if !response.status().is_success() {
            return Err(ExecutionError::StatusFailed {
                order_id: order_id.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let json: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| ExecutionError::StatusFailed {
                    order_id: order_id.to_string(),
                    reason: format!("Bad response body: {e}"),
                })?;

        // Field names vary between API revisions.
        let status = json
            .get("status")
            .or_else(|| json.get("orderStatus"))
            .or_else(|| json.get("order_status"))
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<OrderStatus>().ok());

        Ok(OrderState {
            order_id: order_id.to_string(),
            status,
            filled_size: parse_decimal_field(
                &json,
                &["filled", "filledSize", "filled_size", "sizeFilled"],
            ),
            remaining_size: parse_decimal_field(
                &json,
                &["remaining", "remainingSize", "remaining_size", "sizeRemaining"],
            ),
            avg_fill_price: parse_decimal_field(
                &json,
                &["avgPrice", "avg_price", "averagePrice", "price"],
            ),
        })
    }

    #[instrument(skip(self))]
    async fn cancel_orders(&self, order_ids: &[String]) -> Result<(), ExecutionError> {
        if order_ids.is_empty() {
            return Ok(());
        }

        let auth_headers = self.auth_headers().await?;

        for order_id in order_ids {
            let url = format!("{}/order/{}", self.clob_url, order_id);

            let mut request = self.http.delete(&url);
            for (key, value) in &auth_headers {
                request = request.header(key, value);
            }

            let response =
                request
                    .send()
                    .await
                    .map_err(|e| ExecutionError::CancelFailed {
                        order_id: order_id.clone(),
                        reason: e.to_string(),
                    })?;

            if response.status().is_success() {
                info!(order_id = %order_id, "Order cancelled");
            } else {
                return Err(ExecutionError::CancelFailed {
                    order_id: order_id.clone(),
                    reason: format!("HTTP {}", response.status()),
                });
            }
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn positions(&self) -> Result<Vec<Position>, ExecutionError> {
        let address = self.address()?;
        let url = format!("{}/positions", self.clob_url);

        let response = self
            .http
            .get(&url)
            .query(&[("address", &address)])
            .send()
            .await
            .map_err(|e| ExecutionError::PositionsFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ExecutionError::PositionsFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let raw: Vec<PositionResponse> = response
            .json()
            .await
            .map_err(|e| ExecutionError::PositionsFailed(format!("Bad response body: {e}")))?;

        Ok(raw
            .into_iter()
            .filter_map(|p| {
                let token_id = p.token_id?;
                let size = p.size.as_deref()?.parse().ok()?;
                Some(Position {
                    token_id,
                    size,
                    avg_price: p.avg_price.as_deref().and_then(|s| s.parse().ok()),
                })
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn balance(&self) -> Result<Decimal, ExecutionError> {
        let url = format!("{}/balance-allowance", self.clob_url);

        let mut request = self.http.get(&url);
        for (key, value) in self.auth_headers().await? {
            request = request.header(&key, &value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExecutionError::SubmissionFailed(format!("Balance request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_submit_status(status, body));
        }

        let parsed: BalanceAllowanceResponse = response
            .json()
            .await
            .map_err(|e| ExecutionError::SubmissionFailed(format!("Bad balance body: {e}")))?;

        // USDC has 6 decimals on chain.
        let balance_wei: Decimal = parsed
            .balance
            .as_deref()
            .unwrap_or("0")
            .parse()
            .unwrap_or(Decimal::ZERO);
        let balance = balance_wei / Decimal::new(1_000_000, 0);

        debug!(balance = %balance, "Retrieved collateral balance");
        Ok(balance)
    }
}

/// Parse a decimal field from JSON, trying multiple field names and
/// both string and numeric encodings.
fn parse_decimal_field(json: &serde_json::Value, keys: &[&str]) -> Option<Decimal> {
    for key in keys {
        if let Some(value) = json.get(*key) {
            if let Some(s) = value.as_str() {
                if let Ok(d) = s.parse::<Decimal>() {
                    return Some(d);
                }
            }
            if let Some(n) = value.as_f64() {
                if let Ok(d) = Decimal::try_from(n) {
                    return Some(d);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn client_creation_works() {
        let config = Config::default();
        let client = VenueClient::new(&config).unwrap();
        assert_eq!(client.chain_id(), CHAIN_ID);
    }

    #[test]
    fn address_derivation_works() {
        let config = Config::default();
        let client = VenueClient::new(&config).unwrap();
        let addr = client.address().unwrap();
        assert!(addr.starts_with("0x"));
        assert_eq!(addr.len(), 42);
    }

    #[test]
    fn decimal_field_parsing_handles_variants() {
        let json = serde_json::json!({
            "filledSize": "3.5",
            "remaining": 1.5,
            "noise": "abc"
        });
        assert_eq!(
            parse_decimal_field(&json, &["filled", "filledSize"]),
            Some(dec!(3.5))
        );
        assert_eq!(
            parse_decimal_field(&json, &["remaining"]),
            Some(dec!(1.5))
        );
        assert_eq!(parse_decimal_field(&json, &["noise", "missing"]), None);
    }

    #[test]
    fn auth_errors_classify_as_fatal() {
        let err = VenueClient::classify_submit_status(
            reqwest::StatusCode::UNAUTHORIZED,
            "bad key".to_string(),
        );
        assert!(matches!(err, ExecutionError::AuthenticationFailed(_)));

        let err = VenueClient::classify_submit_status(
            reqwest::StatusCode::BAD_REQUEST,
            "bad order".to_string(),
        );
        assert!(matches!(err, ExecutionError::OrderRejected { .. }));

        let err = VenueClient::classify_submit_status(
            reqwest::StatusCode::BAD_GATEWAY,
            String::new(),
        );
        assert!(matches!(err, ExecutionError::SubmissionFailed(_)));
    }
}
