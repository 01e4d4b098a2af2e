//! Market-related types for 15-minute UP/DOWN binary markets.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

/// One leg of a paired UP/DOWN binary market.
///
/// The two legs settle complementarily: exactly one pays $1.00 per share.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Leg {
    /// Price goes up (YES token).
    #[strum(serialize = "up", serialize = "yes", serialize = "UP", serialize = "YES")]
    #[default]
    Up,
    /// Price goes down (NO token).
    #[strum(serialize = "down", serialize = "no", serialize = "DOWN", serialize = "NO")]
    Down,
}

impl Leg {
    /// Get the opposite leg.
    pub fn opposite(&self) -> Self {
        match self {
            Leg::Up => Leg::Down,
            Leg::Down => Leg::Up,
        }
    }

    /// Both legs, UP first.
    pub const BOTH: [Leg; 2] = [Leg::Up, Leg::Down];
}

/// Coins with 15-minute UP/DOWN markets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Coin {
    #[default]
    #[strum(serialize = "BTC", serialize = "btc")]
    Btc,
    #[strum(serialize = "ETH", serialize = "eth")]
    Eth,
    #[strum(serialize = "SOL", serialize = "sol")]
    Sol,
    #[strum(serialize = "XRP", serialize = "xrp")]
    Xrp,
}

impl Coin {
    /// Slug prefix used by the venue for this coin's 15m markets.
    pub fn slug_prefix(&self) -> &'static str {
        match self {
            Coin::Btc => "btc",
            Coin::Eth => "eth",
            Coin::Sol => "sol",
            Coin::Xrp => "xrp",
        }
    }
}

/// Active 15-minute paired market: one UP token and one DOWN token over
/// the same window.
#[derive(Debug, Clone)]
pub struct PairedMarket {
    /// Market slug (e.g., "btc-updown-15m-1765301400").
    pub slug: String,
    /// Unique market identifier.
    pub id: String,
    /// UP (YES) token ID for CLOB.
    pub up_token_id: String,
    /// DOWN (NO) token ID for CLOB.
    pub down_token_id: String,
    /// Unix timestamp when market opened.
    pub start_timestamp: i64,
    /// Unix timestamp when market closes (start + 900s).
    pub end_timestamp: i64,
    /// Price increment both legs quote in.
    pub tick_size: Decimal,
    /// Minimum order size in shares.
    pub min_order_size: Decimal,
    /// Market question text.
    pub question: Option<String>,
}

impl PairedMarket {
    /// Duration of a 15-minute market window in seconds.
    pub const WINDOW_SECONDS: i64 = 900;

    /// Get the token ID for a given leg.
    pub fn token_id(&self, leg: Leg) -> &str {
        match leg {
            Leg::Up => &self.up_token_id,
            Leg::Down => &self.down_token_id,
        }
    }

    /// Resolve a token ID back to its leg.
    pub fn leg_for_token(&self, token_id: &str) -> Option<Leg> {
        if token_id == self.up_token_id {
            Some(Leg::Up)
        } else if token_id == self.down_token_id {
            Some(Leg::Down)
        } else {
            None
        }
    }

    /// Check if the market is closed.
    pub fn is_closed(&self) -> bool {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        now >= self.end_timestamp
    }

    /// Get remaining time until market closes.
    pub fn time_remaining(&self) -> Option<std::time::Duration> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let remaining = self.end_timestamp - now;
        if remaining <= 0 {
            None
        } else {
            Some(std::time::Duration::from_secs(remaining as u64))
        }
    }

    /// Format remaining time as "Xm Ys" string.
    pub fn time_remaining_str(&self) -> String {
        match self.time_remaining() {
            Some(duration) => {
                let secs = duration.as_secs();
                let minutes = secs / 60;
                let seconds = secs % 60;
                format!("{}m {}s", minutes, seconds)
            }
            None => "CLOSED".to_string(),
        }
    }
}

/// Parsed market data from the venue API.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketData {
    /// Market slug.
    pub slug: Option<String>,
    /// Market ID.
    pub id: Option<String>,
    /// CLOB token IDs. The API sends either a JSON array or a
    /// stringified one depending on the endpoint.
    #[serde(rename = "clobTokenIds", deserialize_with = "de_token_ids", default)]
    pub clob_token_ids: Option<Vec<String>>,
    /// Market outcomes.
    pub outcomes: Option<Vec<String>>,
    /// Market question.
    pub question: Option<String>,
    /// Start date (ISO format).
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    /// End date (ISO format).
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    /// Minimum tick size, when the API provides one.
    #[serde(rename = "orderPriceMinTickSize")]
    pub min_tick_size: Option<Decimal>,
    /// Minimum order size, when the API provides one.
    #[serde(rename = "orderMinSize")]
    pub min_order_size: Option<Decimal>,
}

fn de_token_ids<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::List(ids)) => Ok(Some(ids)),
        Some(Raw::Text(text)) => serde_json::from_str(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Market info from the Gamma API.
#[derive(Debug, Clone, Deserialize)]
pub struct GammaMarket {
    /// Market slug.
    pub slug: Option<String>,
    /// Whether market is closed.
    pub closed: Option<bool>,
}
