//! Application configuration loaded from environment variables.

use rust_decimal::Decimal;
use serde::Deserialize;

/// What to do with the resting remainder when only one leg fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartialFillPolicy {
    /// Cancel the unfilled remainder and escalate.
    CancelRemainder,
    /// Cancel, then buy the missing size at an aggressive marketable limit.
    MarketOut,
}

/// Application configuration loaded from environment variables.
///
/// Immutable once the session starts. Strategy parameters must not be
/// changed mid-session.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Venue Credentials ===
    /// Wallet private key (hex, starts with 0x).
    pub private_key: String,

    /// Optional pre-generated API key.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Optional API secret.
    #[serde(default)]
    pub api_secret: Option<String>,

    /// Optional API passphrase.
    #[serde(default)]
    pub api_passphrase: Option<String>,

    /// Signature type: 0=EOA, 1=Magic.link, 2=Gnosis Safe.
    #[serde(default)]
    pub signature_type: u8,

    /// Proxy wallet address (required for Magic.link).
    #[serde(default)]
    pub funder: Option<String>,

    // === Strategy Parameters ===
    /// Which coin's 15-minute UP/DOWN pair to trade.
    #[serde(default = "default_coin")]
    pub coin: String,

    /// Number of shares per leg per trade.
    #[serde(default = "default_order_size")]
    pub order_size: Decimal,

    /// Minimum spread (1.0 - combined ask) required to trade.
    /// A spread exactly equal to this is tradable.
    #[serde(default = "default_min_spread")]
    pub min_spread: Decimal,

    /// Amount added to the observed ask when pricing each limit leg.
    #[serde(default = "default_price_buffer")]
    pub price_buffer: Decimal,

    /// Price increment both legs quote in.
    #[serde(default = "default_tick_size")]
    pub tick_size: Decimal,

    // === Risk Parameters ===
    /// Minimum seconds between completed trades.
    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,

    /// Maximum trades per session. Reaching it terminates the session.
    #[serde(default = "default_max_trades")]
    pub max_trades: u32,

    /// Per-trade size ceiling (shares per leg).
    #[serde(default = "default_max_trade_size")]
    pub max_trade_size: Decimal,

    /// Whether venue-rejected attempts count against max_trades.
    #[serde(default)]
    pub count_rejected_trades: bool,

    /// Remediation when only one leg fills.
    #[serde(default = "default_partial_fill_policy")]
    pub partial_fill_policy: PartialFillPolicy,

    // === Flash Crash Detection (alert-only) ===
    /// Absolute price drop within the window that raises an alert
    /// (0.30 = thirty cents of probability).
    #[serde(default = "default_flash_crash_drop")]
    pub flash_crash_drop: Decimal,

    /// Trailing window for flash-crash detection, in seconds.
    #[serde(default = "default_flash_crash_window")]
    pub flash_crash_window_seconds: u64,

    // === Execution Tuning ===
    /// How long to wait for both legs to reach a terminal status.
    #[serde(default = "default_order_timeout_ms")]
    pub order_timeout_ms: u64,

    /// Interval between order status polls.
    #[serde(default = "default_order_poll_interval_ms")]
    pub order_poll_interval_ms: u64,

    // === Operation Modes ===
    /// Simulation mode (no real orders).
    #[serde(default = "default_true")]
    pub dry_run: bool,

    /// Starting balance for simulation.
    #[serde(default = "default_sim_balance")]
    pub sim_balance: Decimal,

    // === Market Discovery ===
    /// Force specific market slug (bypasses auto-discovery).
    #[serde(default)]
    pub market_slug: Option<String>,

    // === Transport ===
    /// WebSocket base URL.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// CLOB API base URL.
    #[serde(default = "default_clob_url")]
    pub clob_url: String,

    /// Maximum delay between WebSocket reconnect attempts.
    #[serde(default = "default_ws_reconnect_max_delay")]
    pub ws_reconnect_max_delay_s: u64,

    // === Server Configuration ===
    /// HTTP server port for health/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

fn default_coin() -> String {
    "BTC".to_string()
}

fn default_order_size() -> Decimal {
    Decimal::new(5, 0) // 5 shares
}

fn default_min_spread() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

fn default_price_buffer() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_tick_size() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_cooldown() -> u64 {
    5
}

fn default_max_trades() -> u32 {
    10
}

fn default_max_trade_size() -> Decimal {
    Decimal::new(100, 0)
}

fn default_partial_fill_policy() -> PartialFillPolicy {
    PartialFillPolicy::CancelRemainder
}

fn default_flash_crash_drop() -> Decimal {
    Decimal::new(30, 2) // 0.30
}

fn default_flash_crash_window() -> u64 {
    10
}

fn default_order_timeout_ms() -> u64 {
    3_000
}

fn default_order_poll_interval_ms() -> u64 {
    250
}

fn default_true() -> bool {
    true
}

fn default_sim_balance() -> Decimal {
    Decimal::new(100, 0) // $100
}

fn default_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com".to_string()
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

fn default_ws_reconnect_max_delay() -> u64 {
    30
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid. Invalid config is fatal at
    /// startup; nothing here is recoverable mid-session.
    pub fn validate(&self) -> Result<(), String> {
        if !self.dry_run {
            if self.private_key.is_empty() {
                return Err("PRIVATE_KEY is required for live trading".to_string());
            }
            if !self.private_key.starts_with("0x") {
                return Err("PRIVATE_KEY must start with 0x".to_string());
            }
        }

        if self.order_size <= Decimal::ZERO {
            return Err("ORDER_SIZE must be positive".to_string());
        }

        if self.min_spread <= Decimal::ZERO {
            return Err("MIN_SPREAD must be positive".to_string());
        }

        if self.min_spread >= Decimal::ONE {
            return Err("MIN_SPREAD must be less than 1.0".to_string());
        }

        if self.price_buffer < Decimal::ZERO {
            return Err("PRICE_BUFFER must not be negative".to_string());
        }

        if self.tick_size <= Decimal::ZERO {
            return Err("TICK_SIZE must be positive".to_string());
        }

        if self.max_trades == 0 {
            return Err("MAX_TRADES must be at least 1".to_string());
        }

        if self.order_size > self.max_trade_size {
            return Err("ORDER_SIZE must not exceed MAX_TRADE_SIZE".to_string());
        }

        Ok(())
    }

    /// Check if using Magic.link (signature_type == 1).
    pub fn is_magic_link(&self) -> bool {
        self.signature_type == 1
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self {
            private_key: "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
                .to_string(),
            api_key: None,
            api_secret: None,
            api_passphrase: None,
            signature_type: 0,
            funder: None,
            coin: default_coin(),
            order_size: default_order_size(),
            min_spread: default_min_spread(),
            price_buffer: default_price_buffer(),
            tick_size: default_tick_size(),
            cooldown_seconds: default_cooldown(),
            max_trades: default_max_trades(),
            max_trade_size: default_max_trade_size(),
            count_rejected_trades: false,
            partial_fill_policy: default_partial_fill_policy(),
            flash_crash_drop: default_flash_crash_drop(),
            flash_crash_window_seconds: default_flash_crash_window(),
            order_timeout_ms: default_order_timeout_ms(),
            order_poll_interval_ms: default_order_poll_interval_ms(),
            dry_run: true,
            sim_balance: default_sim_balance(),
            market_slug: None,
            ws_url: default_ws_url(),
            clob_url: default_clob_url(),
            ws_reconnect_max_delay_s: default_ws_reconnect_max_delay(),
            port: default_port(),
            rust_log: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_values_are_sensible() {
        assert_eq!(default_min_spread(), dec!(0.02));
        assert_eq!(default_order_size(), dec!(5));
        assert_eq!(default_price_buffer(), dec!(0.01));
        assert_eq!(default_max_trades(), 10);
        assert!(default_true());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_private_key_when_live() {
        let config = Config {
            private_key: String::new(),
            dry_run: false,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_invalid_private_key_prefix_when_live() {
        let config = Config {
            private_key: "abc123".to_string(),
            dry_run: false,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_min_spread() {
        let config = Config {
            min_spread: Decimal::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_max_trades() {
        let config = Config {
            max_trades: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_size_above_ceiling() {
        let config = Config {
            order_size: dec!(500),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_fill_policy_parses_kebab_case() {
        let policy: PartialFillPolicy =
            serde_json::from_str("\"cancel-remainder\"").unwrap();
        assert_eq!(policy, PartialFillPolicy::CancelRemainder);
        let policy: PartialFillPolicy = serde_json::from_str("\"market-out\"").unwrap();
        assert_eq!(policy, PartialFillPolicy::MarketOut);
    }
}
