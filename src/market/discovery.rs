//! Market discovery for active 15-minute UP/DOWN markets.
//!
//! Window start times are aligned to 15-minute boundaries, so the
//! current market's slug can usually be computed directly. The Gamma
//! listing API is the fallback when a computed slug does not resolve.

use regex::Regex;
use rust_decimal_macros::dec;
use time::OffsetDateTime;
use tracing::{debug, info, instrument};

use super::types::{Coin, GammaMarket, MarketData, PairedMarket};
use crate::error::MarketError;

/// Gamma API base URL.
const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com/markets";

/// Find the active 15-minute market for a coin.
#[instrument(skip(client))]
pub async fn discover_active_market(
    client: &reqwest::Client,
    coin: Coin,
) -> Result<PairedMarket, MarketError> {
    info!(%coin, "Searching for current 15min market");

    // Strategy 1: computed slugs for the current and upcoming windows.
    if let Ok(market) = try_computed_slugs(client, coin).await {
        info!(slug = %market.slug, "Found market via computed slug");
        return Ok(market);
    }

    // Strategy 2: scan the Gamma open-market listing.
    if let Ok(market) = try_gamma_listing(client, coin).await {
        info!(slug = %market.slug, "Found market via Gamma listing");
        return Ok(market);
    }

    Err(MarketError::NoActiveMarketFound {
        coin: coin.to_string(),
    })
}

/// Try computed slugs for the current and next few windows.
#[instrument(skip(client))]
async fn try_computed_slugs(
    client: &reqwest::Client,
    coin: Coin,
) -> Result<PairedMarket, MarketError> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let window = PairedMarket::WINDOW_SECONDS;

    for i in 0..7 {
        let ts = now + (i * window);
        let ts_rounded = (ts / window) * window;
        let slug = format!("{}-updown-15m-{}", coin.slug_prefix(), ts_rounded);

        debug!(slug = %slug, "Checking computed slug");

        match fetch_market_from_slug(client, &slug).await {
            Ok(market) if !market.is_closed() => return Ok(market),
            Ok(_) => debug!(slug = %slug, "Market exists but is closed"),
            Err(e) => debug!(slug = %slug, error = %e, "Slug not found"),
        }
    }

    Err(MarketError::NoActiveMarketFound {
        coin: coin.to_string(),
    })
}

/// Scan the open-market listing for this coin's earliest open window.
#[instrument(skip(client))]
async fn try_gamma_listing(
    client: &reqwest::Client,
    coin: Coin,
) -> Result<PairedMarket, MarketError> {
    let response = client
        .get(GAMMA_API_URL)
        .query(&[("closed", "false"), ("limit", "500")])
        .send()
        .await?;

    let markets: Vec<GammaMarket> = response
        .json()
        .await
        .map_err(|e| MarketError::ParseError(format!("Gamma listing response: {e}")))?;

    let now = OffsetDateTime::now_utc().unix_timestamp();
    let pattern = slug_pattern(coin)?;

    let mut candidates: Vec<(i64, String)> = markets
        .into_iter()
        .filter_map(|m| m.slug)
        .filter_map(|slug| {
            let ts = pattern
                .captures(&slug)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<i64>().ok())?;
            (now < ts + PairedMarket::WINDOW_SECONDS).then_some((ts, slug))
        })
        .collect();

    if candidates.is_empty() {
        return Err(MarketError::NoActiveMarketFound {
            coin: coin.to_string(),
        });
    }

    // Earliest open window first; it has the most liquidity.
    candidates.sort_by_key(|(ts, _)| *ts);
    let (_, slug) = candidates.remove(0);
    fetch_market_from_slug(client, &slug).await
}

/// Fetch and validate a paired market from its slug.
#[instrument(skip(client))]
pub async fn fetch_market_from_slug(
    client: &reqwest::Client,
    slug: &str,
) -> Result<PairedMarket, MarketError> {
    let response = client
        .get(GAMMA_API_URL)
        .query(&[("slug", slug)])
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(MarketError::FetchFailed {
            slug: slug.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let markets: Vec<MarketData> = response
        .json()
        .await
        .map_err(|e| MarketError::ParseError(format!("Gamma market response: {e}")))?;

    let data = markets
        .into_iter()
        .find(|m| m.slug.as_deref() == Some(slug))
        .ok_or_else(|| MarketError::FetchFailed {
            slug: slug.to_string(),
            reason: "Slug not in Gamma response".to_string(),
        })?;

    build_market(slug, data)
}

fn build_market(slug: &str, data: MarketData) -> Result<PairedMarket, MarketError> {
    let tokens = data
        .clob_token_ids
        .ok_or_else(|| MarketError::ParseError("No clobTokenIds".to_string()))?;
    if tokens.len() != 2 {
        return Err(MarketError::ParseError(format!(
            "Expected 2 token IDs, got {}",
            tokens.len()
        )));
    }

    let start_timestamp = window_timestamp(slug).ok_or_else(|| {
        MarketError::ParseError(format!("No window timestamp in slug {slug}"))
    })?;

    let mut tokens = tokens.into_iter();
    let up_token_id = tokens.next().unwrap_or_default();
    let down_token_id = tokens.next().unwrap_or_default();

    Ok(PairedMarket {
        slug: slug.to_string(),
        id: data.id.unwrap_or_default(),
        up_token_id,
        down_token_id,
        start_timestamp,
        end_timestamp: start_timestamp + PairedMarket::WINDOW_SECONDS,
        tick_size: data.min_tick_size.unwrap_or(dec!(0.01)),
        min_order_size: data.min_order_size.unwrap_or(dec!(5)),
        question: data.question,
    })
}

fn slug_pattern(coin: Coin) -> Result<Regex, MarketError> {
    Regex::new(&format!(r"^{}-updown-15m-(\d+)$", coin.slug_prefix()))
        .map_err(|e| MarketError::ParseError(e.to_string()))
}

/// Extract the window start timestamp from a slug.
fn window_timestamp(slug: &str) -> Option<i64> {
    slug.rsplit('-').next()?.parse().ok()
}

/// Refuse a market whose window has already closed. Used for pinned
/// slugs; discovery filters closed windows itself.
pub fn ensure_open(market: PairedMarket) -> Result<PairedMarket, MarketError> {
    if market.is_closed() {
        return Err(MarketError::MarketClosed { slug: market.slug });
    }
    Ok(market)
}

/// Slug of the window following the given one.
pub fn next_slug(slug: &str) -> Result<String, MarketError> {
    let ts = window_timestamp(slug).ok_or_else(|| {
        MarketError::ParseError(format!("Slug not in expected format: {slug}"))
    })?;
    let prefix = &slug[..slug.len() - ts.to_string().len()];
    Ok(format!("{}{}", prefix, ts + PairedMarket::WINDOW_SECONDS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn next_slug_increments_by_one_window() {
        assert_eq!(
            next_slug("btc-updown-15m-1765301400").unwrap(),
            "btc-updown-15m-1765302300"
        );
        assert_eq!(
            next_slug("eth-updown-15m-900").unwrap(),
            "eth-updown-15m-1800"
        );
    }

    #[test]
    fn ensure_open_rejects_a_closed_window() {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let market = |end| PairedMarket {
            slug: "btc-updown-15m-900".to_string(),
            id: "m1".to_string(),
            up_token_id: "u".to_string(),
            down_token_id: "d".to_string(),
            start_timestamp: end - PairedMarket::WINDOW_SECONDS,
            end_timestamp: end,
            tick_size: dec!(0.01),
            min_order_size: dec!(5),
            question: None,
        };

        assert!(ensure_open(market(now + 600)).is_ok());
        let err = ensure_open(market(now - 600)).unwrap_err();
        assert!(matches!(err, MarketError::MarketClosed { .. }));
    }

    #[test]
    fn slug_pattern_matches_only_its_coin() {
        let pattern = slug_pattern(Coin::Btc).unwrap();
        assert!(pattern.is_match("btc-updown-15m-1765301400"));
        assert!(!pattern.is_match("eth-updown-15m-1765301400"));
        assert!(!pattern.is_match("btc-updown-1h-1765301400"));
    }

    #[test]
    fn build_market_requires_two_tokens() {
        let data = MarketData {
            slug: Some("btc-updown-15m-900".to_string()),
            id: Some("m1".to_string()),
            clob_token_ids: Some(vec!["only-one".to_string()]),
            outcomes: None,
            question: None,
            start_date: None,
            end_date: None,
            min_tick_size: None,
            min_order_size: None,
        };
        assert!(build_market("btc-updown-15m-900", data).is_err());
    }

    #[test]
    fn build_market_fills_window_and_defaults() {
        let data = MarketData {
            slug: Some("btc-updown-15m-900".to_string()),
            id: Some("m1".to_string()),
            clob_token_ids: Some(vec!["up-tok".to_string(), "down-tok".to_string()]),
            outcomes: None,
            question: Some("Up or down?".to_string()),
            start_date: None,
            end_date: None,
            min_tick_size: None,
            min_order_size: None,
        };
        let market = build_market("btc-updown-15m-900", data).unwrap();
        assert_eq!(market.start_timestamp, 900);
        assert_eq!(market.end_timestamp, 1800);
        assert_eq!(market.tick_size, rust_decimal_macros::dec!(0.01));
        assert_eq!(market.up_token_id, "up-tok");
    }

    #[test]
    fn stringified_token_ids_parse() {
        let json = r#"{"slug":"btc-updown-15m-900","clobTokenIds":"[\"a\",\"b\"]"}"#;
        let data: MarketData = serde_json::from_str(json).unwrap();
        assert_eq!(
            data.clob_token_ids,
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }
}
