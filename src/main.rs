//! Paired-outcome arbitrage engine entry point.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use updown_arb::api::{create_router, AppState};
use updown_arb::config::Config;
use updown_arb::error::EngineError;
use updown_arb::execution::Venue;
use updown_arb::feed::{MarketFeed, ReconnectConfig};
use updown_arb::market::{
    discover_active_market, ensure_open, fetch_market_from_slug, Coin, PairedMarket, VenueClient,
};
use updown_arb::metrics;
use updown_arb::session::{SessionController, SessionEvent, TerminationReason};
use updown_arb::signing::address_from_private_key;
use updown_arb::utils::shutdown_signal;

/// Paired UP/DOWN arbitrage engine for 15-minute markets.
#[derive(Parser, Debug)]
#[command(name = "updown-arb")]
#[command(about = "Buys both sides of 15-minute UP/DOWN markets when the spread pays")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// Run in dry-run mode (no real orders).
    #[arg(long)]
    dry_run: Option<bool>,

    /// HTTP server port for health/metrics.
    #[arg(short, long, default_value = "8080")]
    port: u16,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the engine loop (default).
    Run {
        /// Run in dry-run mode (no real orders).
        #[arg(long)]
        dry_run: Option<bool>,

        /// HTTP server port for health/metrics.
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Coin to trade (overrides COIN from the environment).
        #[arg(long)]
        coin: Option<String>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Check wallet balance and connection.
    CheckBalance,

    /// Discover the current active 15min market.
    DiscoverMarket {
        /// Coin to look up.
        #[arg(long, default_value = "BTC")]
        coin: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("updown_arb=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::CheckBalance) => cmd_check_balance().await,
        Some(Command::DiscoverMarket { coin }) => cmd_discover_market(&coin).await,
        Some(Command::Run {
            dry_run,
            port,
            coin,
        }) => cmd_run(dry_run, port, coin).await,
        None => cmd_run(args.dry_run, args.port, None).await,
    }
}

/// Check configuration validity.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("UP/DOWN ARB ENGINE - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    if !config.dry_run {
        print!("Checking private key... ");
        match address_from_private_key(&config.private_key) {
            Ok(addr) => {
                println!("OK");
                println!("  Wallet address: {}", addr);
            }
            Err(e) => {
                println!("FAILED");
                println!("  Error: {}", e);
                return Err(anyhow::anyhow!("Private key invalid"));
            }
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Coin: {}", config.coin);
    println!("  Min Spread: ${}", config.min_spread);
    println!("  Price Buffer: ${}", config.price_buffer);
    println!("  Order Size: {} shares", config.order_size);
    println!("  Max Trades/Session: {}", config.max_trades);
    println!("  Max Trade Size: {} shares", config.max_trade_size);
    println!("  Cooldown: {}s", config.cooldown_seconds);
    println!("  Partial Fill Policy: {:?}", config.partial_fill_policy);
    println!(
        "  Flash Crash: ${} drop over {}s",
        config.flash_crash_drop, config.flash_crash_window_seconds
    );
    println!("  Dry Run: {}", config.dry_run);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Check wallet balance and connection.
async fn cmd_check_balance() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("UP/DOWN ARB ENGINE - BALANCE CHECK");
    println!("======================================================================");

    let config = Config::load()?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    println!("Host: {}", config.clob_url);
    println!("Signature Type: {}", config.signature_type);
    println!("======================================================================");

    print!("\n1. Creating client... ");
    let client = VenueClient::new(&config)?;
    println!("OK");

    print!("\n2. Getting wallet address... ");
    let address = client.address()?;
    println!("OK");
    println!("   Address: {}", address);

    print!("\n3. Getting collateral balance... ");
    match client.balance().await {
        Ok(balance) => {
            println!("OK");
            println!("   Balance: ${:.6}", balance);
        }
        Err(e) => {
            println!("FAILED");
            println!("   Error: {}", e);
        }
    }

    print!("\n4. Getting positions... ");
    match client.positions().await {
        Ok(positions) => {
            println!("OK");
            println!("   Total positions: {}", positions.len());
            for pos in positions.iter().take(5) {
                let short_id = if pos.token_id.len() > 20 {
                    format!("{}...", &pos.token_id[..20])
                } else {
                    pos.token_id.clone()
                };
                println!("   - Token: {} Size: {}", short_id, pos.size);
            }
            if positions.len() > 5 {
                println!("   ... and {} more", positions.len() - 5);
            }
        }
        Err(e) => {
            println!("FAILED");
            println!("   Error: {}", e);
        }
    }

    println!("\n======================================================================");
    println!("BALANCE CHECK COMPLETED");
    println!("======================================================================");

    Ok(())
}

/// Discover the current active 15min market for a coin.
async fn cmd_discover_market(coin: &str) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("UP/DOWN ARB ENGINE - MARKET DISCOVERY");
    println!("======================================================================");

    let coin = Coin::from_str(coin).map_err(|_| anyhow::anyhow!("Unknown coin: {coin}"))?;

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    println!("\nSearching for active {coin} 15min market...\n");

    match discover_active_market(&http_client, coin).await {
        Ok(market) => {
            println!("MARKET FOUND");
            println!("----------------------------------------------------------------------");
            println!("  Slug: {}", market.slug);
            println!("  ID: {}", market.id);
            println!("  UP Token: {}", market.up_token_id);
            println!("  DOWN Token: {}", market.down_token_id);
            println!("  Tick Size: {}", market.tick_size);
            println!("  Time Remaining: {}", market.time_remaining_str());
            if let Some(q) = &market.question {
                println!("  Question: {}", q);
            }
            println!("======================================================================");
        }
        Err(e) => {
            println!("NO ACTIVE MARKET FOUND");
            println!("  Error: {}", e);
            println!("\nMarkets open every 15 minutes. Try again shortly.");
            println!("======================================================================");
        }
    }

    Ok(())
}

/// Run the engine: one session per market window until shut down.
async fn cmd_run(
    dry_run_override: Option<bool>,
    port: u16,
    coin_override: Option<String>,
) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let mut config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Some(dry_run) = dry_run_override {
        config.dry_run = dry_run;
    }
    if let Some(coin) = coin_override {
        config.coin = coin;
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    let coin = Coin::from_str(&config.coin)
        .map_err(|_| anyhow::anyhow!("Unknown coin: {}", config.coin))?;

    info!(
        mode = if config.dry_run { "SIMULATION" } else { "LIVE TRADING" },
        coin = %coin,
        min_spread = %config.min_spread,
        order_size = %config.order_size,
        "Configuration loaded"
    );

    // Metrics recorder; the scrape handle goes to the HTTP API.
    let mut app_state = AppState::new();
    match metrics::init_metrics() {
        Ok(handle) => {
            app_state = app_state.with_metrics(handle);
        }
        Err(e) => {
            warn!(error = %e, "Metrics recorder not installed");
        }
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    let venue: Arc<dyn Venue> = Arc::new(VenueClient::new(&config)?);
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    info!("Starting engine...");

    loop {
        let market = match find_market(&http_client, &config, coin).await {
            Ok(m) => m,
            Err(e) => {
                warn!("No active market found: {}. Retrying in 30s...", e);
                app_state.set_ready(false);
                tokio::time::sleep(Duration::from_secs(30)).await;
                continue;
            }
        };

        info!(
            slug = %market.slug,
            remaining = %market.time_remaining_str(),
            "Found market"
        );
        *app_state.market_slug.write().await = Some(market.slug.clone());

        let (reason, shutdown) = run_session(&config, &app_state, market, venue.clone()).await;

        app_state.set_ready(false);

        match reason {
            TerminationReason::Fatal(msg) => {
                error!("Session failed fatally: {}", msg);
                return Err(anyhow::anyhow!("fatal session error: {msg}"));
            }
            TerminationReason::SessionLimitReached => {
                info!("Session trade cap reached, rotating to next window");
            }
            TerminationReason::Stopped if shutdown => {
                info!("Shutdown requested, exiting");
                return Ok(());
            }
            TerminationReason::Stopped => {
                info!("Market window closed");
            }
            TerminationReason::FeedClosed => {
                warn!("Feed closed, restarting with next market");
            }
        }

        info!("Searching for next market in 10s...");
        tokio::time::sleep(Duration::from_secs(10)).await;
    }
}

/// Resolve the market to trade: a pinned slug when configured,
/// discovery otherwise.
async fn find_market(
    http_client: &reqwest::Client,
    config: &Config,
    coin: Coin,
) -> Result<PairedMarket, EngineError> {
    let market = match &config.market_slug {
        Some(slug) => ensure_open(fetch_market_from_slug(http_client, slug).await?)?,
        None => discover_active_market(http_client, coin).await?,
    };
    Ok(market)
}

/// Run one session over one market window. Returns the termination
/// reason and whether a process shutdown was requested.
async fn run_session(
    config: &Config,
    app_state: &AppState,
    market: PairedMarket,
    venue: Arc<dyn Venue>,
) -> (TerminationReason, bool) {
    let window_remaining = market.time_remaining().unwrap_or(Duration::from_secs(0));

    let (mut controller, session_tx) = SessionController::new(config, market.clone(), venue);
    controller.share_stats(app_state.stats.clone());

    // Feed task: WebSocket events flow into the session queue.
    let reconnect = ReconnectConfig::from_config(config.ws_reconnect_max_delay_s);
    let feed = Arc::new(MarketFeed::with_reconnect_config(
        config.ws_url.clone(),
        reconnect,
    ));
    let asset_ids = vec![market.up_token_id.clone(), market.down_token_id.clone()];
    let mut feed_rx = feed.run_with_reconnect(asset_ids).await;

    let forward_tx = session_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = feed_rx.recv().await {
            if forward_tx.send(SessionEvent::Book(event)).await.is_err() {
                break;
            }
        }
    });

    // Stop the session when the window closes.
    let close_tx = session_tx.clone();
    let closer = tokio::spawn(async move {
        tokio::time::sleep(window_remaining).await;
        let _ = close_tx.send(SessionEvent::Stop).await;
    });

    app_state.set_ready(true);

    let run_fut = controller.run();
    tokio::pin!(run_fut);

    let mut shutdown = false;
    let (reason, stats) = tokio::select! {
        result = &mut run_fut => result,
        _ = shutdown_signal() => {
            shutdown = true;
            let _ = session_tx.send(SessionEvent::Stop).await;
            run_fut.await
        }
    };

    forwarder.abort();
    closer.abort();

    info!(
        market = %market.slug,
        trades = stats.trades_executed,
        opportunities = stats.opportunities_seen,
        profit = %stats.cumulative_profit,
        invested = %stats.total_invested,
        return_pct = %stats.return_pct(),
        "Session summary"
    );

    (reason, shutdown)
}
