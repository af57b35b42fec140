//! Cross-DEX spread arbitrage bot
//!
//! Main entry point. Loads configuration, connects to the chain, then runs one
//! polling task per token until SIGINT/SIGTERM.
//!
//! Architecture:
//! - DexScreener feed -> QuoteNormalizer -> OpportunityDetector -> SwapPlanner -> ExecutionEngine
//! - Every chain call goes through the retry policy (RPC_MAX_RETRIES, RPC_BACKOFF_FACTOR)
//! - Shutdown aborts polling and quoting; an attempt already executing finishes first
//!
//! Created: 2026-01-27
//! Modified: 2026-02-03 - Per-token monitors, signal-driven shutdown, --dry-run

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use spreadarb_bot::arbitrage::{
    CooldownState, DetectorThresholds, ExecutionEngine, ExecutionSettings, OpportunityDetector,
    PlannerSettings, SwapPlanner, TradeLog,
};
use spreadarb_bot::config::load_config_from_file;
use spreadarb_bot::feed::DexScreenerFeed;
use spreadarb_bot::monitor::{Monitor, MonitorSettings};
use spreadarb_bot::pool::{QuoteNormalizer, RemoteQuoter};
use spreadarb_bot::rpc::{AlloyChainClient, LocalKeySigner, RetryPolicy, TransactionSigner};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Cross-DEX spread arbitrage bot
#[derive(Parser)]
#[command(name = "spreadarb-bot")]
struct Args {
    /// Env file to load before reading the environment
    #[arg(long, env = "ENV_FILE", default_value = ".env")]
    env_file: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Detect and plan only, never submit transactions
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    info!("Spread Arbitrage Bot starting...");

    // ConfigError is the only fatal error
    let config = load_config_from_file(&args.env_file).context("Invalid configuration")?;
    info!("Configuration loaded from {}", args.env_file);
    info!("Tokens: {:?}", config.token_addresses);
    info!("Base currency: {:?}", config.base_currency_address);
    info!("Routers: {}", config.routers.len());
    info!(
        "Trade size: {} base | min spread {:.2}% | slippage {:.2}%",
        config.trade_amount_base_token, config.min_spread_percent, config.slippage_tolerance_percent
    );

    let signer = LocalKeySigner::from_private_key(&config.private_key)
        .context("PRIVATE_KEY is not a valid secp256k1 key")?;
    info!("Wallet loaded: {:?}", signer.address());

    let chain = Arc::new(AlloyChainClient::connect(&config.rpc_url).await?);
    let retry = RetryPolicy::from_config(&config);
    info!(
        "RPC retry budget: {} attempts, backoff {:?}",
        retry.max_attempts,
        retry.schedule()
    );

    let trade_log = match &config.trade_log_path {
        Some(path) => {
            info!("Trade log: {}", path);
            TradeLog::with_file(path)?
        }
        None => TradeLog::in_memory(),
    };

    let engine = Arc::new(ExecutionEngine::new(
        chain.clone(),
        Arc::new(signer),
        retry,
        ExecutionSettings::from_config(&config),
        Arc::new(CooldownState::new(config.trade_cooldown)),
        trade_log,
    ));

    let quoter = Arc::new(RemoteQuoter::new(chain, retry));
    let monitor = Arc::new(Monitor::new(
        Arc::new(DexScreenerFeed::from_config(&config)?),
        QuoteNormalizer::new(config.routers.clone(), quoter, config.max_safe_trade_fraction),
        OpportunityDetector::new(DetectorThresholds::from_config(&config)),
        SwapPlanner::new(PlannerSettings::from_config(&config)),
        engine,
        MonitorSettings {
            poll_interval: config.poll_interval(),
            dry_run: args.dry_run,
        },
    ));

    if args.dry_run {
        info!("DRY RUN mode: opportunities are planned and logged, never submitted");
    } else {
        warn!("LIVE TRADING MODE ENABLED - REAL MONEY AT RISK!");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let signals_handle = signals.handle();
    tokio::spawn(async move {
        if let Some(sig) = signals.next().await {
            info!("Received signal {}, shutting down", sig);
            let _ = shutdown_tx.send(true);
        }
    });

    let tasks: Vec<_> = config
        .token_addresses
        .iter()
        .map(|&token| tokio::spawn(monitor.clone().run(token, shutdown_rx.clone())))
        .collect();
    info!("Started {} token monitor(s)", tasks.len());

    for result in futures::future::join_all(tasks).await {
        if let Err(e) = result {
            error!("Token monitor panicked: {}", e);
        }
    }
    signals_handle.close();

    let partial = monitor.engine().trade_log().partially_executed_count();
    if partial > 0 {
        warn!(
            "{} partially executed attempt(s) this session; check the wallet for unsold tokens",
            partial
        );
    }
    info!("Shutdown complete");
    Ok(())
}
