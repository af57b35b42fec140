//! Configuration management
//!
//! Loads settings from the environment (.env supported) and validates them once
//! at startup. Any violation is a fatal `ConfigError`; nothing downstream
//! re-checks router shapes.
//!
//! Created: 2026-01-27
//! Modified: 2026-02-03 - DEX_ROUTERS JSON with tagged router kinds, RouterRegistry

use crate::errors::ConfigError;
use crate::types::{RouterConfig, RouterVenue, RouterVersion};
use alloy::primitives::Address;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_FEED_URL: &str = "https://api.dexscreener.com/latest/dex/tokens";

/// Bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    // Tokens
    pub token_addresses: Vec<Address>,
    pub base_currency_address: Address,

    // Network
    pub rpc_url: String,
    pub chain_name: String,
    pub rpc_max_retries: u32,
    pub rpc_backoff_factor: f64,
    pub rpc_call_timeout: Duration,

    // Wallet
    pub private_key: String,

    // Detection thresholds
    pub min_liquidity_usd: f64,
    pub min_volume_usd: f64,
    pub min_spread_percent: f64,
    pub max_snapshot_age: Duration,
    pub max_safe_trade_fraction: f64,

    // Trading parameters
    pub trade_amount_base_token: f64,
    pub slippage_tolerance_percent: f64,
    pub max_gas_limit: u64,
    pub trade_cooldown: Duration,
    pub receipt_timeout: Duration,
    pub receipt_poll_interval: Duration,

    // Feed
    pub price_feed_url: String,
    pub api_calls_per_minute: u32,

    pub routers: RouterRegistry,
    pub trade_log_path: Option<String>,
}

impl BotConfig {
    /// Build a config from any key lookup. `load_config` binds this to the
    /// process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let tokens_raw = get("TOKEN_ADDRESSES")
            .or_else(|| get("TOKEN_ADDRESS"))
            .ok_or(ConfigError::Missing("TOKEN_ADDRESSES"))?;
        let token_addresses = tokens_raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| parse_address("TOKEN_ADDRESSES", s))
            .collect::<Result<Vec<_>, _>>()?;
        if token_addresses.is_empty() {
            return Err(ConfigError::Missing("TOKEN_ADDRESSES"));
        }

        let rpc_url = get("BASE_RPC_URL").ok_or(ConfigError::Missing("BASE_RPC_URL"))?;
        if !["ws://", "wss://", "http://", "https://"]
            .iter()
            .any(|scheme| rpc_url.starts_with(scheme))
        {
            return Err(ConfigError::invalid(
                "BASE_RPC_URL",
                "must start with ws://, wss://, http:// or https://",
            ));
        }

        let private_key = get("PRIVATE_KEY").ok_or(ConfigError::Missing("PRIVATE_KEY"))?;

        let base_currency_address = parse_address(
            "BASE_CURRENCY_ADDRESS",
            &get("BASE_CURRENCY_ADDRESS").ok_or(ConfigError::Missing("BASE_CURRENCY_ADDRESS"))?,
        )?;

        let trade_amount_base_token: f64 = parse_required(&get, "TRADE_AMOUNT_BASE_TOKEN")?;
        if !(trade_amount_base_token > 0.0) {
            return Err(ConfigError::invalid("TRADE_AMOUNT_BASE_TOKEN", "must be > 0"));
        }

        let slippage_tolerance_percent: f64 = parse_or(&get, "SLIPPAGE_TOLERANCE_PERCENT", 1.0)?;
        if !(0.0..100.0).contains(&slippage_tolerance_percent) {
            return Err(ConfigError::invalid("SLIPPAGE_TOLERANCE_PERCENT", "must be in [0, 100)"));
        }

        let rpc_max_retries: u32 = parse_or(&get, "RPC_MAX_RETRIES", 5)?;
        if rpc_max_retries == 0 {
            return Err(ConfigError::invalid("RPC_MAX_RETRIES", "must be >= 1"));
        }
        let rpc_backoff_factor: f64 = parse_or(&get, "RPC_BACKOFF_FACTOR", 0.5)?;
        if !(rpc_backoff_factor >= 0.0) {
            return Err(ConfigError::invalid("RPC_BACKOFF_FACTOR", "must be >= 0"));
        }

        let max_gas_limit: u64 = parse_or(&get, "MAX_GAS_LIMIT", 500_000)?;
        if max_gas_limit == 0 {
            return Err(ConfigError::invalid("MAX_GAS_LIMIT", "must be > 0"));
        }

        let api_calls_per_minute: u32 = parse_or(&get, "API_CALLS_PER_MINUTE", 280)?;
        if api_calls_per_minute == 0 {
            return Err(ConfigError::invalid("API_CALLS_PER_MINUTE", "must be > 0"));
        }

        let rpc_call_timeout_secs: u64 = parse_or(&get, "RPC_CALL_TIMEOUT_SECONDS", 10)?;
        if rpc_call_timeout_secs == 0 {
            return Err(ConfigError::invalid("RPC_CALL_TIMEOUT_SECONDS", "must be > 0"));
        }

        let max_safe_trade_fraction: f64 = parse_or(&get, "MAX_SAFE_TRADE_FRACTION", 0.05)?;
        if !(max_safe_trade_fraction > 0.0 && max_safe_trade_fraction <= 1.0) {
            return Err(ConfigError::invalid("MAX_SAFE_TRADE_FRACTION", "must be in (0, 1]"));
        }

        let routers_raw = get("DEX_ROUTERS").ok_or(ConfigError::Missing("DEX_ROUTERS"))?;
        let routers = RouterRegistry::from_json(&routers_raw)?;

        Ok(BotConfig {
            token_addresses,
            base_currency_address,
            rpc_url,
            chain_name: get("CHAIN_NAME").unwrap_or_else(|| "base".to_string()),
            rpc_max_retries,
            rpc_backoff_factor,
            rpc_call_timeout: Duration::from_secs(rpc_call_timeout_secs),
            private_key,
            min_liquidity_usd: parse_or(&get, "MIN_LIQUIDITY_USD", 1000.0)?,
            min_volume_usd: parse_or(&get, "MIN_VOLUME_USD", 0.0)?,
            min_spread_percent: parse_or(&get, "MIN_SPREAD_PERCENT", 1.0)?,
            max_snapshot_age: Duration::from_secs(parse_or(&get, "MAX_SNAPSHOT_AGE_SECONDS", 30)?),
            max_safe_trade_fraction,
            trade_amount_base_token,
            slippage_tolerance_percent,
            max_gas_limit,
            trade_cooldown: Duration::from_secs(parse_or(&get, "TRADE_COOLDOWN_SECONDS", 60)?),
            receipt_timeout: Duration::from_secs(parse_or(&get, "RECEIPT_TIMEOUT_SECONDS", 120)?),
            receipt_poll_interval: Duration::from_millis(parse_or(
                &get,
                "RECEIPT_POLL_INTERVAL_MS",
                1000,
            )?),
            price_feed_url: get("PRICE_FEED_URL").unwrap_or_else(|| DEFAULT_FEED_URL.to_string()),
            api_calls_per_minute,
            routers,
            trade_log_path: get("TRADE_LOG_PATH"),
        })
    }

    /// Delay between two feed calls of one token task so that all token tasks
    /// together stay within API_CALLS_PER_MINUTE
    pub fn poll_interval(&self) -> Duration {
        let per_call = 60.0 / self.api_calls_per_minute as f64;
        Duration::from_secs_f64(per_call * self.token_addresses.len() as f64)
    }
}

/// Load from the process environment (.env file honoured)
pub fn load_config() -> Result<BotConfig, ConfigError> {
    dotenv::dotenv().ok();
    BotConfig::from_lookup(|key| std::env::var(key).ok())
}

/// Load a specific env file first, then read the environment
pub fn load_config_from_file(path: &str) -> Result<BotConfig, ConfigError> {
    if dotenv::from_filename(path).is_err() {
        debug!("Env file {} not found, using process environment", path);
    }
    BotConfig::from_lookup(|key| std::env::var(key).ok())
}

fn parse_address(key: &'static str, raw: &str) -> Result<Address, ConfigError> {
    Address::from_str(raw.trim())
        .map_err(|e| ConfigError::invalid(key, format!("'{}' is not an address: {}", raw, e)))
}

fn parse_required<T, G>(get: &G, key: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key).ok_or(ConfigError::Missing(key))?;
    raw.parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, format!("'{}': {}", raw, e)))
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(_) => parse_required(get, key),
        None => Ok(default),
    }
}

// ---------------------------------------------------------------------------
// DEX_ROUTERS
// ---------------------------------------------------------------------------

/// `version` accepts 2, 3 or "aggregator"
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawVersion {
    Number(u64),
    Label(String),
}

#[derive(Debug, Deserialize)]
struct RawRouter {
    address: String,
    version: RawVersion,
    #[serde(default, alias = "kind")]
    r#type: Option<String>,
    #[serde(default)]
    factory: Option<String>,
    #[serde(default)]
    quoter: Option<String>,
    #[serde(default, rename = "feeBps")]
    fee_bps: Option<u32>,
}

fn router_address(dex_id: &str, field: &str, raw: &str) -> Result<Address, ConfigError> {
    Address::from_str(raw.trim())
        .map_err(|e| ConfigError::router(dex_id, format!("{} '{}' is not an address: {}", field, raw, e)))
}

fn validate_router(dex_id: &str, raw: RawRouter) -> Result<RouterConfig, ConfigError> {
    let address = router_address(dex_id, "address", &raw.address)?;

    let version = match &raw.version {
        RawVersion::Number(2) => RouterVersion::V2,
        RawVersion::Number(3) => RouterVersion::V3,
        RawVersion::Label(label) if label.eq_ignore_ascii_case("aggregator") => {
            RouterVersion::Aggregator
        }
        RawVersion::Label(label) if label == "2" => RouterVersion::V2,
        RawVersion::Label(label) if label == "3" => RouterVersion::V3,
        other => {
            return Err(ConfigError::router(
                dex_id,
                format!("unsupported version {:?} (expected 2, 3 or \"aggregator\")", other),
            ))
        }
    };

    let kind = raw.r#type.as_deref().map(|k| k.to_ascii_lowercase());

    let factory = raw.factory.as_deref().filter(|s| !s.trim().is_empty());
    let quoter = raw.quoter.as_deref().filter(|s| !s.trim().is_empty());

    if version != RouterVersion::V3 && (factory.is_some() || quoter.is_some()) {
        return Err(ConfigError::router(
            dex_id,
            "factory/quoter are only valid for version 3 routers",
        ));
    }

    let venue = match (version, kind.as_deref()) {
        (RouterVersion::V2, None) | (RouterVersion::V2, Some("uniswapv2")) => RouterVenue::UniswapV2,
        (RouterVersion::V2, Some("solidly")) => RouterVenue::Solidly,
        (RouterVersion::V3, None) | (RouterVersion::V3, Some("uniswapv3")) => {
            let factory = factory.ok_or_else(|| ConfigError::router(dex_id, "version 3 requires factory"))?;
            let quoter = quoter.ok_or_else(|| ConfigError::router(dex_id, "version 3 requires quoter"))?;
            RouterVenue::UniswapV3 {
                factory: router_address(dex_id, "factory", factory)?,
                quoter: router_address(dex_id, "quoter", quoter)?,
            }
        }
        (RouterVersion::Aggregator, None) | (RouterVersion::Aggregator, Some("aggregator")) => {
            RouterVenue::Aggregator
        }
        (version, Some(kind)) => {
            return Err(ConfigError::router(
                dex_id,
                format!("type '{}' is not valid for version {:?}", kind, version),
            ))
        }
    };

    Ok(RouterConfig {
        dex_id: dex_id.to_string(),
        address,
        venue,
        fee_bps: raw.fee_bps,
    })
}

/// Validated DEX_ROUTERS, keyed by dexId
#[derive(Debug, Clone, Default)]
pub struct RouterRegistry {
    routers: BTreeMap<String, RouterConfig>,
}

impl RouterRegistry {
    /// Parse and validate every entry. One bad entry rejects the whole set.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let parsed: BTreeMap<String, RawRouter> = serde_json::from_str(raw)?;
        if parsed.is_empty() {
            return Err(ConfigError::invalid("DEX_ROUTERS", "no routers configured"));
        }

        let mut routers = BTreeMap::new();
        for (dex_id, raw_router) in parsed {
            let router = validate_router(&dex_id, raw_router)?;
            debug!(
                "Router {}: {} v{:?} @ {:?}",
                dex_id,
                router.kind(),
                router.version(),
                router.address
            );
            routers.insert(dex_id, router);
        }
        Ok(Self { routers })
    }

    pub fn len(&self) -> usize {
        self.routers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }

    pub fn get(&self, dex_id: &str) -> Option<&RouterConfig> {
        self.routers.get(dex_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouterConfig> {
        self.routers.values()
    }

    /// Resolve a feed dexId to a router.
    ///
    /// A key matches when either string contains the other. Exact key wins,
    /// then a router whose version matches the pool's version label, then the
    /// highest version.
    pub fn find(&self, dex_id: &str, version_label: Option<&str>) -> Option<&RouterConfig> {
        if let Some(exact) = self.routers.get(dex_id) {
            return Some(exact);
        }

        let candidates: Vec<&RouterConfig> = self
            .routers
            .iter()
            .filter(|(key, _)| dex_id.contains(key.as_str()) || key.contains(dex_id))
            .map(|(_, router)| router)
            .collect();

        if let Some(label) = version_label {
            if let Some(router) = candidates
                .iter()
                .copied()
                .find(|r| r.version().label() == Some(label))
            {
                return Some(router);
            }
        }

        candidates.into_iter().max_by_key(|r| r.version().rank())
    }
}
