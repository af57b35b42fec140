//! DexScreener price feed
//!
//! GET {PRICE_FEED_URL}/{token} returns every pair the token trades in, on
//! every chain. Pairs are kept when they sit on CHAIN_NAME and pair the token
//! with BASE_CURRENCY_ADDRESS; everything else is dropped.
//!
//! Created: 2026-02-03

use crate::config::BotConfig;
use crate::errors::FeedError;
use crate::feed::PriceFeed;
use crate::types::{PoolLiquidity, PoolSnapshot};
use alloy::primitives::Address;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct TokenPairsResponse {
    #[serde(default)]
    pub pairs: Option<Vec<RawPair>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPair {
    pub chain_id: String,
    pub dex_id: String,
    pub pair_address: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub base_token: RawToken,
    pub quote_token: RawToken,
    #[serde(default)]
    pub price_native: Option<String>,
    #[serde(default)]
    pub price_usd: Option<String>,
    #[serde(default)]
    pub liquidity: Option<RawLiquidity>,
    #[serde(default)]
    pub volume: Option<RawVolume>,
}

#[derive(Debug, Deserialize)]
pub struct RawToken {
    pub address: String,
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawLiquidity {
    #[serde(default)]
    pub usd: Option<f64>,
    #[serde(default)]
    pub base: Option<f64>,
    #[serde(default)]
    pub quote: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawVolume {
    #[serde(default)]
    pub h24: Option<f64>,
}

pub struct DexScreenerFeed {
    client: Client,
    base_url: String,
    chain_name: String,
    base_currency: Address,
}

impl DexScreenerFeed {
    pub fn new(base_url: &str, chain_name: &str, base_currency: Address) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent("spreadarb-bot/0.1")
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            chain_name: chain_name.to_string(),
            base_currency,
        })
    }

    pub fn from_config(config: &BotConfig) -> Result<Self, FeedError> {
        Self::new(
            &config.price_feed_url,
            &config.chain_name,
            config.base_currency_address,
        )
    }

    /// Map a raw response to snapshots of `token` against the base currency
    pub fn snapshots_from(
        &self,
        response: TokenPairsResponse,
        token: Address,
        observed_at: DateTime<Utc>,
    ) -> Vec<PoolSnapshot> {
        let pairs = response.pairs.unwrap_or_default();
        let total = pairs.len();
        let snapshots: Vec<PoolSnapshot> = pairs
            .into_iter()
            .filter(|p| p.chain_id.eq_ignore_ascii_case(&self.chain_name))
            .filter_map(|p| to_snapshot(p, token, self.base_currency, observed_at))
            .collect();
        debug!(
            "{:?}: {} of {} feed pairs usable on {}",
            token,
            snapshots.len(),
            total,
            self.chain_name
        );
        snapshots
    }
}

#[async_trait]
impl PriceFeed for DexScreenerFeed {
    async fn fetch_snapshots(&self, token: Address) -> Result<Vec<PoolSnapshot>, FeedError> {
        let url = format!("{}/{:?}", self.base_url, token);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let body: TokenPairsResponse = response
            .json()
            .await
            .map_err(|e| FeedError::Payload(e.to_string()))?;

        Ok(self.snapshots_from(body, token, Utc::now()))
    }
}

fn parse_addr(raw: &str) -> Option<Address> {
    Address::from_str(raw.trim()).ok()
}

fn parse_price(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|s| s.parse::<f64>().ok())
        .filter(|p| p.is_finite() && *p > 0.0)
}

/// `None` when the pair does not match the token/base combination or lacks a usable price
fn to_snapshot(
    pair: RawPair,
    token: Address,
    base_currency: Address,
    observed_at: DateTime<Utc>,
) -> Option<PoolSnapshot> {
    let pair_base = parse_addr(&pair.base_token.address)?;
    let pair_quote = parse_addr(&pair.quote_token.address)?;
    let pair_address = match parse_addr(&pair.pair_address) {
        Some(a) => a,
        None => {
            warn!("{}: unparseable pair address {}", pair.dex_id, pair.pair_address);
            return None;
        }
    };

    let price_native = parse_price(pair.price_native.as_deref())?;
    let price_usd = parse_price(pair.price_usd.as_deref());
    let liquidity = pair.liquidity.unwrap_or_default();

    // priceNative is the pair's base token quoted in its quote token
    let token_is_base = if pair_base == token && pair_quote == base_currency {
        true
    } else if pair_base == base_currency && pair_quote == token {
        false
    } else {
        return None;
    };

    let (price_in_base, base_price_usd, reserve_token, reserve_base) = if token_is_base {
        (
            price_native,
            price_usd.map(|usd| usd / price_native),
            liquidity.base,
            liquidity.quote,
        )
    } else {
        (1.0 / price_native, price_usd, liquidity.quote, liquidity.base)
    };

    let concentrated = pair.labels.iter().any(|l| l.eq_ignore_ascii_case("v3"));
    let pool_liquidity = if concentrated {
        PoolLiquidity::Concentrated { pool: pair_address }
    } else {
        match (reserve_token, reserve_base) {
            (Some(token), Some(base)) if token > 0.0 && base > 0.0 => {
                PoolLiquidity::Reserves { token, base }
            }
            _ => {
                debug!("{}: no reserves reported, skipping pair {:?}", pair.dex_id, pair_address);
                return None;
            }
        }
    };

    Some(PoolSnapshot {
        dex_id: pair.dex_id,
        labels: pair.labels.into_iter().map(|l| l.to_ascii_lowercase()).collect(),
        pair_address,
        token_address: token,
        base_currency_address: base_currency,
        liquidity: pool_liquidity,
        price_in_base,
        base_price_usd: base_price_usd.unwrap_or(0.0),
        liquidity_usd: liquidity.usd.unwrap_or(0.0),
        volume_24h_usd: pair.volume.and_then(|v| v.h24).unwrap_or(0.0),
        fee_bps: None,
        observed_at,
    })
}
