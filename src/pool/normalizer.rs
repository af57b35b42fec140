//! Quote Normalizer
//!
//! Turns one PoolSnapshot plus its router entry into a `NormalizedQuote`:
//! a comparable base-per-token price, a USD cap on trade size and a quote
//! function. Reserve pools (uniswapV2, solidly) are priced locally; v3 and
//! aggregator venues delegate to the chain through the retry policy.
//!
//! Created: 2026-02-03

use crate::config::RouterRegistry;
use crate::errors::{QuoteUnavailable, RpcError};
use crate::pool::calculator::{price_impact_bps, PriceCalculator, SwapCurve, DEFAULT_V2_FEE_BPS};
use crate::rpc::{ChainRpc, QuoteRequest, QuoteVenue, RetryPolicy};
use crate::types::{PoolLiquidity, PoolSnapshot, RouterConfig, RouterVenue, SwapQuote, SwapSide};
use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Human amount -> raw token units
pub fn to_raw_units(amount: f64, decimals: u8) -> U256 {
    if !(amount > 0.0) {
        return U256::ZERO;
    }
    U256::from((amount * 10f64.powi(decimals as i32)) as u128)
}

/// Raw token units -> human amount
pub fn from_raw_units(raw: U256, decimals: u8) -> f64 {
    raw.saturating_to::<u128>() as f64 / 10f64.powi(decimals as i32)
}

/// External quoting capability: token metadata and quote calls, each under the retry policy
pub struct RemoteQuoter {
    chain: Arc<dyn ChainRpc>,
    retry: RetryPolicy,
}

impl fmt::Debug for RemoteQuoter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RemoteQuoter")
            .field("chain_id", &self.chain.chain_id())
            .field("retry", &self.retry)
            .finish()
    }
}

impl RemoteQuoter {
    pub fn new(chain: Arc<dyn ChainRpc>, retry: RetryPolicy) -> Self {
        Self { chain, retry }
    }

    pub async fn decimals(&self, token: Address) -> Result<u8, RpcError> {
        self.retry
            .run("token_decimals", || self.chain.token_decimals(token))
            .await
    }

    pub async fn fee_tier(&self, pool: Address) -> Result<u32, RpcError> {
        self.retry
            .run("pool_fee_tier", || self.chain.pool_fee_tier(pool))
            .await
    }

    /// Quote `amount_in` (human units) and return human units of `token_out`
    pub async fn quote(
        &self,
        venue: QuoteVenue,
        token_in: Address,
        token_out: Address,
        amount_in: f64,
    ) -> Result<f64, RpcError> {
        let decimals_in = self.decimals(token_in).await?;
        let decimals_out = self.decimals(token_out).await?;
        let request = QuoteRequest {
            venue,
            token_in,
            token_out,
            amount_in: to_raw_units(amount_in, decimals_in),
        };
        let raw_out = self.retry.run("quote", || self.chain.quote(&request)).await?;
        Ok(from_raw_units(raw_out, decimals_out))
    }
}

#[derive(Debug, Clone)]
enum Pricing {
    Local { curve: SwapCurve, fee_bps: u32 },
    Remote { venue: QuoteVenue, quoter: Arc<RemoteQuoter> },
}

/// Comparable view of one venue for one token, valid for a single polling cycle
#[derive(Debug, Clone)]
pub struct NormalizedQuote {
    pub dex_id: String,
    pub router: RouterConfig,
    /// Source observation (liquidity, volume and timestamp filters read it)
    pub snapshot: PoolSnapshot,
    /// Base per token
    pub price_in_base: f64,
    pub max_safe_tradable_usd: f64,
    pricing: Pricing,
}

impl NormalizedQuote {
    /// Locally priced quote from reserves
    pub fn local(
        snapshot: &PoolSnapshot,
        router: &RouterConfig,
        curve: SwapCurve,
        max_safe_trade_fraction: f64,
    ) -> Result<Self, QuoteUnavailable> {
        let (reserve_token, reserve_base) = snapshot
            .reserves()
            .filter(|(t, b)| *t > 0.0 && *b > 0.0)
            .ok_or_else(|| QuoteUnavailable::new(&snapshot.dex_id, "snapshot carries no usable reserves"))?;

        let fee_bps = snapshot
            .fee_bps
            .or(router.fee_bps)
            .unwrap_or(DEFAULT_V2_FEE_BPS);

        Ok(Self {
            dex_id: snapshot.dex_id.clone(),
            router: router.clone(),
            snapshot: snapshot.clone(),
            price_in_base: PriceCalculator::spot_price(curve, reserve_token, reserve_base),
            max_safe_tradable_usd: snapshot.liquidity_usd * max_safe_trade_fraction,
            pricing: Pricing::Local { curve, fee_bps },
        })
    }

    /// Quote delegated to the chain; the price comes from the snapshot
    pub fn remote(
        snapshot: &PoolSnapshot,
        router: &RouterConfig,
        venue: QuoteVenue,
        quoter: Arc<RemoteQuoter>,
        max_safe_trade_fraction: f64,
    ) -> Result<Self, QuoteUnavailable> {
        if !(snapshot.price_in_base.is_finite() && snapshot.price_in_base > 0.0) {
            return Err(QuoteUnavailable::new(&snapshot.dex_id, "snapshot has no price"));
        }
        Ok(Self {
            dex_id: snapshot.dex_id.clone(),
            router: router.clone(),
            snapshot: snapshot.clone(),
            price_in_base: snapshot.price_in_base,
            max_safe_tradable_usd: snapshot.liquidity_usd * max_safe_trade_fraction,
            pricing: Pricing::Remote { venue, quoter },
        })
    }

    pub fn liquidity_usd(&self) -> f64 {
        self.snapshot.liquidity_usd
    }

    pub fn volume_24h_usd(&self) -> f64 {
        self.snapshot.volume_24h_usd
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.snapshot.observed_at
    }

    /// Fee the pool charges, in bps. V3 tiers are hundredths of a bip.
    pub fn fee_bps(&self) -> f64 {
        match &self.pricing {
            Pricing::Local { fee_bps, .. } => *fee_bps as f64,
            Pricing::Remote { venue: QuoteVenue::Concentrated { fee_tier, .. }, .. } => {
                *fee_tier as f64 / 100.0
            }
            Pricing::Remote { .. } => self.snapshot.fee_bps.or(self.router.fee_bps).unwrap_or(0) as f64,
        }
    }

    /// V3 pool fee tier, needed to build the swap call
    pub fn fee_tier(&self) -> Option<u32> {
        match &self.pricing {
            Pricing::Remote { venue: QuoteVenue::Concentrated { fee_tier, .. }, .. } => Some(*fee_tier),
            _ => None,
        }
    }

    /// Route flag for Solidly swaps: true when the pool is priced on the stable curve
    pub fn stable_route(&self) -> bool {
        matches!(self.router.venue, RouterVenue::Solidly)
            && matches!(self.pricing, Pricing::Local { curve: SwapCurve::StableSwap, .. })
    }

    /// (token_in, token_out) for a swap on this venue
    pub fn path(&self, side: SwapSide) -> (Address, Address) {
        match side {
            SwapSide::Buy => (self.snapshot.base_currency_address, self.snapshot.token_address),
            SwapSide::Sell => (self.snapshot.token_address, self.snapshot.base_currency_address),
        }
    }

    /// Largest input amount allowed on `side`, in human units of the input asset
    pub fn max_safe_amount_in(&self, side: SwapSide) -> f64 {
        let base_usd = self.snapshot.base_price_usd;
        if !(base_usd > 0.0 && self.price_in_base > 0.0) {
            return 0.0;
        }
        match side {
            SwapSide::Buy => self.max_safe_tradable_usd / base_usd,
            SwapSide::Sell => self.max_safe_tradable_usd / (self.price_in_base * base_usd),
        }
    }

    /// Spot output per unit of input on `side`
    fn spot(&self, side: SwapSide) -> f64 {
        match side {
            SwapSide::Buy => 1.0 / self.price_in_base,
            SwapSide::Sell => self.price_in_base,
        }
    }

    /// Quote `amount_in` (human units of the input asset)
    pub async fn quote(&self, side: SwapSide, amount_in: f64) -> Result<SwapQuote, QuoteUnavailable> {
        match &self.pricing {
            Pricing::Local { curve, fee_bps } => {
                let (reserve_token, reserve_base) = match self.snapshot.liquidity {
                    PoolLiquidity::Reserves { token, base } => (token, base),
                    PoolLiquidity::Concentrated { .. } => {
                        return Err(QuoteUnavailable::new(&self.dex_id, "no reserves"))
                    }
                };
                let (reserve_in, reserve_out) = match side {
                    SwapSide::Buy => (reserve_base, reserve_token),
                    SwapSide::Sell => (reserve_token, reserve_base),
                };
                let quote = PriceCalculator::quote(*curve, amount_in, reserve_in, reserve_out, *fee_bps);
                if quote.amount_out <= 0.0 {
                    return Err(QuoteUnavailable::new(&self.dex_id, "zero output"));
                }
                Ok(quote)
            }
            Pricing::Remote { venue, quoter } => {
                let (token_in, token_out) = self.path(side);
                let amount_out = quoter
                    .quote(*venue, token_in, token_out, amount_in)
                    .await
                    .map_err(|e| QuoteUnavailable::new(&self.dex_id, e.to_string()))?;
                if amount_out <= 0.0 {
                    return Err(QuoteUnavailable::new(&self.dex_id, "zero output"));
                }
                Ok(SwapQuote {
                    amount_out,
                    price_impact_bps: price_impact_bps(amount_in, amount_out, self.spot(side)),
                })
            }
        }
    }
}

/// Builds NormalizedQuotes for every snapshot of one cycle
pub struct QuoteNormalizer {
    routers: RouterRegistry,
    quoter: Arc<RemoteQuoter>,
    max_safe_trade_fraction: f64,
}

impl QuoteNormalizer {
    pub fn new(routers: RouterRegistry, quoter: Arc<RemoteQuoter>, max_safe_trade_fraction: f64) -> Self {
        Self {
            routers,
            quoter,
            max_safe_trade_fraction,
        }
    }

    pub async fn normalize(&self, snapshot: &PoolSnapshot) -> Result<NormalizedQuote, QuoteUnavailable> {
        let router = self
            .routers
            .find(&snapshot.dex_id, snapshot.version_label())
            .ok_or_else(|| QuoteUnavailable::new(&snapshot.dex_id, "no router configured"))?;

        match &router.venue {
            RouterVenue::UniswapV2 => {
                NormalizedQuote::local(snapshot, router, SwapCurve::ConstantProduct, self.max_safe_trade_fraction)
            }
            RouterVenue::Solidly => {
                let curve = if snapshot.is_volatile() {
                    SwapCurve::ConstantProduct
                } else {
                    SwapCurve::StableSwap
                };
                NormalizedQuote::local(snapshot, router, curve, self.max_safe_trade_fraction)
            }
            RouterVenue::UniswapV3 { quoter, .. } => {
                let pool = match snapshot.liquidity {
                    PoolLiquidity::Concentrated { pool } => pool,
                    PoolLiquidity::Reserves { .. } => snapshot.pair_address,
                };
                let fee_tier = self
                    .quoter
                    .fee_tier(pool)
                    .await
                    .map_err(|e| QuoteUnavailable::new(&snapshot.dex_id, e.to_string()))?;
                NormalizedQuote::remote(
                    snapshot,
                    router,
                    QuoteVenue::Concentrated { quoter: *quoter, fee_tier },
                    self.quoter.clone(),
                    self.max_safe_trade_fraction,
                )
            }
            RouterVenue::Aggregator => NormalizedQuote::remote(
                snapshot,
                router,
                QuoteVenue::Router { router: router.address },
                self.quoter.clone(),
                self.max_safe_trade_fraction,
            ),
        }
    }

    /// Normalize all snapshots concurrently. Venues that fail are skipped for this cycle.
    pub async fn normalize_all(&self, snapshots: &[PoolSnapshot]) -> Vec<NormalizedQuote> {
        let results = join_all(snapshots.iter().map(|s| self.normalize(s))).await;
        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(quote) => Some(quote),
                Err(e) => {
                    debug!("Skipping venue: {}", e);
                    None
                }
            })
            .collect()
    }
}
