//! Core data structures
//!
//! Pool snapshots coming from the price feed, validated router entries,
//! opportunities and the TradeAttempt state machine.
//!
//! Created: 2026-02-03

use alloy::primitives::{Address, TxHash, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pricing mechanics of a venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DexKind {
    UniswapV2,
    Solidly,
    UniswapV3,
    Aggregator,
}

impl DexKind {
    /// Kinds whose quotes are computed locally from reserves
    pub fn is_local(&self) -> bool {
        matches!(self, DexKind::UniswapV2 | DexKind::Solidly)
    }
}

impl fmt::Display for DexKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DexKind::UniswapV2 => write!(f, "uniswapV2"),
            DexKind::Solidly => write!(f, "solidly"),
            DexKind::UniswapV3 => write!(f, "uniswapV3"),
            DexKind::Aggregator => write!(f, "aggregator"),
        }
    }
}

/// Router protocol version as written in DEX_ROUTERS
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RouterVersion {
    V2,
    V3,
    Aggregator,
}

impl RouterVersion {
    /// Preference rank when several routers match one dexId (higher wins)
    pub fn rank(&self) -> u8 {
        match self {
            RouterVersion::V2 => 2,
            RouterVersion::V3 => 3,
            RouterVersion::Aggregator => 1,
        }
    }

    /// Feed label carried by pools of this version, if any
    pub fn label(&self) -> Option<&'static str> {
        match self {
            RouterVersion::V2 => Some("v2"),
            RouterVersion::V3 => Some("v3"),
            RouterVersion::Aggregator => None,
        }
    }
}

/// Kind-specific part of a router entry. V3 is the only kind carrying
/// factory and quoter, so a V3 entry cannot exist without them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RouterVenue {
    UniswapV2,
    Solidly,
    UniswapV3 { factory: Address, quoter: Address },
    Aggregator,
}

/// Validated router entry (one per DEX_ROUTERS key)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub dex_id: String,
    pub address: Address,
    pub venue: RouterVenue,
    /// Default fee for the venue when the pool does not tell us
    pub fee_bps: Option<u32>,
}

impl RouterConfig {
    pub fn kind(&self) -> DexKind {
        match self.venue {
            RouterVenue::UniswapV2 => DexKind::UniswapV2,
            RouterVenue::Solidly => DexKind::Solidly,
            RouterVenue::UniswapV3 { .. } => DexKind::UniswapV3,
            RouterVenue::Aggregator => DexKind::Aggregator,
        }
    }

    pub fn version(&self) -> RouterVersion {
        match self.venue {
            RouterVenue::UniswapV2 | RouterVenue::Solidly => RouterVersion::V2,
            RouterVenue::UniswapV3 { .. } => RouterVersion::V3,
            RouterVenue::Aggregator => RouterVersion::Aggregator,
        }
    }

    pub fn factory(&self) -> Option<Address> {
        match self.venue {
            RouterVenue::UniswapV3 { factory, .. } => Some(factory),
            _ => None,
        }
    }

    pub fn quoter(&self) -> Option<Address> {
        match self.venue {
            RouterVenue::UniswapV3 { quoter, .. } => Some(quoter),
            _ => None,
        }
    }
}

/// Liquidity shape of a pool as seen by the feed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PoolLiquidity {
    /// Human-unit reserves of a full-range pool
    Reserves { token: f64, base: f64 },
    /// Tick-level liquidity lives on chain; the handle is the pool address
    Concentrated { pool: Address },
}

/// One pool observation from the price feed. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub dex_id: String,
    /// Feed labels such as "v2", "v3", "stable"
    pub labels: Vec<String>,
    pub pair_address: Address,
    pub token_address: Address,
    pub base_currency_address: Address,
    pub liquidity: PoolLiquidity,
    /// Tracked token priced in base currency
    pub price_in_base: f64,
    /// USD value of one unit of base currency
    pub base_price_usd: f64,
    pub liquidity_usd: f64,
    pub volume_24h_usd: f64,
    pub fee_bps: Option<u32>,
    pub observed_at: DateTime<Utc>,
}

impl PoolSnapshot {
    pub fn reserves(&self) -> Option<(f64, f64)> {
        match self.liquidity {
            PoolLiquidity::Reserves { token, base } => Some((token, base)),
            PoolLiquidity::Concentrated { .. } => None,
        }
    }

    /// Solidly pools the feed tags "volatile" trade on x*y=k; all others on the stable curve
    pub fn is_volatile(&self) -> bool {
        self.labels.iter().any(|l| l == "volatile")
    }

    pub fn version_label(&self) -> Option<&str> {
        self.labels
            .iter()
            .map(|l| l.as_str())
            .find(|l| matches!(*l, "v2" | "v3"))
    }
}

/// Direction of a swap relative to the tracked token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapSide {
    /// base -> token
    Buy,
    /// token -> base
    Sell,
}

/// Result of a quote function call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwapQuote {
    pub amount_out: f64,
    pub price_impact_bps: f64,
}

/// Cross-venue spread detected for one token in one polling cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub token: Address,
    pub buy_dex: String,
    pub sell_dex: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub spread_percent: f64,
    /// Expected gain in base units for the configured trade size, net of pool fees
    pub estimated_profit_base: f64,
    pub detected_at: DateTime<Utc>,
}

impl Opportunity {
    pub fn spread(buy_price: f64, sell_price: f64) -> f64 {
        ((sell_price - buy_price) / buy_price) * 100.0
    }
}

/// Lifecycle of one leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LegStatus {
    Planned,
    Submitted,
    Confirmed,
    Failed,
    NotAttempted,
}

/// TradeAttempt state machine.
///
/// pending -> leg1Submitted -> leg1Confirmed -> leg2Submitted -> {succeeded | partiallyExecuted}
/// failed is reachable from pending or leg1Submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttemptStatus {
    Pending,
    Leg1Submitted,
    Leg1Confirmed,
    Leg2Submitted,
    Succeeded,
    Failed,
    PartiallyExecuted,
}

impl AttemptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptStatus::Succeeded | AttemptStatus::Failed | AttemptStatus::PartiallyExecuted
        )
    }

    /// Whether the machine may move from `self` to `next`
    pub fn can_transition_to(&self, next: AttemptStatus) -> bool {
        use AttemptStatus::*;
        matches!(
            (self, next),
            (Pending, Leg1Submitted)
                | (Pending, Failed)
                | (Leg1Submitted, Leg1Confirmed)
                | (Leg1Submitted, Failed)
                | (Leg1Confirmed, Leg2Submitted)
                | (Leg1Confirmed, PartiallyExecuted)
                | (Leg2Submitted, Succeeded)
                | (Leg2Submitted, PartiallyExecuted)
        )
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Leg1Submitted => "leg1Submitted",
            AttemptStatus::Leg1Confirmed => "leg1Confirmed",
            AttemptStatus::Leg2Submitted => "leg2Submitted",
            AttemptStatus::Succeeded => "succeeded",
            AttemptStatus::Failed => "failed",
            AttemptStatus::PartiallyExecuted => "partiallyExecuted",
        };
        write!(f, "{}", s)
    }
}

/// One swap transaction of a TradeAttempt.
///
/// Planned amounts are human units. Once a leg is sized from a receipt the
/// `_raw` fields carry the exact on-chain amounts and take precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeLeg {
    pub side: SwapSide,
    pub router: RouterConfig,
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: f64,
    pub expected_amount_out: f64,
    pub min_amount_out: f64,
    #[serde(default)]
    pub amount_in_raw: Option<U256>,
    #[serde(default)]
    pub min_amount_out_raw: Option<U256>,
    /// V3 pool fee tier (hundredths of a bip), only for V3 legs
    pub fee_tier: Option<u32>,
    /// Solidly route flag
    #[serde(default)]
    pub stable: bool,
    pub nonce: Option<u64>,
    pub tx_hash: Option<TxHash>,
    /// Amount of `token_out` credited to the wallet, from the receipt's Transfer logs
    pub amount_received: Option<f64>,
    #[serde(default)]
    pub received_raw: Option<U256>,
    pub status: LegStatus,
}

/// Two-leg trade, created by the planner and driven only by the execution engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeAttempt {
    pub token: Address,
    pub opportunity: Opportunity,
    pub amount_in: f64,
    pub leg1: TradeLeg,
    pub leg2: TradeLeg,
    pub gas_limit: u64,
    pub overall_status: AttemptStatus,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(AttemptStatus::Succeeded.is_terminal());
        assert!(AttemptStatus::Failed.is_terminal());
        assert!(AttemptStatus::PartiallyExecuted.is_terminal());
        assert!(!AttemptStatus::Pending.is_terminal());
        assert!(!AttemptStatus::Leg2Submitted.is_terminal());
    }

    #[test]
    fn test_failed_only_before_leg1_confirms() {
        use AttemptStatus::*;
        assert!(Pending.can_transition_to(Failed));
        assert!(Leg1Submitted.can_transition_to(Failed));
        assert!(!Leg1Confirmed.can_transition_to(Failed));
        assert!(!Leg2Submitted.can_transition_to(Failed));
        assert!(Leg2Submitted.can_transition_to(PartiallyExecuted));
        assert!(!Pending.can_transition_to(Leg2Submitted));
    }

    #[test]
    fn test_spread_percent() {
        let spread = Opportunity::spread(0.002, 0.00205);
        assert!((spread - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_router_accessors() {
        let router = RouterConfig {
            dex_id: "uniswap_v3".to_string(),
            address: Address::repeat_byte(1),
            venue: RouterVenue::UniswapV3 {
                factory: Address::repeat_byte(2),
                quoter: Address::repeat_byte(3),
            },
            fee_bps: None,
        };
        assert_eq!(router.kind(), DexKind::UniswapV3);
        assert_eq!(router.version(), RouterVersion::V3);
        assert_eq!(router.quoter(), Some(Address::repeat_byte(3)));
        assert_eq!(router.factory(), Some(Address::repeat_byte(2)));
    }
}
