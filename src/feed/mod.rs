//! Price feed adapters
//!
//! A feed turns "which pools trade this token right now" into PoolSnapshots.
//! All snapshots returned by one call share a single `observed_at`.

pub mod dexscreener;

pub use dexscreener::DexScreenerFeed;

use crate::errors::FeedError;
use crate::types::PoolSnapshot;
use alloy::primitives::Address;
use async_trait::async_trait;

#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Every pool pairing `token` with the base currency, in one observation
    async fn fetch_snapshots(&self, token: Address) -> Result<Vec<PoolSnapshot>, FeedError>;
}
