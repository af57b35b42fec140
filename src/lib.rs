//! Cross-DEX spread arbitrage bot library
//!
//! Polls a price feed for each tracked token, normalizes every venue into a
//! common quote, and executes a two-leg buy/sell when the spread clears the
//! configured threshold.
//!
//! Created: 2026-01-28
//! Modified: 2026-02-03 - Price feed, quote normalizer, execution engine, monitor

pub mod arbitrage;
pub mod config;
pub mod contracts;
pub mod errors;
pub mod feed;
pub mod monitor;
pub mod pool;
pub mod rpc;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{load_config, load_config_from_file, BotConfig, RouterRegistry};
pub use errors::{ConfigError, ExecutionError, FeedError, PlanError, QuoteUnavailable, RpcError};
pub use monitor::{Monitor, MonitorSettings};
pub use types::{AttemptStatus, Opportunity, PoolSnapshot, TradeAttempt};
