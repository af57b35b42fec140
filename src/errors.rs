//! Error taxonomy
//!
//! One enum per failure class. Only `ConfigError` is fatal, and only at startup;
//! everything else is recovered from inside the polling loop.
//!
//! Created: 2026-02-03

use alloy::primitives::{Address, TxHash};
use thiserror::Error;

/// Invalid or missing configuration. Raised once, before any trading logic runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("DEX_ROUTERS is not valid JSON: {0}")]
    RouterJson(#[from] serde_json::Error),

    #[error("router '{dex_id}': {reason}")]
    Router { dex_id: String, reason: String },
}

impl ConfigError {
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }

    pub fn router(dex_id: &str, reason: impl Into<String>) -> Self {
        ConfigError::Router {
            dex_id: dex_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// A venue could not be quoted this cycle. The DEX is skipped, nothing else.
#[derive(Debug, Clone, Error)]
#[error("quote unavailable on {dex_id}: {reason}")]
pub struct QuoteUnavailable {
    pub dex_id: String,
    pub reason: String,
}

impl QuoteUnavailable {
    pub fn new(dex_id: &str, reason: impl Into<String>) -> Self {
        Self {
            dex_id: dex_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Planning rejected the opportunity. No trade is attempted.
#[derive(Debug, Clone, Error)]
pub enum PlanError {
    #[error("insufficient liquidity on {dex_id}: {amount:.6} exceeds safe cap {cap:.6}")]
    InsufficientLiquidity {
        dex_id: String,
        amount: f64,
        cap: f64,
    },

    #[error("planning failed on {dex_id}: {reason}")]
    Planning { dex_id: String, reason: String },
}

/// Outcome of a chain call after the resilience layer has finished with it.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// Not retried: malformed request, revert, signature rejection.
    #[error("{operation} failed (not retried): {message}")]
    Fatal { operation: String, message: String },

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },
}

/// Errors raised by the execution engine.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error("execution slot for {0} is already held")]
    SlotBusy(Address),

    #[error("token {0} is cooling down")]
    CoolingDown(Address),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("transaction {0} reverted")]
    Reverted(TxHash),

    #[error("no receipt for {0} before timeout")]
    ReceiptTimeout(TxHash),

    #[error("receipt {tx_hash} credits the wallet with no {token}")]
    NothingReceived { tx_hash: TxHash, token: Address },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("cannot build leg: {0}")]
    InvalidLeg(String),
}

/// Price-feed failures. Always transient from the loop's point of view.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("price feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("price feed returned status {0}")]
    Status(u16),

    #[error("malformed price feed payload: {0}")]
    Payload(String),
}
