//! Chain RPC client
//!
//! `ChainRpc` is the narrow surface the core consumes: quoting, nonce, gas,
//! send and receipt. `AlloyChainClient` implements it over an alloy
//! `DynProvider` (HTTP or WebSocket) and maps every transport failure into
//! `CallError::{Transient, Fatal}` for the resilience layer.
//!
//! Created: 2026-02-03

use crate::contracts::{IQuoterV2, IUniswapV2Router02, UniswapV3Pool, IERC20};
use crate::rpc::signer::SignedTransaction;
use alloy::primitives::aliases::{U160, U24};
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Log, TransactionRequest};
use alloy::sol_types::SolEvent;
use alloy::transports::{RpcError as TransportRpcError, TransportError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info};

/// Raw outcome of one chain call, before the retry policy sees it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("transient: {0}")]
    Transient(String),
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Where an external quote comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteVenue {
    /// QuoterV2 `quoteExactInputSingle` on a concentrated-liquidity pool
    Concentrated { quoter: Address, fee_tier: u32 },
    /// `getAmountsOut` on a V2-compatible router (aggregators)
    Router { router: Address },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub venue: QuoteVenue,
    pub token_in: Address,
    pub token_out: Address,
    /// Raw units of `token_in`
    pub amount_in: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeEstimate {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Decoded ERC-20 `Transfer` log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTransfer {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

/// Mined transaction as the engine needs it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReceipt {
    pub tx_hash: TxHash,
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub transfers: Vec<TokenTransfer>,
}

impl ChainReceipt {
    /// Total of `token` transferred to `wallet` in this transaction
    pub fn received(&self, token: Address, wallet: Address) -> Option<U256> {
        let mut total: Option<U256> = None;
        for t in self.transfers.iter().filter(|t| t.token == token && t.to == wallet) {
            total = Some(total.unwrap_or(U256::ZERO).saturating_add(t.value));
        }
        total
    }
}

/// Chain capabilities consumed by the normalizer and the execution engine.
/// Implementations perform exactly one attempt per call; retrying is the
/// caller's business.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    fn chain_id(&self) -> u64;

    async fn quote(&self, request: &QuoteRequest) -> Result<U256, CallError>;

    async fn pool_fee_tier(&self, pool: Address) -> Result<u32, CallError>;

    async fn token_decimals(&self, token: Address) -> Result<u8, CallError>;

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, CallError>;

    /// Pending transaction count of `account`
    async fn get_nonce(&self, account: Address) -> Result<u64, CallError>;

    async fn fee_estimate(&self) -> Result<FeeEstimate, CallError>;

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, CallError>;

    async fn send_transaction(&self, tx: &SignedTransaction) -> Result<TxHash, CallError>;

    /// `None` while the transaction is pending
    async fn get_receipt(&self, tx_hash: TxHash) -> Result<Option<ChainReceipt>, CallError>;
}

/// Convert u32 fee to alloy U24 type
pub fn fee_to_u24(fee: u32) -> U24 {
    U24::from_limbs([(fee & 0x00FF_FFFF) as u64])
}

/// alloy-backed implementation
pub struct AlloyChainClient {
    provider: DynProvider,
    chain_id: u64,
    decimals_cache: DashMap<Address, u8>,
    fee_tier_cache: DashMap<Address, u32>,
}

impl AlloyChainClient {
    /// Connect over HTTP or WebSocket depending on the URL scheme
    pub async fn connect(rpc_url: &str) -> Result<Self> {
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect(rpc_url)
            .await
            .with_context(|| format!("Failed to connect to {}", redact(rpc_url)))?
            .erased();

        let chain_id = provider
            .get_chain_id()
            .await
            .context("Failed to read chain id")?;
        info!("Connected to chain {} via {}", chain_id, redact(rpc_url));

        Ok(Self {
            provider,
            chain_id,
            decimals_cache: DashMap::new(),
            fee_tier_cache: DashMap::new(),
        })
    }
}

#[async_trait]
impl ChainRpc for AlloyChainClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<U256, CallError> {
        match request.venue {
            QuoteVenue::Concentrated { quoter, fee_tier } => {
                let quoter = IQuoterV2::new(quoter, self.provider.clone());
                let params = IQuoterV2::QuoteExactInputSingleParams {
                    tokenIn: request.token_in,
                    tokenOut: request.token_out,
                    amountIn: request.amount_in,
                    fee: fee_to_u24(fee_tier),
                    sqrtPriceLimitX96: U160::ZERO,
                };
                let result = quoter
                    .quoteExactInputSingle(params)
                    .call()
                    .await
                    .map_err(classify_contract_error)?;
                Ok(result.amountOut)
            }
            QuoteVenue::Router { router } => {
                let router = IUniswapV2Router02::new(router, self.provider.clone());
                let amounts = router
                    .getAmountsOut(request.amount_in, vec![request.token_in, request.token_out])
                    .call()
                    .await
                    .map_err(classify_contract_error)?;
                amounts
                    .last()
                    .copied()
                    .ok_or_else(|| CallError::Fatal("getAmountsOut returned no amounts".into()))
            }
        }
    }

    async fn pool_fee_tier(&self, pool: Address) -> Result<u32, CallError> {
        if let Some(fee) = self.fee_tier_cache.get(&pool) {
            return Ok(*fee);
        }
        let fee = UniswapV3Pool::new(pool, self.provider.clone())
            .fee()
            .call()
            .await
            .map_err(classify_contract_error)?;
        let fee = fee.to::<u32>();
        debug!("Pool {:?} fee tier {}", pool, fee);
        self.fee_tier_cache.insert(pool, fee);
        Ok(fee)
    }

    async fn token_decimals(&self, token: Address) -> Result<u8, CallError> {
        if let Some(decimals) = self.decimals_cache.get(&token) {
            return Ok(*decimals);
        }
        let decimals = IERC20::new(token, self.provider.clone())
            .decimals()
            .call()
            .await
            .map_err(classify_contract_error)?;
        self.decimals_cache.insert(token, decimals);
        Ok(decimals)
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, CallError> {
        IERC20::new(token, self.provider.clone())
            .allowance(owner, spender)
            .call()
            .await
            .map_err(classify_contract_error)
    }

    async fn get_nonce(&self, account: Address) -> Result<u64, CallError> {
        self.provider
            .get_transaction_count(account)
            .pending()
            .await
            .map_err(classify_transport_error)
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, CallError> {
        let fees = self
            .provider
            .estimate_eip1559_fees()
            .await
            .map_err(classify_transport_error)?;
        Ok(FeeEstimate {
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
        })
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, CallError> {
        self.provider
            .estimate_gas(tx.clone())
            .await
            .map_err(classify_transport_error)
    }

    async fn send_transaction(&self, tx: &SignedTransaction) -> Result<TxHash, CallError> {
        match self.provider.send_raw_transaction(&tx.raw).await {
            Ok(pending) => Ok(*pending.tx_hash()),
            Err(e) => {
                // A retried send whose first attempt already reached the mempool
                if e.to_string().to_lowercase().contains("already known") {
                    debug!("Transaction {:?} already known to the node", tx.hash);
                    Ok(tx.hash)
                } else {
                    Err(classify_transport_error(e))
                }
            }
        }
    }

    async fn get_receipt(&self, tx_hash: TxHash) -> Result<Option<ChainReceipt>, CallError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(classify_transport_error)?;

        Ok(receipt.map(|r| ChainReceipt {
            tx_hash,
            success: r.status(),
            block_number: r.block_number,
            gas_used: r.gas_used,
            transfers: r.inner.logs().iter().filter_map(decode_transfer).collect(),
        }))
    }
}

fn decode_transfer(log: &Log) -> Option<TokenTransfer> {
    let topics = log.topics();
    if topics.len() != 3 || topics[0] != IERC20::Transfer::SIGNATURE_HASH {
        return None;
    }
    Some(TokenTransfer {
        token: log.address(),
        from: Address::from_word(topics[1]),
        to: Address::from_word(topics[2]),
        value: U256::try_from_be_slice(&log.data().data)?,
    })
}

/// Sort a transport failure into retryable or not
pub fn classify_transport_error(err: TransportError) -> CallError {
    let message = err.to_string();
    match &err {
        TransportRpcError::Transport(_) | TransportRpcError::NullResp => {
            CallError::Transient(message)
        }
        TransportRpcError::ErrorResp(payload) => {
            let lower = payload.message.to_lowercase();
            let transient_code = matches!(payload.code, 429 | -32005 | -32603);
            let transient_text = ["rate limit", "too many requests", "timeout", "timed out", "temporarily", "header not found"]
                .iter()
                .any(|needle| lower.contains(needle));
            if transient_code || transient_text {
                CallError::Transient(message)
            } else {
                CallError::Fatal(message)
            }
        }
        _ => CallError::Fatal(message),
    }
}

fn classify_contract_error(err: alloy::contract::Error) -> CallError {
    match err {
        alloy::contract::Error::TransportError(e) => classify_transport_error(e),
        other => CallError::Fatal(other.to_string()),
    }
}

/// Strip credentials and API keys from an RPC URL before logging it
fn redact(url: &str) -> String {
    match url.find("://") {
        Some(i) => {
            let rest = &url[i + 3..];
            let host = rest.split(['/', '?']).next().unwrap_or(rest);
            let host = host.rsplit('@').next().unwrap_or(host);
            format!("{}{}", &url[..i + 3], host)
        }
        None => "<rpc>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::rpc::json_rpc::ErrorPayload;
    use alloy::transports::TransportErrorKind;

    fn error_resp(code: i64, message: &'static str) -> TransportError {
        TransportRpcError::ErrorResp(ErrorPayload {
            code,
            message: message.into(),
            data: None,
        })
    }

    #[test]
    fn test_rate_limit_is_transient() {
        assert!(matches!(
            classify_transport_error(error_resp(429, "Too Many Requests")),
            CallError::Transient(_)
        ));
        assert!(matches!(
            classify_transport_error(error_resp(-32000, "header not found")),
            CallError::Transient(_)
        ));
    }

    #[test]
    fn test_revert_is_fatal() {
        assert!(matches!(
            classify_transport_error(error_resp(3, "execution reverted: INSUFFICIENT_OUTPUT_AMOUNT")),
            CallError::Fatal(_)
        ));
        assert!(matches!(
            classify_transport_error(error_resp(-32000, "nonce too low")),
            CallError::Fatal(_)
        ));
    }

    #[test]
    fn test_backend_gone_is_transient() {
        let err = TransportRpcError::Transport(TransportErrorKind::BackendGone);
        assert!(matches!(classify_transport_error(err), CallError::Transient(_)));
    }

    #[test]
    fn test_received_sums_transfers_to_wallet() {
        let token = Address::repeat_byte(0x11);
        let wallet = Address::repeat_byte(0x22);
        let pool = Address::repeat_byte(0x33);
        let receipt = ChainReceipt {
            tx_hash: TxHash::repeat_byte(0xAA),
            success: true,
            block_number: Some(1),
            gas_used: 120_000,
            transfers: vec![
                TokenTransfer { token, from: pool, to: wallet, value: U256::from(700u64) },
                TokenTransfer { token, from: pool, to: wallet, value: U256::from(300u64) },
                TokenTransfer { token, from: wallet, to: pool, value: U256::from(5u64) },
                TokenTransfer { token: pool, from: pool, to: wallet, value: U256::from(9u64) },
            ],
        };
        assert_eq!(receipt.received(token, wallet), Some(U256::from(1000u64)));
        assert_eq!(receipt.received(Address::repeat_byte(0x44), wallet), None);
    }

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact("wss://user:pw@base-mainnet.example.io/v2/secretkey"),
            "wss://base-mainnet.example.io"
        );
        assert_eq!(redact("http://localhost:8545"), "http://localhost:8545");
    }

    #[test]
    fn test_fee_to_u24() {
        assert_eq!(fee_to_u24(3000).to::<u32>(), 3000);
        assert_eq!(fee_to_u24(100).to::<u32>(), 100);
    }
}
