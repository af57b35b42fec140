//! Scripted in-memory chain and signer for unit tests

use crate::errors::ExecutionError;
use crate::rpc::{
    CallError, ChainReceipt, ChainRpc, FeeEstimate, QuoteRequest, SignedTransaction, TokenTransfer,
    TransactionSigner,
};
use crate::types::{PoolLiquidity, PoolSnapshot};
use alloy::primitives::{address, keccak256, Address, Bytes, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

pub const TOKEN: Address = address!("4200000000000000000000000000000000000042");
pub const BASE: Address = address!("4200000000000000000000000000000000000006");
pub const WALLET: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");

/// Reserve-based snapshot: liquidity 10k USD, base priced at 2k USD
pub fn reserve_snapshot(dex_id: &str, reserve_token: f64, reserve_base: f64) -> PoolSnapshot {
    PoolSnapshot {
        dex_id: dex_id.to_string(),
        labels: vec!["v2".to_string()],
        pair_address: Address::repeat_byte(0x50),
        token_address: TOKEN,
        base_currency_address: BASE,
        liquidity: PoolLiquidity::Reserves {
            token: reserve_token,
            base: reserve_base,
        },
        price_in_base: reserve_base / reserve_token,
        base_price_usd: 2_000.0,
        liquidity_usd: 10_000.0,
        volume_24h_usd: 50_000.0,
        fee_bps: None,
        observed_at: Utc::now(),
    }
}

pub fn v3_snapshot(dex_id: &str, price_in_base: f64) -> PoolSnapshot {
    PoolSnapshot {
        dex_id: dex_id.to_string(),
        labels: vec!["v3".to_string()],
        pair_address: Address::repeat_byte(0x60),
        token_address: TOKEN,
        base_currency_address: BASE,
        liquidity: PoolLiquidity::Concentrated {
            pool: Address::repeat_byte(0x60),
        },
        price_in_base,
        base_price_usd: 2_000.0,
        liquidity_usd: 10_000.0,
        volume_24h_usd: 50_000.0,
        fee_bps: None,
        observed_at: Utc::now(),
    }
}

/// What happens to a transaction once it is accepted
#[derive(Debug, Clone)]
pub enum ReceiptPlan {
    Mined { success: bool, transfers: Vec<TokenTransfer> },
    NeverMined,
}

/// Mined, crediting the wallet with both sides of the standard 0.05 base trade
impl Default for ReceiptPlan {
    fn default() -> Self {
        ReceiptPlan::Mined {
            success: true,
            transfers: vec![
                credit(TOKEN, U256::from(24_600_000_000_000_000_000u128)),
                credit(BASE, U256::from(50_200_000_000_000_000u128)),
            ],
        }
    }
}

/// Transfer of `value` raw units of `token` from the pool to the wallet
pub fn credit(token: Address, value: U256) -> TokenTransfer {
    TokenTransfer {
        token,
        from: Address::repeat_byte(0x50),
        to: WALLET,
        value,
    }
}

type QuoteFn = Box<dyn Fn(&QuoteRequest) -> Result<U256, CallError> + Send + Sync>;

pub struct MockChain {
    decimals: Mutex<HashMap<Address, u8>>,
    fee_tier: Mutex<u32>,
    quote_fn: Mutex<QuoteFn>,
    quotes: Mutex<Vec<QuoteRequest>>,
    allowance: Mutex<U256>,
    pending_nonce: AtomicU64,
    nonce_calls: AtomicUsize,
    gas_estimate: Mutex<Result<u64, CallError>>,
    send_failure: Mutex<Option<(usize, CallError)>>,
    send_calls: AtomicUsize,
    receipt_plans: Mutex<VecDeque<ReceiptPlan>>,
    mined: Mutex<HashMap<TxHash, ReceiptPlan>>,
    sent: Mutex<Vec<TxHash>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            decimals: Mutex::new(HashMap::new()),
            fee_tier: Mutex::new(3000),
            quote_fn: Mutex::new(Box::new(|req| Ok(req.amount_in))),
            quotes: Mutex::new(Vec::new()),
            allowance: Mutex::new(U256::MAX),
            pending_nonce: AtomicU64::new(0),
            nonce_calls: AtomicUsize::new(0),
            gas_estimate: Mutex::new(Ok(150_000)),
            send_failure: Mutex::new(None),
            send_calls: AtomicUsize::new(0),
            receipt_plans: Mutex::new(VecDeque::new()),
            mined: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_decimals(&self, token: Address, decimals: u8) {
        self.decimals.lock().unwrap().insert(token, decimals);
    }

    pub fn set_fee_tier(&self, fee: u32) {
        *self.fee_tier.lock().unwrap() = fee;
    }

    pub fn set_quote_fn<F>(&self, f: F)
    where
        F: Fn(&QuoteRequest) -> Result<U256, CallError> + Send + Sync + 'static,
    {
        *self.quote_fn.lock().unwrap() = Box::new(f);
    }

    pub fn last_quote(&self) -> Option<QuoteRequest> {
        self.quotes.lock().unwrap().last().cloned()
    }

    pub fn set_allowance(&self, allowance: U256) {
        *self.allowance.lock().unwrap() = allowance;
    }

    pub fn set_pending_nonce(&self, nonce: u64) {
        self.pending_nonce.store(nonce, Ordering::SeqCst);
    }

    pub fn nonce_calls(&self) -> usize {
        self.nonce_calls.load(Ordering::SeqCst)
    }

    pub fn set_gas_estimate(&self, result: Result<u64, CallError>) {
        *self.gas_estimate.lock().unwrap() = result;
    }

    /// Every send after the first `accepted` accepted ones fails with `error`
    pub fn fail_sends_after(&self, accepted: usize, error: CallError) {
        *self.send_failure.lock().unwrap() = Some((accepted, error));
    }

    /// Receipt behaviour of the next accepted transaction
    pub fn push_receipt(&self, plan: ReceiptPlan) {
        self.receipt_plans.lock().unwrap().push_back(plan);
    }

    pub fn sent(&self) -> Vec<TxHash> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    fn chain_id(&self) -> u64 {
        8453
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<U256, CallError> {
        self.quotes.lock().unwrap().push(request.clone());
        (self.quote_fn.lock().unwrap())(request)
    }

    async fn pool_fee_tier(&self, _pool: Address) -> Result<u32, CallError> {
        Ok(*self.fee_tier.lock().unwrap())
    }

    async fn token_decimals(&self, token: Address) -> Result<u8, CallError> {
        Ok(self.decimals.lock().unwrap().get(&token).copied().unwrap_or(18))
    }

    async fn allowance(
        &self,
        _token: Address,
        _owner: Address,
        _spender: Address,
    ) -> Result<U256, CallError> {
        Ok(*self.allowance.lock().unwrap())
    }

    async fn get_nonce(&self, _account: Address) -> Result<u64, CallError> {
        self.nonce_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pending_nonce.load(Ordering::SeqCst))
    }

    async fn fee_estimate(&self) -> Result<FeeEstimate, CallError> {
        Ok(FeeEstimate {
            max_fee_per_gas: 2_000_000_000,
            max_priority_fee_per_gas: 1_000_000,
        })
    }

    async fn estimate_gas(&self, _tx: &TransactionRequest) -> Result<u64, CallError> {
        self.gas_estimate.lock().unwrap().clone()
    }

    async fn send_transaction(&self, tx: &SignedTransaction) -> Result<TxHash, CallError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        let accepted = self.sent.lock().unwrap().len();
        if let Some((limit, error)) = self.send_failure.lock().unwrap().as_ref() {
            if accepted >= *limit {
                return Err(error.clone());
            }
        }
        let plan = self.receipt_plans.lock().unwrap().pop_front().unwrap_or_default();
        self.mined.lock().unwrap().insert(tx.hash, plan);
        self.sent.lock().unwrap().push(tx.hash);
        self.pending_nonce.fetch_add(1, Ordering::SeqCst);
        Ok(tx.hash)
    }

    async fn get_receipt(&self, tx_hash: TxHash) -> Result<Option<ChainReceipt>, CallError> {
        match self.mined.lock().unwrap().get(&tx_hash) {
            Some(ReceiptPlan::Mined { success, transfers }) => Ok(Some(ChainReceipt {
                tx_hash,
                success: *success,
                block_number: Some(1),
                gas_used: 120_000,
                transfers: transfers.clone(),
            })),
            Some(ReceiptPlan::NeverMined) | None => Ok(None),
        }
    }
}

/// Records every request it signs; hashes come from a queue, then from a counter
pub struct MockSigner {
    signed: Mutex<Vec<TransactionRequest>>,
    hashes: Mutex<VecDeque<TxHash>>,
}

impl MockSigner {
    pub fn new() -> Self {
        Self {
            signed: Mutex::new(Vec::new()),
            hashes: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push_hash(&self, hash: TxHash) {
        self.hashes.lock().unwrap().push_back(hash);
    }

    pub fn signed(&self) -> Vec<TransactionRequest> {
        self.signed.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionSigner for MockSigner {
    fn address(&self) -> Address {
        WALLET
    }

    async fn sign(&self, tx: TransactionRequest) -> Result<SignedTransaction, ExecutionError> {
        let mut signed = self.signed.lock().unwrap();
        let index = signed.len() as u64;
        signed.push(tx);
        let hash = self
            .hashes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| keccak256(index.to_be_bytes()));
        Ok(SignedTransaction {
            raw: Bytes::copy_from_slice(hash.as_slice()),
            hash,
        })
    }
}
