//! Execution Engine
//!
//! Drives a planned TradeAttempt through its two legs:
//! pending -> leg1Submitted -> leg1Confirmed -> leg2Submitted -> {succeeded | partiallyExecuted},
//! with failed reachable only while leg 1 is unconfirmed.
//!
//! Owns the mutable shared state of the trading path: the per-token
//! execution slot, the signing account's nonce and the cooldown stamps.
//! Every chain call goes through the retry policy.
//!
//! Once leg 1 has confirmed the wallet holds the intermediate token; a leg 2
//! failure halts with partiallyExecuted and nothing is unwound automatically.
//!
//! Created: 2026-01-28
//! Modified: 2026-02-03 - Explicit state machine, nonce manager, execution slots, receipt polling

use crate::arbitrage::audit::TradeLog;
use crate::arbitrage::cooldown::CooldownState;
use crate::arbitrage::swap_call::{encode_approve, encode_swap, SwapCall, DEADLINE_SECS};
use crate::config::BotConfig;
use crate::errors::ExecutionError;
use crate::pool::normalizer::{from_raw_units, to_raw_units};
use crate::rpc::{ChainReceipt, ChainRpc, RetryPolicy, TransactionSigner};
use crate::types::{AttemptStatus, LegStatus, TradeAttempt, TradeLeg};
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Headroom applied to eth_estimateGas before capping at the leg's gas limit
const GAS_ESTIMATE_MARGIN: f64 = 1.2;

#[derive(Debug, Clone, Copy)]
pub struct ExecutionSettings {
    pub receipt_timeout: Duration,
    pub receipt_poll_interval: Duration,
}

impl ExecutionSettings {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            receipt_timeout: config.receipt_timeout,
            receipt_poll_interval: config.receipt_poll_interval,
        }
    }
}

/// One exclusive execution slot per token
#[derive(Debug, Clone, Default)]
pub struct ExecutionSlots {
    held: Arc<DashMap<Address, DateTime<Utc>>>,
}

impl ExecutionSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` while another attempt on `token` is in flight
    pub fn try_acquire(&self, token: Address) -> Option<SlotGuard> {
        match self.held.entry(token) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Utc::now());
                Some(SlotGuard {
                    token,
                    held: self.held.clone(),
                })
            }
        }
    }

    pub fn is_held(&self, token: &Address) -> bool {
        self.held.contains_key(token)
    }
}

/// Releases the token's slot on drop
#[derive(Debug)]
pub struct SlotGuard {
    token: Address,
    held: Arc<DashMap<Address, DateTime<Utc>>>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.held.remove(&self.token);
    }
}

pub struct ExecutionEngine {
    chain: Arc<dyn ChainRpc>,
    signer: Arc<dyn TransactionSigner>,
    retry: RetryPolicy,
    settings: ExecutionSettings,
    cooldown: Arc<CooldownState>,
    slots: ExecutionSlots,
    /// Next nonce to assign; `None` means resync from the chain's pending count
    next_nonce: Mutex<Option<u64>>,
    trade_log: TradeLog,
}

impl ExecutionEngine {
    pub fn new(
        chain: Arc<dyn ChainRpc>,
        signer: Arc<dyn TransactionSigner>,
        retry: RetryPolicy,
        settings: ExecutionSettings,
        cooldown: Arc<CooldownState>,
        trade_log: TradeLog,
    ) -> Self {
        Self {
            chain,
            signer,
            retry,
            settings,
            cooldown,
            slots: ExecutionSlots::new(),
            next_nonce: Mutex::new(None),
            trade_log,
        }
    }

    pub fn cooldown(&self) -> &Arc<CooldownState> {
        &self.cooldown
    }

    pub fn slots(&self) -> &ExecutionSlots {
        &self.slots
    }

    pub fn trade_log(&self) -> &TradeLog {
        &self.trade_log
    }

    pub fn wallet(&self) -> Address {
        self.signer.address()
    }

    /// Run a planned attempt to a terminal state.
    ///
    /// Errors only when the attempt is refused before it starts (slot held or
    /// cooldown active). Leg failures are reported through the returned
    /// attempt's `overall_status`.
    pub async fn execute(&self, mut attempt: TradeAttempt) -> Result<TradeAttempt, ExecutionError> {
        let token = attempt.token;
        let _slot = self
            .slots
            .try_acquire(token)
            .ok_or(ExecutionError::SlotBusy(token))?;

        if self.cooldown.is_cooling_down(&token, Utc::now()) {
            return Err(ExecutionError::CoolingDown(token));
        }

        attempt.started_at = Some(Utc::now());
        info!(
            "🚀 Executing {:?}: buy {} @ {:.8} | sell {} @ {:.8} | spread {:.2}%",
            token,
            attempt.opportunity.buy_dex,
            attempt.opportunity.buy_price,
            attempt.opportunity.sell_dex,
            attempt.opportunity.sell_price,
            attempt.opportunity.spread_percent
        );

        // Leg 1: failure here commits nothing beyond gas
        let gas_limit = attempt.gas_limit;
        let leg1_hash = match self.submit_leg(&mut attempt.leg1, gas_limit).await {
            Ok(hash) => hash,
            Err(e) => {
                attempt.leg1.status = LegStatus::Failed;
                attempt.leg2.status = LegStatus::NotAttempted;
                return Ok(self.finish(attempt, AttemptStatus::Failed, Some(e)));
            }
        };
        advance(&mut attempt, AttemptStatus::Leg1Submitted);

        let leg1_receipt = match self.await_receipt(leg1_hash).await {
            Ok(receipt) => receipt,
            Err(e) => {
                attempt.leg1.status = LegStatus::Failed;
                attempt.leg2.status = LegStatus::NotAttempted;
                return Ok(self.finish(attempt, AttemptStatus::Failed, Some(e)));
            }
        };
        attempt.leg1.status = LegStatus::Confirmed;
        advance(&mut attempt, AttemptStatus::Leg1Confirmed);

        // Leg 2 sells exactly what leg 1 delivered, in raw units
        let wallet = self.signer.address();
        let received = match leg1_receipt.received(attempt.leg1.token_out, wallet) {
            Some(raw) if !raw.is_zero() => raw,
            _ => {
                attempt.leg2.status = LegStatus::NotAttempted;
                let e = ExecutionError::NothingReceived {
                    tx_hash: leg1_hash,
                    token: attempt.leg1.token_out,
                };
                return Ok(self.finish(attempt, AttemptStatus::PartiallyExecuted, Some(e)));
            }
        };
        self.record_received(&mut attempt.leg1, received).await;
        info!(
            "✅ Leg 1 confirmed: {:?} | received {} raw of {:?}",
            leg1_hash, received, attempt.leg1.token_out
        );

        let submitted = match self.size_leg2(&mut attempt, received).await {
            Ok(()) => self.submit_leg(&mut attempt.leg2, gas_limit).await,
            Err(e) => Err(e),
        };
        let leg2_hash = match submitted {
            Ok(hash) => hash,
            Err(e) => {
                attempt.leg2.status = LegStatus::Failed;
                return Ok(self.finish(attempt, AttemptStatus::PartiallyExecuted, Some(e)));
            }
        };
        advance(&mut attempt, AttemptStatus::Leg2Submitted);

        match self.await_receipt(leg2_hash).await {
            Ok(receipt) => {
                attempt.leg2.status = LegStatus::Confirmed;
                match receipt.received(attempt.leg2.token_out, wallet) {
                    Some(raw) => self.record_received(&mut attempt.leg2, raw).await,
                    None => warn!("Leg 2 {:?} carries no Transfer log to the wallet", leg2_hash),
                }
                Ok(self.finish(attempt, AttemptStatus::Succeeded, None))
            }
            Err(e) => {
                attempt.leg2.status = LegStatus::Failed;
                Ok(self.finish(attempt, AttemptStatus::PartiallyExecuted, Some(e)))
            }
        }
    }

    /// Terminal transition: stamp cooldown exactly once, log, audit
    fn finish(
        &self,
        mut attempt: TradeAttempt,
        status: AttemptStatus,
        cause: Option<ExecutionError>,
    ) -> TradeAttempt {
        advance(&mut attempt, status);
        attempt.error = cause.map(|e| e.to_string());
        let finished_at = Utc::now();
        attempt.finished_at = Some(finished_at);
        self.cooldown.record_attempt(attempt.token, finished_at);

        match status {
            AttemptStatus::Succeeded => info!(
                "🎉 Trade succeeded for {:?}: {:.6} base in, {:.6} base out",
                attempt.token,
                attempt.amount_in,
                attempt.leg2.amount_received.unwrap_or(attempt.leg2.expected_amount_out)
            ),
            AttemptStatus::Failed => warn!(
                "Trade failed for {:?} before leg 1 confirmed: {}",
                attempt.token,
                attempt.error.as_deref().unwrap_or("unknown")
            ),
            AttemptStatus::PartiallyExecuted => error!(
                "🛑 PARTIAL EXECUTION for {:?}: leg 1 {:?} confirmed, wallet holds {:.6} of {:?}. \
                 Leg 2 failed: {}. Manual intervention required.",
                attempt.token,
                attempt.leg1.tx_hash,
                attempt.leg1.amount_received.unwrap_or(attempt.leg2.amount_in),
                attempt.leg1.token_out,
                attempt.error.as_deref().unwrap_or("unknown")
            ),
            _ => {}
        }

        self.trade_log.record(&attempt);
        attempt
    }

    async fn decimals(&self, token: Address) -> Result<u8, ExecutionError> {
        Ok(self
            .retry
            .run("token_decimals", || self.chain.token_decimals(token))
            .await?)
    }

    /// Approve (if needed), sign and send one leg. Sets nonce, hash and status on success.
    async fn submit_leg(&self, leg: &mut TradeLeg, gas_limit: u64) -> Result<TxHash, ExecutionError> {
        let amount_in = match leg.amount_in_raw {
            Some(raw) => raw,
            None => to_raw_units(leg.amount_in, self.decimals(leg.token_in).await?),
        };
        let min_amount_out = match leg.min_amount_out_raw {
            Some(raw) => raw,
            None => to_raw_units(leg.min_amount_out, self.decimals(leg.token_out).await?),
        };
        if amount_in.is_zero() {
            return Err(ExecutionError::InvalidLeg(format!(
                "{}: zero input amount",
                leg.router.dex_id
            )));
        }

        self.ensure_allowance(leg.token_in, leg.router.address, amount_in, gas_limit)
            .await?;

        let call = SwapCall {
            token_in: leg.token_in,
            token_out: leg.token_out,
            amount_in,
            min_amount_out,
            recipient: self.signer.address(),
            deadline: Utc::now().timestamp().max(0) as u64 + DEADLINE_SECS,
            fee_tier: leg.fee_tier,
            stable: leg.stable,
        };
        let input = encode_swap(&leg.router, &call)?;
        let tx = self.build_tx(leg.router.address, input, gas_limit).await?;
        let (hash, nonce) = self.submit(tx).await?;

        leg.nonce = Some(nonce);
        leg.tx_hash = Some(hash);
        leg.status = LegStatus::Submitted;
        info!(
            "📤 {:?} leg on {} submitted: {:?} (nonce {})",
            leg.side, leg.router.dex_id, hash, nonce
        );
        Ok(hash)
    }

    async fn ensure_allowance(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
        gas_limit: u64,
    ) -> Result<(), ExecutionError> {
        let owner = self.signer.address();
        let allowance = self
            .retry
            .run("allowance", || self.chain.allowance(token, owner, spender))
            .await?;

        if allowance >= amount {
            debug!("Sufficient allowance: {} >= {}", allowance, amount);
            return Ok(());
        }

        // Approve max uint256 for future trades
        info!("Approving {:?} for router {:?}", token, spender);
        let tx = self
            .build_tx(token, encode_approve(spender, U256::MAX), gas_limit)
            .await?;
        let (hash, _) = self.submit(tx).await?;
        self.await_receipt(hash).await?;
        info!("Approval confirmed: {:?}", hash);
        Ok(())
    }

    /// Fill gas and EIP-1559 fees; nonce is assigned at submission
    async fn build_tx(
        &self,
        to: Address,
        input: Bytes,
        gas_limit: u64,
    ) -> Result<TransactionRequest, ExecutionError> {
        let tx = TransactionRequest::default()
            .with_from(self.signer.address())
            .with_to(to)
            .with_input(input)
            .with_chain_id(self.chain.chain_id());

        let estimate = self
            .retry
            .run("estimate_gas", || self.chain.estimate_gas(&tx))
            .await?;
        let gas = ((estimate as f64 * GAS_ESTIMATE_MARGIN) as u64).min(gas_limit);

        let fees = self
            .retry
            .run("fee_estimate", || self.chain.fee_estimate())
            .await?;

        Ok(tx
            .with_gas_limit(gas)
            .with_max_fee_per_gas(fees.max_fee_per_gas)
            .with_max_priority_fee_per_gas(fees.max_priority_fee_per_gas))
    }

    /// Assign the next nonce, sign and send. The nonce lock is held across the
    /// send so transactions leave in nonce order.
    async fn submit(&self, tx: TransactionRequest) -> Result<(TxHash, u64), ExecutionError> {
        let mut next = self.next_nonce.lock().await;
        let nonce = match *next {
            Some(n) => n,
            None => {
                let account = self.signer.address();
                let pending = self
                    .retry
                    .run("get_nonce", || self.chain.get_nonce(account))
                    .await?;
                debug!("Nonce synced from chain: {}", pending);
                pending
            }
        };
        *next = Some(nonce);

        let signed = self.signer.sign(tx.with_nonce(nonce)).await?;

        match self
            .retry
            .run("send_transaction", || self.chain.send_transaction(&signed))
            .await
        {
            Ok(hash) => {
                *next = Some(nonce + 1);
                Ok((hash, nonce))
            }
            Err(e) => {
                // Unknown whether the node kept it; resync before the next send
                *next = None;
                Err(e.into())
            }
        }
    }

    /// Poll until mined, reverted or RECEIPT_TIMEOUT
    async fn await_receipt(&self, hash: TxHash) -> Result<ChainReceipt, ExecutionError> {
        let deadline = Instant::now() + self.settings.receipt_timeout;
        loop {
            let receipt = self
                .retry
                .run("get_receipt", || self.chain.get_receipt(hash))
                .await?;

            if let Some(receipt) = receipt {
                if receipt.success {
                    debug!("Receipt {:?}: block {:?}, gas {}", hash, receipt.block_number, receipt.gas_used);
                    return Ok(receipt);
                }
                return Err(ExecutionError::Reverted(hash));
            }

            if Instant::now() >= deadline {
                return Err(ExecutionError::ReceiptTimeout(hash));
            }
            tokio::time::sleep(self.settings.receipt_poll_interval).await;
        }
    }

    /// Store a receipt amount on `leg`, with its human-unit mirror when decimals resolve
    async fn record_received(&self, leg: &mut TradeLeg, raw: U256) {
        leg.received_raw = Some(raw);
        match self.decimals(leg.token_out).await {
            Ok(decimals) => leg.amount_received = Some(from_raw_units(raw, decimals)),
            Err(e) => warn!("Decimals lookup for {:?} failed: {}", leg.token_out, e),
        }
    }

    /// Size leg 2 to `received` raw units, scaling its minimum output in integer math
    async fn size_leg2(&self, attempt: &mut TradeAttempt, received: U256) -> Result<(), ExecutionError> {
        let leg = &mut attempt.leg2;
        let decimals_in = self.decimals(leg.token_in).await?;
        let decimals_out = self.decimals(leg.token_out).await?;
        let planned_in = leg
            .amount_in_raw
            .unwrap_or_else(|| to_raw_units(leg.amount_in, decimals_in));
        let planned_min = leg
            .min_amount_out_raw
            .unwrap_or_else(|| to_raw_units(leg.min_amount_out, decimals_out));

        leg.amount_in_raw = Some(received);
        leg.min_amount_out_raw = Some(scale_raw(planned_min, received, planned_in));
        rescale_leg(leg, from_raw_units(received, decimals_in));
        debug!(
            "Leg 2 sized: {} raw in (planned {}), min out {:?}",
            received, planned_in, leg.min_amount_out_raw
        );
        Ok(())
    }
}

fn advance(attempt: &mut TradeAttempt, next: AttemptStatus) {
    debug_assert!(
        attempt.overall_status.can_transition_to(next),
        "illegal transition {} -> {}",
        attempt.overall_status,
        next
    );
    debug!("{:?}: {} -> {}", attempt.token, attempt.overall_status, next);
    attempt.overall_status = next;
}

/// `amount * numerator / denominator`; unchanged when the denominator is zero
fn scale_raw(amount: U256, numerator: U256, denominator: U256) -> U256 {
    if denominator.is_zero() {
        return amount;
    }
    amount.saturating_mul(numerator) / denominator
}

/// Human-unit mirror of a resize, keeping the slippage bound proportional
fn rescale_leg(leg: &mut TradeLeg, amount_in: f64) {
    if leg.amount_in > 0.0 && amount_in > 0.0 {
        let ratio = amount_in / leg.amount_in;
        leg.expected_amount_out *= ratio;
        leg.min_amount_out *= ratio;
        leg.amount_in = amount_in;
    }
}
