//! Swap Planner
//!
//! Turns an approved Opportunity into a two-leg TradeAttempt: fixed input
//! size, quoted outputs, slippage-bounded minimums and a gas ceiling.
//! Nothing is submitted here.
//!
//! Created: 2026-02-03

use crate::config::BotConfig;
use crate::errors::PlanError;
use crate::pool::NormalizedQuote;
use crate::types::{AttemptStatus, LegStatus, Opportunity, SwapSide, TradeAttempt, TradeLeg};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct PlannerSettings {
    pub trade_amount_base: f64,
    pub slippage_tolerance_percent: f64,
    pub max_gas_limit: u64,
}

impl PlannerSettings {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            trade_amount_base: config.trade_amount_base_token,
            slippage_tolerance_percent: config.slippage_tolerance_percent,
            max_gas_limit: config.max_gas_limit,
        }
    }

    fn min_out(&self, amount_out: f64) -> f64 {
        amount_out * (1.0 - self.slippage_tolerance_percent / 100.0)
    }
}

pub struct SwapPlanner {
    settings: PlannerSettings,
}

impl SwapPlanner {
    pub fn new(settings: PlannerSettings) -> Self {
        Self { settings }
    }

    /// Plan against the quotes the opportunity was detected from
    pub async fn plan_from(
        &self,
        opportunity: &Opportunity,
        quotes: &[NormalizedQuote],
    ) -> Result<TradeAttempt, PlanError> {
        let find = |dex_id: &str| {
            quotes
                .iter()
                .find(|q| q.dex_id == dex_id)
                .ok_or_else(|| PlanError::Planning {
                    dex_id: dex_id.to_string(),
                    reason: "venue missing from this cycle's quotes".to_string(),
                })
        };
        let buy = find(&opportunity.buy_dex)?;
        let sell = find(&opportunity.sell_dex)?;
        self.plan(opportunity, buy, sell).await
    }

    pub async fn plan(
        &self,
        opportunity: &Opportunity,
        buy: &NormalizedQuote,
        sell: &NormalizedQuote,
    ) -> Result<TradeAttempt, PlanError> {
        let amount_in = self.settings.trade_amount_base;

        // Leg 1: base -> token on the cheap venue
        let cap = buy.max_safe_amount_in(SwapSide::Buy);
        if amount_in > cap {
            return Err(PlanError::InsufficientLiquidity {
                dex_id: buy.dex_id.clone(),
                amount: amount_in,
                cap,
            });
        }
        let leg1_quote = buy
            .quote(SwapSide::Buy, amount_in)
            .await
            .map_err(|e| PlanError::Planning {
                dex_id: buy.dex_id.clone(),
                reason: e.reason,
            })?;
        let amount_out_token = leg1_quote.amount_out;

        // Leg 2: token -> base on the expensive venue
        let cap = sell.max_safe_amount_in(SwapSide::Sell);
        if amount_out_token > cap {
            return Err(PlanError::InsufficientLiquidity {
                dex_id: sell.dex_id.clone(),
                amount: amount_out_token,
                cap,
            });
        }
        let leg2_quote = sell
            .quote(SwapSide::Sell, amount_out_token)
            .await
            .map_err(|e| PlanError::Planning {
                dex_id: sell.dex_id.clone(),
                reason: e.reason,
            })?;
        let amount_out_base = leg2_quote.amount_out;

        debug!(
            "Planned {:?}: {:.6} base -> {:.6} token ({}, impact {:.1}bps) -> {:.6} base ({}, impact {:.1}bps)",
            opportunity.token,
            amount_in,
            amount_out_token,
            buy.dex_id,
            leg1_quote.price_impact_bps,
            amount_out_base,
            sell.dex_id,
            leg2_quote.price_impact_bps
        );

        let (buy_in, buy_out) = buy.path(SwapSide::Buy);
        let (sell_in, sell_out) = sell.path(SwapSide::Sell);

        Ok(TradeAttempt {
            token: opportunity.token,
            opportunity: opportunity.clone(),
            amount_in,
            leg1: TradeLeg {
                side: SwapSide::Buy,
                router: buy.router.clone(),
                token_in: buy_in,
                token_out: buy_out,
                amount_in,
                expected_amount_out: amount_out_token,
                min_amount_out: self.settings.min_out(amount_out_token),
                amount_in_raw: None,
                min_amount_out_raw: None,
                fee_tier: buy.fee_tier(),
                stable: buy.stable_route(),
                nonce: None,
                tx_hash: None,
                amount_received: None,
                received_raw: None,
                status: LegStatus::Planned,
            },
            leg2: TradeLeg {
                side: SwapSide::Sell,
                router: sell.router.clone(),
                token_in: sell_in,
                token_out: sell_out,
                amount_in: amount_out_token,
                expected_amount_out: amount_out_base,
                min_amount_out: self.settings.min_out(amount_out_base),
                amount_in_raw: None,
                min_amount_out_raw: None,
                fee_tier: sell.fee_tier(),
                stable: sell.stable_route(),
                nonce: None,
                tx_hash: None,
                amount_received: None,
                received_raw: None,
                status: LegStatus::Planned,
            },
            gas_limit: self.settings.max_gas_limit,
            overall_status: AttemptStatus::Pending,
            error: None,
            started_at: None,
            finished_at: None,
        })
    }
}
