//! Opportunity Detector
//!
//! Picks the cheapest and the most expensive venue for one token out of the
//! quotes collected in a single polling cycle and decides whether the spread
//! is worth trading. Pure: no I/O, no mutation.
//!
//! Created: 2026-01-27
//! Modified: 2026-02-03 - Per-token evaluation over NormalizedQuotes, cooldown gate

use crate::arbitrage::cooldown::CooldownState;
use crate::config::BotConfig;
use crate::pool::NormalizedQuote;
use crate::types::Opportunity;
use alloy::primitives::Address;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::cmp::Ordering;
use tracing::debug;

/// Filters and thresholds applied to every cycle
#[derive(Debug, Clone)]
pub struct DetectorThresholds {
    pub min_liquidity_usd: f64,
    pub min_volume_usd: f64,
    pub min_spread_percent: f64,
    pub max_snapshot_age: ChronoDuration,
    /// Trade size used for the profit estimate
    pub trade_amount_base: f64,
}

impl DetectorThresholds {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            min_liquidity_usd: config.min_liquidity_usd,
            min_volume_usd: config.min_volume_usd,
            min_spread_percent: config.min_spread_percent,
            max_snapshot_age: ChronoDuration::from_std(config.max_snapshot_age)
                .unwrap_or(ChronoDuration::MAX),
            trade_amount_base: config.trade_amount_base_token,
        }
    }
}

/// Opportunity detector for cross-DEX spreads
pub struct OpportunityDetector {
    thresholds: DetectorThresholds,
}

impl OpportunityDetector {
    pub fn new(thresholds: DetectorThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &DetectorThresholds {
        &self.thresholds
    }

    /// Evaluate one token's quote set.
    ///
    /// Returns `None` when fewer than two venues survive filtering, when the
    /// token is cooling down, or when the best spread is below MIN_SPREAD_PERCENT.
    pub fn evaluate(
        &self,
        token: Address,
        quotes: &[NormalizedQuote],
        cooldown: &CooldownState,
        now: DateTime<Utc>,
    ) -> Option<Opportunity> {
        let t = &self.thresholds;

        let eligible: Vec<&NormalizedQuote> = quotes
            .iter()
            .filter(|q| q.snapshot.token_address == token)
            .filter(|q| q.price_in_base.is_finite() && q.price_in_base > 0.0)
            .filter(|q| q.liquidity_usd() >= t.min_liquidity_usd)
            .filter(|q| q.volume_24h_usd() >= t.min_volume_usd)
            .filter(|q| now - q.observed_at() <= t.max_snapshot_age)
            .collect();

        if eligible.len() < 2 {
            debug!(
                "{:?}: {} of {} venues pass filters, need 2",
                token,
                eligible.len(),
                quotes.len()
            );
            return None;
        }

        if let Some(left) = cooldown.remaining(&token, now) {
            debug!("{:?}: cooling down for {}s", token, left.num_seconds());
            return None;
        }

        // Cheapest venue; equal prices prefer deeper liquidity
        let (buy_index, buy) = eligible
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                cmp_price(a.price_in_base, b.price_in_base)
                    .then_with(|| cmp_price(b.liquidity_usd(), a.liquidity_usd()))
            })?;

        let (_, sell) = eligible
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != buy_index)
            .max_by(|(_, a), (_, b)| {
                cmp_price(a.price_in_base, b.price_in_base)
                    .then_with(|| cmp_price(a.liquidity_usd(), b.liquidity_usd()))
            })?;

        let spread_percent = Opportunity::spread(buy.price_in_base, sell.price_in_base);
        if spread_percent < t.min_spread_percent {
            debug!(
                "{:?}: best spread {:.3}% ({} -> {}) below {:.3}%",
                token, spread_percent, buy.dex_id, sell.dex_id, t.min_spread_percent
            );
            return None;
        }

        let fee_factor = (1.0 - buy.fee_bps() / 10_000.0) * (1.0 - sell.fee_bps() / 10_000.0);
        let estimated_profit_base =
            t.trade_amount_base * ((sell.price_in_base / buy.price_in_base) * fee_factor - 1.0);

        Some(Opportunity {
            token,
            buy_dex: buy.dex_id.clone(),
            sell_dex: sell.dex_id.clone(),
            buy_price: buy.price_in_base,
            sell_price: sell.price_in_base,
            spread_percent,
            estimated_profit_base,
            detected_at: now,
        })
    }
}

fn cmp_price(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::SwapCurve;
    use crate::testing::{reserve_snapshot, TOKEN};
    use crate::types::{PoolSnapshot, RouterConfig, RouterVenue};
    use std::time::Duration;

    fn thresholds() -> DetectorThresholds {
        DetectorThresholds {
            min_liquidity_usd: 1000.0,
            min_volume_usd: 0.0,
            min_spread_percent: 1.0,
            max_snapshot_age: ChronoDuration::seconds(30),
            trade_amount_base: 0.05,
        }
    }

    fn quote(snapshot: PoolSnapshot) -> NormalizedQuote {
        let router = RouterConfig {
            dex_id: snapshot.dex_id.clone(),
            address: Address::repeat_byte(0x10),
            venue: RouterVenue::UniswapV2,
            fee_bps: Some(30),
        };
        NormalizedQuote::local(&snapshot, &router, SwapCurve::ConstantProduct, 0.05).unwrap()
    }

    fn pool(dex: &str, reserve_base: f64) -> NormalizedQuote {
        quote(reserve_snapshot(dex, 1000.0, reserve_base))
    }

    fn no_cooldown() -> CooldownState {
        CooldownState::new(Duration::from_secs(60))
    }

    #[test]
    fn test_two_pool_spread_scenario() {
        let detector = OpportunityDetector::new(thresholds());
        let quotes = vec![pool("A", 2.0), pool("B", 2.05)];

        let opp = detector
            .evaluate(TOKEN, &quotes, &no_cooldown(), Utc::now())
            .expect("2.5% spread should be emitted");
        assert_eq!(opp.buy_dex, "A");
        assert_eq!(opp.sell_dex, "B");
        assert!((opp.buy_price - 0.002).abs() < 1e-12);
        assert!((opp.sell_price - 0.00205).abs() < 1e-12);
        assert!((opp.spread_percent - 2.5).abs() < 1e-9);
        // 2.5% gross minus two 0.3% fees
        assert!(opp.estimated_profit_base > 0.0);
        assert!(opp.estimated_profit_base < 0.05 * 0.025);
    }

    #[test]
    fn test_spread_below_threshold() {
        let detector = OpportunityDetector::new(thresholds());
        let quotes = vec![pool("A", 2.0), pool("B", 2.01)];
        assert!(detector.evaluate(TOKEN, &quotes, &no_cooldown(), Utc::now()).is_none());
    }

    #[test]
    fn test_never_emits_below_min_spread() {
        let detector = OpportunityDetector::new(thresholds());
        let now = Utc::now();
        for step in 0..40 {
            let high = 2.0 + step as f64 * 0.001;
            let quotes = vec![pool("A", 2.0), pool("B", high), pool("C", 2.0 + (high - 2.0) / 2.0)];
            if let Some(opp) = detector.evaluate(TOKEN, &quotes, &no_cooldown(), now) {
                assert!(opp.spread_percent >= 1.0, "emitted {}", opp.spread_percent);
                assert_ne!(opp.buy_dex, opp.sell_dex);
            }
        }
    }

    #[test]
    fn test_fewer_than_two_after_liquidity_filter() {
        let detector = OpportunityDetector::new(thresholds());
        let mut thin = reserve_snapshot("B", 1000.0, 2.5);
        thin.liquidity_usd = 500.0;
        let quotes = vec![pool("A", 2.0), quote(thin)];
        assert!(detector.evaluate(TOKEN, &quotes, &no_cooldown(), Utc::now()).is_none());
    }

    #[test]
    fn test_volume_filter() {
        let mut t = thresholds();
        t.min_volume_usd = 100_000.0;
        let detector = OpportunityDetector::new(t);
        let quotes = vec![pool("A", 2.0), pool("B", 2.05)];
        assert!(detector.evaluate(TOKEN, &quotes, &no_cooldown(), Utc::now()).is_none());
    }

    #[test]
    fn test_stale_snapshot_dropped() {
        let detector = OpportunityDetector::new(thresholds());
        let now = Utc::now();
        let mut stale = reserve_snapshot("B", 1000.0, 2.05);
        stale.observed_at = now - ChronoDuration::seconds(31);
        let quotes = vec![pool("A", 2.0), quote(stale), pool("C", 2.01)];

        // B is gone; A/C spread is only 0.5%
        assert!(detector.evaluate(TOKEN, &quotes, &no_cooldown(), now).is_none());
    }

    #[test]
    fn test_cooldown_blocks_emission() {
        let mut t = thresholds();
        t.max_snapshot_age = ChronoDuration::seconds(120);
        let detector = OpportunityDetector::new(t);
        let quotes = vec![pool("A", 2.0), pool("B", 2.05)];
        let cooldown = no_cooldown();
        let now = Utc::now();
        cooldown.record_attempt(TOKEN, now - ChronoDuration::seconds(10));
        assert!(detector.evaluate(TOKEN, &quotes, &cooldown, now).is_none());

        // Window over
        assert!(detector
            .evaluate(TOKEN, &quotes, &cooldown, now + ChronoDuration::seconds(51))
            .is_some());
    }

    #[test]
    fn test_tie_break_prefers_liquidity() {
        let detector = OpportunityDetector::new(thresholds());
        let mut deep_buy = reserve_snapshot("deep_buy", 1000.0, 2.0);
        deep_buy.liquidity_usd = 50_000.0;
        let mut deep_sell = reserve_snapshot("deep_sell", 1000.0, 2.1);
        deep_sell.liquidity_usd = 50_000.0;
        let quotes = vec![
            pool("shallow_buy", 2.0),
            quote(deep_buy),
            pool("shallow_sell", 2.1),
            quote(deep_sell),
        ];

        let opp = detector.evaluate(TOKEN, &quotes, &no_cooldown(), Utc::now()).unwrap();
        assert_eq!(opp.buy_dex, "deep_buy");
        assert_eq!(opp.sell_dex, "deep_sell");
    }

    #[test]
    fn test_equal_prices_never_pair_with_self() {
        let detector = OpportunityDetector::new(thresholds());
        let quotes = vec![pool("A", 2.0), pool("B", 2.0)];
        assert!(detector.evaluate(TOKEN, &quotes, &no_cooldown(), Utc::now()).is_none());
    }
}
