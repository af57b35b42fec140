//! Token monitor
//!
//! One polling loop per token: fetch -> normalize -> detect -> plan -> execute.
//! Fetching, quoting and planning are raced against the shutdown signal;
//! an attempt handed to the execution engine always runs to a terminal state.
//! No error ends the loop.
//!
//! Created: 2026-02-03

use crate::arbitrage::{ExecutionEngine, OpportunityDetector, SwapPlanner};
use crate::errors::{ExecutionError, PlanError};
use crate::feed::PriceFeed;
use crate::pool::QuoteNormalizer;
use crate::types::{AttemptStatus, TradeAttempt};
use alloy::primitives::Address;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Status line every N cycles
const STATUS_EVERY: u64 = 100;

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    /// Detect and plan, never submit
    pub dry_run: bool,
}

/// What one polling cycle ended with
#[derive(Debug)]
pub enum CycleOutcome {
    Shutdown,
    /// An earlier attempt on this token still holds the execution slot
    SlotBusy,
    FeedFailed(String),
    NoOpportunity { venues: usize },
    Rejected(PlanError),
    DryRun(Box<TradeAttempt>),
    Executed(Box<TradeAttempt>),
    Refused(ExecutionError),
}

/// Shared pipeline; one `run` task per token
pub struct Monitor {
    feed: Arc<dyn PriceFeed>,
    normalizer: QuoteNormalizer,
    detector: OpportunityDetector,
    planner: SwapPlanner,
    engine: Arc<ExecutionEngine>,
    settings: MonitorSettings,
}

impl Monitor {
    pub fn new(
        feed: Arc<dyn PriceFeed>,
        normalizer: QuoteNormalizer,
        detector: OpportunityDetector,
        planner: SwapPlanner,
        engine: Arc<ExecutionEngine>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            feed,
            normalizer,
            detector,
            planner,
            engine,
            settings,
        }
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    /// Poll `token` until the shutdown flag flips to true
    pub async fn run(self: Arc<Self>, token: Address, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut cycles: u64 = 0;
        let mut opportunities: u64 = 0;
        let mut executed: u64 = 0;

        info!(
            "Monitoring {:?} every {:.2}s{}",
            token,
            self.settings.poll_interval.as_secs_f64(),
            if self.settings.dry_run { " (DRY RUN)" } else { "" }
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {}
                _ = interval.tick() => {}
            }
            if *shutdown.borrow() {
                break;
            }

            cycles += 1;
            match self.run_cycle(token, &mut shutdown).await {
                CycleOutcome::Shutdown => break,
                CycleOutcome::SlotBusy => debug!("{:?}: execution in flight, skipping cycle", token),
                CycleOutcome::FeedFailed(e) => warn!("{:?}: price feed failed: {}", token, e),
                CycleOutcome::NoOpportunity { venues } => {
                    debug!("{:?}: no opportunity across {} venues", token, venues)
                }
                CycleOutcome::Rejected(e) => {
                    opportunities += 1;
                    info!("{:?}: opportunity discarded: {}", token, e);
                }
                CycleOutcome::DryRun(attempt) => {
                    opportunities += 1;
                    info!(
                        "[DRY RUN] {:?}: would buy {:.6} base on {} -> {:.6} token, sell on {} -> {:.6} base",
                        token,
                        attempt.amount_in,
                        attempt.leg1.router.dex_id,
                        attempt.leg1.expected_amount_out,
                        attempt.leg2.router.dex_id,
                        attempt.leg2.expected_amount_out
                    );
                }
                CycleOutcome::Executed(attempt) => {
                    opportunities += 1;
                    executed += 1;
                    if attempt.overall_status == AttemptStatus::PartiallyExecuted {
                        error!(
                            "{:?}: holding unsold inventory, {} partial attempt(s) on record",
                            token,
                            self.engine.trade_log().partially_executed_count()
                        );
                    }
                }
                CycleOutcome::Refused(e) => debug!("{:?}: {}", token, e),
            }

            if cycles % STATUS_EVERY == 0 {
                self.engine.cooldown().cleanup(Utc::now());
                info!(
                    "{:?}: {} cycles | {} opportunities | {} executed",
                    token, cycles, opportunities, executed
                );
            }
        }

        info!("{:?}: monitor stopped after {} cycles", token, cycles);
    }

    /// One fetch -> execute pass for `token`
    pub async fn run_cycle(&self, token: Address, shutdown: &mut watch::Receiver<bool>) -> CycleOutcome {
        if self.engine.slots().is_held(&token) {
            return CycleOutcome::SlotBusy;
        }

        let snapshots = tokio::select! {
            biased;
            _ = shutdown.changed() => return CycleOutcome::Shutdown,
            result = self.feed.fetch_snapshots(token) => match result {
                Ok(snapshots) => snapshots,
                Err(e) => return CycleOutcome::FeedFailed(e.to_string()),
            },
        };

        // Every venue of this cycle is quoted before detection runs
        let quotes = tokio::select! {
            biased;
            _ = shutdown.changed() => return CycleOutcome::Shutdown,
            quotes = self.normalizer.normalize_all(&snapshots) => quotes,
        };

        let Some(opportunity) =
            self.detector
                .evaluate(token, &quotes, self.engine.cooldown(), Utc::now())
        else {
            return CycleOutcome::NoOpportunity {
                venues: quotes.len(),
            };
        };

        info!(
            "💰 {:?}: buy {} @ {:.8}, sell {} @ {:.8} | spread {:.2}% | est. profit {:.6} base",
            token,
            opportunity.buy_dex,
            opportunity.buy_price,
            opportunity.sell_dex,
            opportunity.sell_price,
            opportunity.spread_percent,
            opportunity.estimated_profit_base
        );

        let attempt = tokio::select! {
            biased;
            _ = shutdown.changed() => return CycleOutcome::Shutdown,
            planned = self.planner.plan_from(&opportunity, &quotes) => match planned {
                Ok(attempt) => attempt,
                Err(e) => return CycleOutcome::Rejected(e),
            },
        };

        if self.settings.dry_run {
            return CycleOutcome::DryRun(Box::new(attempt));
        }

        match self.engine.execute(attempt).await {
            Ok(attempt) => CycleOutcome::Executed(Box::new(attempt)),
            Err(e) => CycleOutcome::Refused(e),
        }
    }
}
