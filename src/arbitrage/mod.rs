//! Arbitrage Module
//!
//! Spread detection, two-leg trade planning and execution.
//!
//! Created: 2026-01-27
//! Modified: 2026-02-03 - Planner, execution engine state machine, trade audit log

pub mod audit;
pub mod cooldown;
pub mod detector;
pub mod executor;
pub mod planner;
pub mod swap_call;

pub use audit::TradeLog;
pub use cooldown::CooldownState;
pub use detector::{DetectorThresholds, OpportunityDetector};
pub use executor::{ExecutionEngine, ExecutionSettings, ExecutionSlots, SlotGuard};
pub use planner::{PlannerSettings, SwapPlanner};
