//! Token-Level Cooldown: suppress new trade attempts on a recently traded token
//!
//! Purpose:
//!     Every TradeAttempt that reaches a terminal state (succeeded, failed or
//!     partiallyExecuted) stamps its token. No new attempt is created for that
//!     token until TRADE_COOLDOWN_SECONDS have elapsed.
//!
//! Created: 2026-01-31
//! Modified: 2026-02-03 - Keyed by token, wall-clock window instead of block escalation
//!
//! Design:
//!     - Key: token address
//!     - Window is fixed; the stamp is written once per attempt by the execution engine
//!     - Detector reads, engine writes; DashMap gives per-key exclusive access
//!     - Periodic cleanup removes expired entries to bound memory

use alloy::primitives::Address;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::time::Duration;
use tracing::debug;

/// Last attempt timestamp per token
#[derive(Debug)]
pub struct CooldownState {
    window: ChronoDuration,
    last_attempt: DashMap<Address, DateTime<Utc>>,
}

impl CooldownState {
    /// `window` = minimum time between two attempts on the same token (zero disables)
    pub fn new(window: Duration) -> Self {
        Self {
            window: ChronoDuration::from_std(window).unwrap_or(ChronoDuration::MAX),
            last_attempt: DashMap::new(),
        }
    }

    pub fn window(&self) -> ChronoDuration {
        self.window
    }

    /// True while `token` is inside its cooldown window at `now`
    pub fn is_cooling_down(&self, token: &Address, now: DateTime<Utc>) -> bool {
        self.remaining(token, now).is_some()
    }

    /// Time left in the window, `None` once it has expired
    pub fn remaining(&self, token: &Address, now: DateTime<Utc>) -> Option<ChronoDuration> {
        if self.window.is_zero() {
            return None;
        }
        let last = *self.last_attempt.get(token)?;
        let expires_at = last.checked_add_signed(self.window)?;
        (now < expires_at).then(|| expires_at - now)
    }

    /// Stamp `token` with the time its attempt finished
    pub fn record_attempt(&self, token: Address, at: DateTime<Utc>) {
        self.last_attempt.insert(token, at);
        debug!("Cooldown set for {:?} until {}", token, at + self.window);
    }

    pub fn last_attempt(&self, token: &Address) -> Option<DateTime<Utc>> {
        self.last_attempt.get(token).map(|t| *t)
    }

    /// Remove expired entries to bound memory usage.
    pub fn cleanup(&self, now: DateTime<Utc>) {
        let before = self.last_attempt.len();
        let window = self.window;
        self.last_attempt.retain(|_, last| now - *last < window);
        let removed = before - self.last_attempt.len();
        if removed > 0 {
            debug!("Cooldown cleanup: removed {} expired entries", removed);
        }
    }

    /// Number of tokens currently tracked
    pub fn active_count(&self) -> usize {
        self.last_attempt.len()
    }
}
