//! Trade audit log
//!
//! Keeps the most recent terminal TradeAttempts in memory and, when
//! TRADE_LOG_PATH is set, appends each one as a JSON line.
//!
//! Created: 2026-02-03

use crate::types::{AttemptStatus, TradeAttempt};
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Terminal attempts kept in memory
pub const HISTORY_CAPACITY: usize = 256;

pub struct TradeLog {
    history: Mutex<VecDeque<TradeAttempt>>,
    capacity: usize,
    /// Session total, unaffected by history eviction
    partial_count: AtomicUsize,
    path: Option<PathBuf>,
}

impl TradeLog {
    /// History only, nothing written to disk
    pub fn in_memory() -> Self {
        Self {
            history: Mutex::new(VecDeque::new()),
            capacity: HISTORY_CAPACITY,
            partial_count: AtomicUsize::new(0),
            path: None,
        }
    }

    /// History plus a JSONL file at `path` (parent directories are created)
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create trade log directory: {:?}", parent))?;
        }
        Ok(Self {
            path: Some(path),
            ..Self::in_memory()
        })
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TradeAttempt>> {
        match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Record a terminal attempt. File errors are logged, never propagated.
    pub fn record(&self, attempt: &TradeAttempt) {
        if attempt.overall_status == AttemptStatus::PartiallyExecuted {
            self.partial_count.fetch_add(1, Ordering::Relaxed);
        }
        {
            let mut history = self.lock();
            history.push_back(attempt.clone());
            while history.len() > self.capacity {
                history.pop_front();
            }
        }

        if let Some(path) = &self.path {
            if let Err(e) = append_line(path, attempt) {
                warn!("Failed to write trade log {:?}: {:#}", path, e);
            }
        }
    }

    /// Most recent first
    pub fn recent(&self, n: usize) -> Vec<TradeAttempt> {
        self.lock().iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Partially executed attempts recorded this session, including evicted ones
    pub fn partially_executed_count(&self) -> usize {
        self.partial_count.load(Ordering::Relaxed)
    }

    /// Attempts in the history window that left the wallet holding the intermediate token
    pub fn partially_executed(&self) -> Vec<TradeAttempt> {
        self.lock()
            .iter()
            .filter(|a| a.overall_status == AttemptStatus::PartiallyExecuted)
            .cloned()
            .collect()
    }
}

fn append_line(path: &Path, attempt: &TradeAttempt) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open trade log: {:?}", path))?;

    let json = serde_json::to_string(attempt).context("Failed to serialize trade attempt")?;
    writeln!(file, "{}", json)?;
    debug!("Trade attempt appended to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BASE, TOKEN};
    use crate::types::{LegStatus, Opportunity, RouterConfig, RouterVenue, SwapSide, TradeLeg};
    use alloy::primitives::Address;
    use chrono::Utc;

    fn leg(side: SwapSide) -> TradeLeg {
        TradeLeg {
            side,
            router: RouterConfig {
                dex_id: "baseswap".to_string(),
                address: Address::repeat_byte(0x10),
                venue: RouterVenue::UniswapV2,
                fee_bps: None,
            },
            token_in: BASE,
            token_out: TOKEN,
            amount_in: 0.05,
            expected_amount_out: 24.6,
            min_amount_out: 24.3,
            amount_in_raw: None,
            min_amount_out_raw: None,
            fee_tier: None,
            stable: false,
            nonce: None,
            tx_hash: None,
            amount_received: None,
            received_raw: None,
            status: LegStatus::NotAttempted,
        }
    }

    fn attempt(status: AttemptStatus) -> TradeAttempt {
        TradeAttempt {
            token: TOKEN,
            opportunity: Opportunity {
                token: TOKEN,
                buy_dex: "A".to_string(),
                sell_dex: "B".to_string(),
                buy_price: 0.002,
                sell_price: 0.00205,
                spread_percent: 2.5,
                estimated_profit_base: 0.0009,
                detected_at: Utc::now(),
            },
            amount_in: 0.05,
            leg1: leg(SwapSide::Buy),
            leg2: leg(SwapSide::Sell),
            gas_limit: 500_000,
            overall_status: status,
            error: None,
            started_at: Some(Utc::now()),
            finished_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let log = TradeLog::in_memory();
        for _ in 0..HISTORY_CAPACITY + 10 {
            log.record(&attempt(AttemptStatus::Failed));
        }
        assert_eq!(log.len(), HISTORY_CAPACITY);
    }

    #[test]
    fn test_partially_executed_filter() {
        let log = TradeLog::in_memory();
        log.record(&attempt(AttemptStatus::Succeeded));
        log.record(&attempt(AttemptStatus::PartiallyExecuted));
        log.record(&attempt(AttemptStatus::Failed));
        assert_eq!(log.partially_executed().len(), 1);
        assert_eq!(log.recent(1)[0].overall_status, AttemptStatus::Failed);
    }

    #[test]
    fn test_partial_count_survives_eviction() {
        let log = TradeLog::in_memory();
        log.record(&attempt(AttemptStatus::PartiallyExecuted));
        log.record(&attempt(AttemptStatus::PartiallyExecuted));
        for _ in 0..HISTORY_CAPACITY {
            log.record(&attempt(AttemptStatus::Failed));
        }
        assert!(log.partially_executed().is_empty());
        assert_eq!(log.partially_executed_count(), 2);
    }

    #[test]
    fn test_jsonl_file() {
        let dir = std::env::temp_dir().join(format!(
            "spreadarb-audit-{}-{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let path = dir.join("trades.jsonl");
        let log = TradeLog::with_file(&path).unwrap();
        log.record(&attempt(AttemptStatus::Succeeded));
        log.record(&attempt(AttemptStatus::PartiallyExecuted));

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["overall_status"], "partiallyExecuted");

        fs::remove_dir_all(&dir).ok();
    }
}
