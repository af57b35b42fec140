//! RPC resilience layer
//!
//! Wraps any single chain call with a bounded exponential backoff:
//! attempt 1 runs immediately, attempt n (n >= 2) waits
//! `backoff_factor * 2^(n-2)` seconds. Every attempt carries its own timeout;
//! a timeout counts as a transient failure. Fatal failures are returned at once.
//!
//! Knows nothing about trading; callers inspect the returned `RpcError`.
//!
//! Created: 2026-02-03

use crate::config::BotConfig;
use crate::errors::RpcError;
use crate::rpc::client::CallError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry budget and delay schedule shared by every chain call site
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Base delay in seconds
    pub backoff_factor: f64,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_factor: f64, call_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_factor: backoff_factor.max(0.0),
            call_timeout,
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(
            config.rpc_max_retries,
            config.rpc_backoff_factor,
            config.rpc_call_timeout,
        )
    }

    /// Delay slept before `attempt` (1-based)
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(30) as i32;
        Duration::from_secs_f64(self.backoff_factor * 2f64.powi(exponent))
    }

    /// Full delay schedule, one entry per attempt
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_attempts).map(|a| self.delay_before(a)).collect()
    }

    /// Run `call` under this policy
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, RpcError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=self.max_attempts {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                debug!(
                    "{}: attempt {}/{} in {:.2}s",
                    operation,
                    attempt,
                    self.max_attempts,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }

            match tokio::time::timeout(self.call_timeout, call()).await {
                Ok(Ok(value)) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", operation, attempt);
                    }
                    return Ok(value);
                }
                Ok(Err(CallError::Fatal(message))) => {
                    warn!("{} failed (fatal, not retried): {}", operation, message);
                    return Err(RpcError::Fatal {
                        operation: operation.to_string(),
                        message,
                    });
                }
                Ok(Err(CallError::Transient(message))) => {
                    warn!(
                        "{} attempt {}/{} failed: {}",
                        operation, attempt, self.max_attempts, message
                    );
                    last_error = message;
                }
                Err(_) => {
                    warn!(
                        "{} attempt {}/{} timed out after {:?}",
                        operation, attempt, self.max_attempts, self.call_timeout
                    );
                    last_error = format!("timed out after {:?}", self.call_timeout);
                }
            }
        }

        Err(RpcError::Exhausted {
            operation: operation.to_string(),
            attempts: self.max_attempts,
            last_error,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, 0.5, Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn secs(v: f64) -> Duration {
        Duration::from_secs_f64(v)
    }

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::new(5, 0.5, Duration::from_secs(10));
        assert_eq!(
            policy.schedule(),
            vec![secs(0.0), secs(0.5), secs(1.0), secs(2.0), secs(4.0)]
        );
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let policy = RetryPolicy::new(0, 0.5, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.schedule(), vec![Duration::ZERO]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_budget() {
        let policy = RetryPolicy::new(5, 0.5, Duration::from_secs(10));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), RpcError> = policy
            .run("get_receipt", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CallError::Transient("connection reset".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        match result {
            Err(RpcError::Exhausted { attempts, last_error, .. }) => {
                assert_eq!(attempts, 5);
                assert_eq!(last_error, "connection reset");
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
        // 0 + 0.5 + 1 + 2 + 4 seconds of backoff
        let elapsed = start.elapsed();
        assert!(elapsed >= secs(7.5), "elapsed {:?}", elapsed);
        assert!(elapsed < secs(7.6), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_not_retried() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<u64, RpcError> = policy
            .run("send_transaction", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CallError::Fatal("invalid signature".into())) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RpcError::Fatal { .. })));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result = policy
            .run("get_nonce", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CallError::Transient("429".into()))
                    } else {
                        Ok(7u64)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_attempt() {
        let policy = RetryPolicy::new(2, 0.5, Duration::from_secs(3));
        let calls = AtomicU32::new(0);

        let result: Result<(), RpcError> = policy
            .run("quote", || {
                calls.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<Result<(), CallError>>()
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        match result {
            Err(RpcError::Exhausted { last_error, .. }) => assert!(last_error.contains("timed out")),
            other => panic!("expected Exhausted, got {:?}", other),
        }
    }
}
