//! Retryable conditional mutation
//!
//! One loop for every optimistic write in the crate: read, compute, conditional
//! write, and on a lost race try again after a short linear backoff.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::LedgerConfig;

/// Result of a single conditional-write attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome<T> {
    /// The write matched the expected version and was applied
    Applied(T),
    /// Zero rows affected: a concurrent writer won the race
    Conflict,
}

/// Why the retry loop stopped without an applied write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt lost its race
    Exhausted { attempts: u32 },
    /// The attempt itself rejected the operation (domain or storage error)
    Aborted(E),
}

/// Linear backoff policy: delay before retry n is `base_delay_ms * n`
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub jitter_pct: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, jitter_pct: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.backoff_base_ms,
            config.backoff_jitter_pct,
        )
    }

    /// No sleeping between attempts. Tests only need the attempt count.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, 0, 0.0)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.base_delay_ms.saturating_mul(u64::from(attempt));
        if delay == 0 || self.jitter_pct == 0.0 {
            return Duration::from_millis(delay);
        }
        let spread = (delay as f64 * self.jitter_pct) as i64;
        let delta = rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis(delay.saturating_add_signed(delta))
    }

    /// Drive `op` until it applies, aborts, or runs out of attempts.
    ///
    /// `op` receives the 1-based attempt number and must re-read whatever
    /// state its guard depends on: a stale read is never retried as-is.
    pub async fn run<F, Fut, T, E>(&self, label: &'static str, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<CasOutcome<T>, E>>,
    {
        for attempt in 1..=self.max_attempts {
            match op(attempt).await {
                Ok(CasOutcome::Applied(value)) => return Ok(value),
                Ok(CasOutcome::Conflict) => {
                    debug!(op = label, attempt, "Conditional write lost race");
                    if attempt < self.max_attempts {
                        let delay = self.delay_for(attempt);
                        if !delay.is_zero() {
                            sleep(delay).await;
                        }
                    }
                }
                Err(e) => return Err(RetryError::Aborted(e)),
            }
        }

        warn!(
            op = label,
            attempts = self.max_attempts,
            "Conditional write contention exhausted"
        );
        Err(RetryError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&LedgerConfig::default())
    }
}
