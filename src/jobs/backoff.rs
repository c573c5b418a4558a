//! # Backoff-Retry Executor
//!
//! Retries a tenant action until it succeeds, reports an identity mismatch, or
//! the job is cancelled. Sleeps between attempts grow as
//! `initial * multiplier^n` and stay at `max` once they reach it; the attempt
//! counter stops advancing at the ceiling, so it can never overflow.

use crate::config::BackoffConfig;
use crate::error::TenantError;
use crate::model::{Action, TenantId};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exponential delay schedule.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    /// A fresh schedule; the first delay is `config.initial`.
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Number of times the delay has grown so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let max = self.config.max;
        let calculated = self.config.initial.as_secs_f64()
            * self.config.time_multiplier.powi(self.attempt as i32);

        if calculated < max.as_secs_f64() {
            self.attempt += 1;
            Duration::from_secs_f64(calculated)
        } else {
            max
        }
    }
}

/// How a retry loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Completed,
    /// The project behind the job no longer has this identity; nothing is left to do.
    IdentityMismatch,
    Cancelled,
}

/// Sleeps for `duration` unless `token` fires first.
///
/// Returns `Err(TenantError::Cancelled)` on cancellation.
pub async fn sleep_with_cancel(token: &CancellationToken, duration: Duration) -> Result<(), TenantError> {
    tokio::select! {
        _ = token.cancelled() => Err(TenantError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Runs `attempt` until it succeeds, hits an identity mismatch, or `token` is cancelled.
///
/// Any other error is logged and retried after the next backoff delay.
pub async fn retry_with_backoff<F, Fut>(
    token: &CancellationToken,
    config: BackoffConfig,
    tenant: &TenantId,
    action: Action,
    mut attempt: F,
) -> RetryOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), TenantError>>,
{
    let mut backoff = Backoff::new(config);

    loop {
        match attempt().await {
            Ok(()) => {
                info!(tenant_id = %tenant, %action, "Action completed successfully");
                return RetryOutcome::Completed;
            }
            Err(e) if e.is_identity_mismatch() => {
                info!(tenant_id = %tenant, %action, "Action completed successfully - watcher belongs to another project");
                return RetryOutcome::IdentityMismatch;
            }
            Err(_) if token.is_cancelled() => {
                info!(tenant_id = %tenant, %action, "Action cancelled");
                return RetryOutcome::Cancelled;
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(tenant_id = %tenant, %action, error = %e, ?delay, "Action failed, retrying");
                if sleep_with_cancel(token, delay).await.is_err() {
                    info!(tenant_id = %tenant, %action, "Action cancelled");
                    return RetryOutcome::Cancelled;
                }
            }
        }
    }
}
