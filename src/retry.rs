//! Declarative retry policy for transient transport failures.
//!
//! The policy is plain data: how many attempts, the backoff schedule, and the
//! set of status codes worth retrying. [`retry_with_backoff`] consumes it on
//! behalf of the signing call, so the schedule itself can be tested without
//! any network.
//!
//! # Example
//!
//! ```ignore
//! use tee_client::retry::{retry_with_backoff, RetryPolicy};
//!
//! let response = retry_with_backoff(&RetryPolicy::default(), "sign", || {
//!     let mut client = client.clone();
//!     let request = request.clone();
//!     async move { client.sign(request).await }
//! })
//! .await?;
//! ```

use std::time::Duration;

use tonic::{Code, Status};
use tracing::{error, warn};

/// Retry configuration for remote calls.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one (minimum 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Multiplier applied to the delay after each retryable failure
    pub backoff_multiplier: f64,
    /// Upper bound on any single delay
    pub max_backoff: Duration,
    /// Status codes that trigger a retry; all others are surfaced immediately
    pub retryable_codes: Vec<Code>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(1),
            retryable_codes: vec![Code::Unavailable, Code::DeadlineExceeded],
        }
    }
}

impl RetryPolicy {
    /// Policy that makes a single attempt and never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Default policy with a different attempt budget
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Whether `status` is in the retryable set
    pub fn is_retryable(&self, status: &Status) -> bool {
        self.retryable_codes.contains(&status.code())
    }

    /// Delay before retry number `retry_index` (0 = first retry)
    ///
    /// `initial_backoff * multiplier^retry_index`, capped at `max_backoff`.
    pub fn backoff_for(&self, retry_index: u32) -> Duration {
        let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_backoff)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Execute a remote call, retrying retryable statuses per `policy`.
///
/// Non-retryable statuses are returned after the first attempt. When the
/// attempt budget is exhausted the last status is returned. Callers bound
/// the whole loop (including backoff sleeps) with their own deadline;
/// dropping the returned future stops any pending retry.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, Status>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Status>>,
{
    let max_attempts = policy.attempts();
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let status = match operation().await {
            Ok(result) => return Ok(result),
            Err(status) => status,
        };

        if !policy.is_retryable(&status) {
            return Err(status);
        }

        if attempt >= max_attempts {
            error!(
                operation = %operation_name,
                attempt = attempt,
                code = ?status.code(),
                error = %status.message(),
                "Operation failed after max retries"
            );
            return Err(status);
        }

        let delay = policy.backoff_for(attempt - 1);
        warn!(
            operation = %operation_name,
            attempt = attempt,
            code = ?status.code(),
            error = %status.message(),
            delay_ms = delay.as_millis() as u64,
            "Operation failed, retrying"
        );

        tokio::time::sleep(delay).await;
    }
}
