//! Bounded retry with exponential backoff for idempotent GET requests.
//!
//! Retries:
//! - Timeouts
//! - Network errors (connection refused/reset, DNS)
//! - 5xx, 408 and 429 responses
//!
//! Everything else (4xx, invalid payloads, empty geocoding results) fails at once.

use std::future::Future;
use std::time::Duration;

use crate::error::FetchError;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 8000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(initial_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

pub fn is_retryable(err: &FetchError) -> bool {
    match err {
        FetchError::Timeout(_) | FetchError::Network(_) => true,
        FetchError::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
        FetchError::Validation(_) | FetchError::NotFound(_) => false,
    }
}

/// Run `operation`, retrying transient failures according to `policy`.
/// With no policy the operation runs exactly once.
pub async fn with_retry<T, F, Fut>(
    policy: Option<&RetryPolicy>,
    label: &str,
    operation: F,
) -> Result<T, FetchError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_retries = policy.map_or(0, |p| p.max_retries);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(%label, retries = attempt, "request succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt < max_retries && is_retryable(&err) => {
                let delay = policy
                    .map(|p| p.delay_for_attempt(attempt))
                    .unwrap_or_default();
                tracing::warn!(
                    %label,
                    error = %err,
                    "retryable failure on attempt {} of {}, waiting {:?}",
                    attempt + 1,
                    max_retries + 1,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
