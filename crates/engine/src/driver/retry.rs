//! Bounded exponential backoff for data source reads.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use ccp_core::config::RetryConfig;

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at `max_delay`.
pub fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    retry.base_delay.saturating_mul(factor).min(retry.max_delay)
}

/// Run `op` up to `retry.max_attempts` times, sleeping between attempts.
pub async fn with_retry<T, E, F, Fut>(retry: &RetryConfig, tag_id: &str, mut op: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = retry.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                let delay = backoff_delay(retry, attempt);
                debug!(tag_id, attempt, error = %e, delay_ms = delay.as_millis() as u64, "read failed; retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
