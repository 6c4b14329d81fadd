//! Bounded retry for automatic reads

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::Result;

/// Run `op` up to `config.attempts` times with a linearly growing delay.
///
/// Only the automatic refresh path goes through here. User-initiated writes
/// are never retried.
pub async fn with_retry<T, F, Fut>(what: &str, config: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempts >= max_attempts {
                    return Err(e);
                }

                warn!("{} attempt {} failed: {}. Retrying...", what, attempts, e);

                let delay = Duration::from_millis(config.delay_ms * u64::from(attempts));
                sleep(delay).await;
            }
        }
    }
}
