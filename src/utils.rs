use std::future::Future;

use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

use crate::models::retry::RetryConfig;

/// Largest relative deviation applied to a backoff delay.
const JITTER: f64 = 0.1;

/// Runs `operation` until it succeeds or the attempt budget is spent, returning the last error.
///
/// Channel adapters never call this: a `send` is exactly one provider call. It is for
/// callers that own a retry policy, such as the delivery recorder.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay_ms = config.initial_delay_ms;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(attempt, max_attempts, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if attempt >= max_attempts {
            warn!(max_attempts, error = %err, "Giving up after final attempt");
            return Err(err);
        }

        let wait = jittered(delay_ms);
        debug!(
            attempt,
            max_attempts,
            wait_ms = wait.as_millis() as u64,
            error = %err,
            "Attempt failed, backing off"
        );
        sleep(wait).await;

        delay_ms = next_delay(delay_ms, config);
    }
}

fn jittered(delay_ms: u64) -> Duration {
    let factor = 1.0 + rand::random_range(-JITTER..=JITTER);
    Duration::from_millis((delay_ms as f64 * factor) as u64)
}

/// Grows the delay geometrically up to the cap. A multiplier below one holds it constant.
fn next_delay(delay_ms: u64, config: &RetryConfig) -> u64 {
    delay_ms
        .saturating_mul(config.backoff_multiplier.max(1))
        .min(config.max_delay_ms)
}
