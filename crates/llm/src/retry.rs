//! Exponential-backoff retry for transient provider errors.

use std::future::Future;
use std::time::Duration;

use serde_json::json;
use tracing::warn;

use prismis_core::{Error, Result};

/// Run `operation` up to `max_retries + 1` times, sleeping
/// `backoff_base^attempt` seconds between attempts. Only
/// [`Error::TransientProvider`] is retried; every other error surfaces
/// immediately. Exhaustion emits an `llm.retry` event with
/// `action=exhausted` and returns the last error.
pub async fn call_with_retry<T, F, Fut>(
    max_retries: u32,
    backoff_base: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 0..=max_retries {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(Error::TransientProvider(message)) => {
                if attempt >= max_retries {
                    prismis_observability::log(
                        "llm.retry",
                        json!({
                            "action": "exhausted",
                            "attempt": attempt + 1,
                            "max_retries": max_retries,
                            "error": message,
                        }),
                    );
                    return Err(Error::TransientProvider(message));
                }

                let delay = backoff_base.saturating_pow(attempt);
                prismis_observability::log(
                    "llm.retry",
                    json!({
                        "action": "retrying",
                        "attempt": attempt + 1,
                        "max_retries": max_retries,
                        "delay_seconds": delay,
                        "error": message,
                    }),
                );
                warn!(
                    attempt = attempt + 1,
                    delay_seconds = delay,
                    error = %message,
                    "transient LLM error, backing off"
                );
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }
            Err(other) => return Err(other),
        }
    }
    unreachable!("retry loop always returns");
}
