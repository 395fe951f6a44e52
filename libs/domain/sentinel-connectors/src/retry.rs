use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::ConnectorError;

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY_MS: u64 = 100;
const CAP_DELAY_MS: u64 = 10_000;

/// Retries only `ConnectorError::Transient` and `ConnectorError::RateLimited`
/// — a 4xx that isn't a 429, a config fault, or an expired credential is
/// terminal on the first attempt. `RateLimited` honors its `retry_after_secs`
/// instead of the exponential schedule, since the source told us exactly how
/// long to wait.
pub async fn with_retry<F, Fut, T>(mut operation: F) -> Result<T, ConnectorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ConnectorError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= MAX_ATTEMPTS || !err.is_retryable() => return Err(err),
            Err(ConnectorError::RateLimited { retry_after_secs }) => {
                warn!(attempt, retry_after_secs, "rate limited, honoring Retry-After");
                tokio::time::sleep(Duration::from_secs(retry_after_secs)).await;
            }
            Err(err) => {
                let backoff = (BASE_DELAY_MS * 2u64.pow(attempt - 1)).min(CAP_DELAY_MS);
                let jitter = rand::thread_rng().gen_range(0..=backoff / 2 + 1);
                warn!(attempt, backoff_ms = backoff + jitter, error = %err, "transient connector fault, retrying");
                tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(|| async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(ConnectorError::Transient("flaky".into()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_errors_never_retry() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), ConnectorError> = with_retry(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(ConnectorError::Credential("expired".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
