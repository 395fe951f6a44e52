use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::GraphError;

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY_MS: u64 = 20;
const CAP_DELAY_MS: u64 = 500;

fn is_contention(err: &GraphError) -> bool {
    let message = err.to_string();
    message.contains("database is locked") || message.contains("busy") || message.contains("SQLITE_BUSY")
}

/// Bounded exponential backoff with jitter, at most five attempts (spec
/// §4.3). Only backend-contention errors are retried — anything else
/// (endpoint missing, schema mismatch) is returned to the caller on the
/// first failure.
pub async fn with_retry<F, Fut, T>(mut operation: F) -> Result<T, GraphError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GraphError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < MAX_ATTEMPTS && is_contention(&err) => {
                let backoff = (BASE_DELAY_MS * 2u64.pow(attempt - 1)).min(CAP_DELAY_MS);
                let jitter = rand::thread_rng().gen_range(0..=backoff / 2 + 1);
                warn!(attempt, backoff_ms = backoff + jitter, "graph backend contention, retrying");
                tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
            }
            Err(err) if attempt >= MAX_ATTEMPTS && is_contention(&err) => {
                return Err(GraphError::ContentionExhausted(err.to_string()));
            }
            Err(err) => return Err(err),
        }
    }
}
