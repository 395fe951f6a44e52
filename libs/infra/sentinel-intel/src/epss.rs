use std::collections::HashMap;
use std::num::NonZeroU32;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use tracing::instrument;

use crate::error::IntelError;

const BATCH_SIZE: usize = 30;

/// One batch round-trip to the EPSS source. The HTTP implementation issues
/// one request per batch of up to 30 CVEs (spec §4.6); a test double can
/// return canned scores per batch.
#[async_trait]
pub trait EpssSource: Send + Sync {
    async fn fetch_batch(&self, cve_ids: &[String]) -> Result<HashMap<String, f64>, IntelError>;
}

pub struct ReqwestEpssSource {
    http: reqwest::Client,
    base_url: String,
}

impl ReqwestEpssSource {
    pub fn new(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }
}

#[derive(Deserialize)]
struct EpssResponseDto {
    data: Vec<EpssScoreDto>,
}

#[derive(Deserialize)]
struct EpssScoreDto {
    cve: String,
    epss: String,
}

#[async_trait]
impl EpssSource for ReqwestEpssSource {
    async fn fetch_batch(&self, cve_ids: &[String]) -> Result<HashMap<String, f64>, IntelError> {
        let joined = cve_ids.join(",");
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("cve", joined.as_str())])
            .send()
            .await
            .map_err(|e| IntelError::SourceUnavailable(e.to_string()))?;
        if response.status().as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(30);
            return Err(IntelError::RateLimited { retry_after_secs });
        }
        if !response.status().is_success() {
            return Err(IntelError::SourceUnavailable(format!(
                "EPSS batch fetch failed: {}",
                response.status()
            )));
        }
        let dto: EpssResponseDto = response
            .json()
            .await
            .map_err(|e| IntelError::SourceUnavailable(e.to_string()))?;
        Ok(dto
            .data
            .into_iter()
            .filter_map(|s| s.epss.parse::<f64>().ok().map(|score| (s.cve, score)))
            .collect())
    }
}

/// Splits a CVE list into batches of 30 and dispatches them concurrently
/// under a shared rate limiter (spec §4.6). One batch failing doesn't fail
/// the others — their scores are simply absent from the returned map, which
/// the enrichment orchestrator treats as "field unresolved", not a hard
/// error (S4).
pub struct EpssClient {
    source: std::sync::Arc<dyn EpssSource>,
    limiter: RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>,
}

impl EpssClient {
    pub fn new(source: std::sync::Arc<dyn EpssSource>, requests_per_second: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second.max(1)).unwrap());
        Self {
            source,
            limiter: RateLimiter::direct(quota),
        }
    }

    #[instrument(skip(self, cve_ids), fields(count = cve_ids.len()))]
    pub async fn fetch_scores(&self, cve_ids: &[String]) -> HashMap<String, f64> {
        let batches: Vec<Vec<String>> = cve_ids
            .chunks(BATCH_SIZE)
            .map(|chunk| chunk.to_vec())
            .collect();

        let results: Vec<HashMap<String, f64>> = stream::iter(batches)
            .map(|batch| async move {
                self.limiter.until_ready().await;
                self.source.fetch_batch(&batch).await.unwrap_or_default()
            })
            .buffer_unordered(4)
            .collect()
            .await;

        let mut merged = HashMap::new();
        for batch_scores in results {
            merged.extend(batch_scores);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEpssSource;

    #[async_trait]
    impl EpssSource for FixedEpssSource {
        async fn fetch_batch(&self, cve_ids: &[String]) -> Result<HashMap<String, f64>, IntelError> {
            Ok(cve_ids.iter().map(|id| (id.clone(), 0.73)).collect())
        }
    }

    #[tokio::test]
    async fn batches_larger_than_30_are_split_and_merged() {
        let cve_ids: Vec<String> = (0..45).map(|i| format!("CVE-2024-{i}")).collect();
        let client = EpssClient::new(std::sync::Arc::new(FixedEpssSource), 100);
        let scores = client.fetch_scores(&cve_ids).await;
        assert_eq!(scores.len(), 45);
        assert_eq!(scores["CVE-2024-0"], 0.73);
    }

    struct FailingEpssSource;

    #[async_trait]
    impl EpssSource for FailingEpssSource {
        async fn fetch_batch(&self, _cve_ids: &[String]) -> Result<HashMap<String, f64>, IntelError> {
            Err(IntelError::SourceUnavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn unreachable_source_yields_empty_map_not_an_error() {
        let client = EpssClient::new(std::sync::Arc::new(FailingEpssSource), 100);
        let scores = client.fetch_scores(&["CVE-2024-1".to_string()]).await;
        assert!(scores.is_empty());
    }
}
