use std::num::NonZeroU32;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use tracing::instrument;

use crate::error::IntelError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NvdCveMetadata {
    pub cvss_score: Option<f64>,
    pub cvss_vector: Option<String>,
    pub description: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
}

/// NVD's two documented rate regimes (spec §4.6), selected by whether an
/// API key is configured. Values are requests-per-30-seconds, matching the
/// unit NVD itself publishes its limits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NvdRateRegime {
    Unauthenticated,
    Authenticated,
}

impl NvdRateRegime {
    fn requests_per_30s(self) -> u32 {
        match self {
            NvdRateRegime::Unauthenticated => 5,
            NvdRateRegime::Authenticated => 50,
        }
    }
}

#[async_trait]
pub trait NvdSource: Send + Sync {
    async fn cves_for_cpe(&self, cpe: &str) -> Result<Vec<String>, IntelError>;
    async fn fetch_metadata(&self, cve_id: &str) -> Result<NvdCveMetadata, IntelError>;
}

pub struct ReqwestNvdSource {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ReqwestNvdSource {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self.http.get(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => req.header("apiKey", key),
            None => req,
        }
    }
}

#[derive(Deserialize)]
struct CveMatchResponseDto {
    vulnerabilities: Vec<CveWrapperDto>,
}

#[derive(Deserialize)]
struct CveWrapperDto {
    cve: CveDto,
}

#[derive(Deserialize)]
struct CveDto {
    id: String,
    published: Option<String>,
    #[serde(default)]
    descriptions: Vec<DescriptionDto>,
    #[serde(default)]
    metrics: MetricsDto,
}

#[derive(Deserialize, Default)]
struct MetricsDto {
    #[serde(rename = "cvssMetricV31", default)]
    cvss_v31: Vec<CvssMetricDto>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CvssMetricDto {
    cvss_data: CvssDataDto,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CvssDataDto {
    base_score: f64,
    vector_string: String,
}

#[derive(Deserialize)]
struct DescriptionDto {
    lang: String,
    value: String,
}

async fn handle_response(response: reqwest::Response) -> Result<CveMatchResponseDto, IntelError> {
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
            "NVD query failed: {}",
            response.status()
        )));
    }
    response
        .json()
        .await
        .map_err(|e| IntelError::SourceUnavailable(e.to_string()))
}

#[async_trait]
impl NvdSource for ReqwestNvdSource {
    async fn cves_for_cpe(&self, cpe: &str) -> Result<Vec<String>, IntelError> {
        let response = self
            .request(&format!("/rest/json/cves/2.0?cpeName={cpe}"))
            .send()
            .await
            .map_err(|e| IntelError::SourceUnavailable(e.to_string()))?;
        let dto = handle_response(response).await?;
        Ok(dto.vulnerabilities.into_iter().map(|w| w.cve.id).collect())
    }

    async fn fetch_metadata(&self, cve_id: &str) -> Result<NvdCveMetadata, IntelError> {
        let response = self
            .request(&format!("/rest/json/cves/2.0?cveId={cve_id}"))
            .send()
            .await
            .map_err(|e| IntelError::SourceUnavailable(e.to_string()))?;
        let dto = handle_response(response).await?;
        let cve = dto
            .vulnerabilities
            .into_iter()
            .next()
            .ok_or_else(|| IntelError::SourceUnavailable(format!("{cve_id} not found in NVD")))?
            .cve;
        let metric = cve.metrics.cvss_v31.into_iter().next();
        Ok(NvdCveMetadata {
            cvss_score: metric.as_ref().map(|m| m.cvss_data.base_score),
            cvss_vector: metric.map(|m| m.cvss_data.vector_string),
            description: cve
                .descriptions
                .into_iter()
                .find(|d| d.lang == "en")
                .map(|d| d.value),
            published_date: cve
                .published
                .and_then(|p| DateTime::parse_from_rfc3339(&p).ok())
                .map(|d| d.with_timezone(&Utc)),
        })
    }
}

/// Enforces whichever regime applies locally, rather than trusting the
/// remote side to reject over-quota requests (spec §4.6: "the client
/// enforces the regime locally").
pub struct NvdClient {
    source: std::sync::Arc<dyn NvdSource>,
    limiter: RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>,
    regime: NvdRateRegime,
}

impl NvdClient {
    pub fn new(source: std::sync::Arc<dyn NvdSource>, regime: NvdRateRegime) -> Self {
        let quota = Quota::with_period(std::time::Duration::from_secs(
            30 / regime.requests_per_30s().max(1) as u64 + 1,
        ))
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::new(1).unwrap()));
        Self {
            source,
            limiter: RateLimiter::direct(quota),
            regime,
        }
    }

    pub fn regime(&self) -> NvdRateRegime {
        self.regime
    }

    #[instrument(skip(self))]
    pub async fn cves_for_cpe(&self, cpe: &str) -> Result<Vec<String>, IntelError> {
        self.limiter.until_ready().await;
        self.source.cves_for_cpe(cpe).await
    }

    #[instrument(skip(self))]
    pub async fn fetch_metadata(&self, cve_id: &str) -> Result<NvdCveMetadata, IntelError> {
        self.limiter.until_ready().await;
        self.source.fetch_metadata(cve_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedNvdSource;

    #[async_trait]
    impl NvdSource for FixedNvdSource {
        async fn cves_for_cpe(&self, _cpe: &str) -> Result<Vec<String>, IntelError> {
            Ok(vec!["CVE-2024-1234".into()])
        }

        async fn fetch_metadata(&self, cve_id: &str) -> Result<NvdCveMetadata, IntelError> {
            Ok(NvdCveMetadata {
                cvss_score: Some(9.8),
                cvss_vector: Some("CVSS:3.1/AV:N".into()),
                description: Some("critical RCE".into()),
                published_date: Some(Utc::now()),
            })
            .map(|mut m| {
                m.description = m.description.map(|d| format!("{cve_id}: {d}"));
                m
            })
        }
    }

    #[tokio::test]
    async fn fetches_metadata_for_known_cve() {
        let client = NvdClient::new(std::sync::Arc::new(FixedNvdSource), NvdRateRegime::Authenticated);
        let meta = client.fetch_metadata("CVE-2024-1234").await.unwrap();
        assert_eq!(meta.cvss_score, Some(9.8));
    }

    #[test]
    fn authenticated_regime_allows_more_throughput_than_unauthenticated() {
        assert!(
            NvdRateRegime::Authenticated.requests_per_30s()
                > NvdRateRegime::Unauthenticated.requests_per_30s()
        );
    }
}
