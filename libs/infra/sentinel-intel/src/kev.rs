use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::error::IntelError;

#[derive(Debug, Clone, PartialEq)]
pub struct KevCatalogEntry {
    pub cve_id: String,
    pub date_added: DateTime<Utc>,
}

/// What the cache refreshes itself from. The HTTP-backed implementation
/// fetches the whole published catalog in one request; a test double can
/// return a fixed list.
#[async_trait]
pub trait KevSource: Send + Sync {
    async fn fetch_catalog(&self) -> Result<Vec<KevCatalogEntry>, IntelError>;
}

pub struct ReqwestKevSource {
    http: reqwest::Client,
    url: String,
}

impl ReqwestKevSource {
    pub fn new(url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
        }
    }
}

#[derive(serde::Deserialize)]
struct KevCatalogDto {
    vulnerabilities: Vec<KevVulnerabilityDto>,
}

#[derive(serde::Deserialize)]
struct KevVulnerabilityDto {
    cve_id: String,
    date_added: String,
}

#[async_trait]
impl KevSource for ReqwestKevSource {
    async fn fetch_catalog(&self) -> Result<Vec<KevCatalogEntry>, IntelError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| IntelError::SourceUnavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(IntelError::SourceUnavailable(format!(
                "KEV catalog fetch failed: {}",
                response.status()
            )));
        }
        let dto: KevCatalogDto = response
            .json()
            .await
            .map_err(|e| IntelError::SourceUnavailable(e.to_string()))?;
        Ok(dto
            .vulnerabilities
            .into_iter()
            .filter_map(|v| {
                DateTime::parse_from_rfc3339(&v.date_added)
                    .ok()
                    .map(|d| KevCatalogEntry {
                        cve_id: v.cve_id,
                        date_added: d.with_timezone(&Utc),
                    })
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KevMembership {
    pub in_kev: bool,
    pub date_added: Option<DateTime<Utc>>,
}

/// In-memory, TTL-refreshed mirror of the KEV catalog (spec §4.6: "small,
/// slow-changing list... refreshes on an interval, cached with TTL").
/// `refresh_lock` makes concurrent lookups during a stale window coalesce
/// into a single refresh rather than stampeding the source.
pub struct KevCache {
    source: Arc<dyn KevSource>,
    entries: DashMap<String, KevMembership>,
    last_refreshed: Mutex<Option<DateTime<Utc>>>,
    ttl: Duration,
}

impl KevCache {
    pub fn new(source: Arc<dyn KevSource>) -> Self {
        Self::with_ttl(source, Duration::from_secs(24 * 60 * 60))
    }

    pub fn with_ttl(source: Arc<dyn KevSource>, ttl: Duration) -> Self {
        Self {
            source,
            entries: DashMap::new(),
            last_refreshed: Mutex::new(None),
            ttl,
        }
    }

    async fn refresh_if_stale(&self, now: DateTime<Utc>) -> Result<(), IntelError> {
        let mut guard = self.last_refreshed.lock().await;
        let stale = match *guard {
            Some(last) => now.signed_duration_since(last).to_std().unwrap_or_default() >= self.ttl,
            None => true,
        };
        if !stale {
            return Ok(());
        }
        let catalog = self.source.fetch_catalog().await?;
        self.entries.clear();
        for entry in catalog {
            self.entries.insert(
                entry.cve_id,
                KevMembership {
                    in_kev: true,
                    date_added: Some(entry.date_added),
                },
            );
        }
        *guard = Some(now);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn is_known(&self, cve_id: &str, now: DateTime<Utc>) -> Result<KevMembership, IntelError> {
        self.refresh_if_stale(now).await?;
        Ok(self.entries.get(cve_id).map(|e| *e).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedSource {
        entries: Vec<KevCatalogEntry>,
        fetch_count: AtomicU32,
    }

    #[async_trait]
    impl KevSource for FixedSource {
        async fn fetch_catalog(&self) -> Result<Vec<KevCatalogEntry>, IntelError> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            Ok(self.entries.clone())
        }
    }

    #[tokio::test]
    async fn reports_membership_from_catalog() {
        let now = Utc::now();
        let source = Arc::new(FixedSource {
            entries: vec![KevCatalogEntry {
                cve_id: "CVE-2024-1234".into(),
                date_added: now,
            }],
            fetch_count: AtomicU32::new(0),
        });
        let cache = KevCache::new(source);
        let membership = cache.is_known("CVE-2024-1234", now).await.unwrap();
        assert!(membership.in_kev);
        let absent = cache.is_known("CVE-0000-0000", now).await.unwrap();
        assert!(!absent.in_kev);
    }

    #[tokio::test]
    async fn does_not_refetch_within_ttl() {
        let now = Utc::now();
        let source = Arc::new(FixedSource {
            entries: vec![],
            fetch_count: AtomicU32::new(0),
        });
        let cache = KevCache::with_ttl(source.clone(), Duration::from_secs(3600));
        cache.is_known("CVE-2024-1234", now).await.unwrap();
        cache.is_known("CVE-2024-1234", now + chrono::Duration::minutes(1)).await.unwrap();
        assert_eq!(source.fetch_count.load(Ordering::SeqCst), 1);
    }
}
