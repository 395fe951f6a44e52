use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sentinel_core::{
    severity_for_cvss, DomainEvent, EdgeAttrs, EdgeType, EventEnvelope, EventPublisher, NodeKind,
    TenantContext, Vulnerability,
};
use sentinel_engram::{EngramStore, SessionOutcome};
use sentinel_graph::{GraphStore, NodeFilter, Page};
use tracing::instrument;

use crate::cpe::CpeMapping;
use crate::epss::EpssClient;
use crate::error::IntelError;
use crate::kev::KevCache;
use crate::nvd::NvdClient;

/// Counters returned to the caller after one tenant's enrichment sweep
/// (spec §4.6). Separate from the engram session summary, which is prose.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentSummary {
    pub services_considered: u64,
    pub services_unmapped: u64,
    pub vulnerabilities_written: u64,
    pub net_new_pairings: u64,
    pub session_id: String,
    pub had_failure: bool,
}

/// Orchestrates the per-tenant vulnerability enrichment sweep: page through
/// `Service` nodes, resolve candidate CPEs/CVEs, join KEV + NVD + EPSS per
/// CVE, then write one `Vulnerability` node and `HAS_CVE` edge per pairing
/// (spec §4.6). Holds the three intel clients plus the graph/engram stores
/// it writes through.
pub struct EnrichmentOrchestrator {
    graph: GraphStore,
    engram: EngramStore,
    cpe_mapping: CpeMapping,
    kev: Arc<KevCache>,
    epss: Arc<EpssClient>,
    nvd: Arc<NvdClient>,
    publisher: Arc<dyn EventPublisher>,
    page_size: u32,
}

impl EnrichmentOrchestrator {
    pub fn new(
        graph: GraphStore,
        engram: EngramStore,
        cpe_mapping: CpeMapping,
        kev: Arc<KevCache>,
        epss: Arc<EpssClient>,
        nvd: Arc<NvdClient>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            graph,
            engram,
            cpe_mapping,
            kev,
            epss,
            nvd,
            publisher,
            page_size: 100,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn run_for_tenant(
        &self,
        ctx: &TenantContext,
        now: DateTime<Utc>,
    ) -> Result<EnrichmentSummary, IntelError> {
        let mut handle = self.engram.open(
            ctx.tenant_id().as_str(),
            "sentinel-intel",
            "vulnerability-enrichment",
            serde_json::json!({}),
            now,
        );

        let mut services_considered: u64 = 0;
        let mut services_unmapped: u64 = 0;
        let mut vulnerabilities_written: u64 = 0;
        let mut net_new_pairings: u64 = 0;
        let mut had_failure = false;

        let mut offset = 0u32;
        loop {
            let page = Page {
                offset,
                limit: self.page_size,
            };
            let services = match self
                .graph
                .list_nodes(ctx, "Service", &NodeFilter::default(), page)
                .await
            {
                Ok(nodes) => nodes,
                Err(e) => {
                    handle.record_dead_end("failed to page Service nodes", e.to_string(), now);
                    had_failure = true;
                    break;
                }
            };
            if services.is_empty() {
                break;
            }
            let page_len = services.len() as u32;

            for stored in &services {
                services_considered += 1;
                let service = match &stored.kind {
                    NodeKind::Service(s) => s,
                    _ => continue,
                };
                let Some(version) = service.version.as_deref() else {
                    handle.record_dead_end(
                        "service has no known version, cannot map to a CPE",
                        service.name.clone(),
                        now,
                    );
                    services_unmapped += 1;
                    continue;
                };

                let cpes = match self.cpe_mapping.resolve(&service.name, version) {
                    Some(cpes) => cpes.to_vec(),
                    None => {
                        handle.record_dead_end(
                            "no CPE mapping for (name, version)",
                            format!("{} {}", service.name, version),
                            now,
                        );
                        services_unmapped += 1;
                        continue;
                    }
                };

                let mut candidate_cves = BTreeSet::new();
                for cpe in &cpes {
                    match self.nvd.cves_for_cpe(cpe).await {
                        Ok(ids) => candidate_cves.extend(ids),
                        Err(e) => {
                            handle.record_dead_end("NVD CPE lookup failed", e.to_string(), now);
                            had_failure = true;
                        }
                    }
                }
                if candidate_cves.is_empty() {
                    continue;
                }

                let cve_ids: Vec<String> = candidate_cves.into_iter().collect();
                // Join on all three sources before any Vulnerability write, so each
                // write is internally consistent (spec §4.6 composition rule).
                let epss_scores = self.epss.fetch_scores(&cve_ids).await;
                if epss_scores.is_empty() {
                    handle.record_dead_end(
                        "EPSS returned no scores for this batch",
                        cve_ids.join(","),
                        now,
                    );
                    had_failure = true;
                }

                for cve_id in &cve_ids {
                    let kev_membership = match self.kev.is_known(cve_id, now).await {
                        Ok(m) => m,
                        Err(e) => {
                            handle.record_dead_end("KEV lookup failed", e.to_string(), now);
                            had_failure = true;
                            crate::kev::KevMembership::default()
                        }
                    };
                    let metadata = match self.nvd.fetch_metadata(cve_id).await {
                        Ok(m) => m,
                        Err(e) => {
                            handle.record_dead_end("NVD metadata fetch failed", e.to_string(), now);
                            had_failure = true;
                            crate::nvd::NvdCveMetadata::default()
                        }
                    };
                    let epss_score = epss_scores.get(cve_id).copied();

                    let severity = severity_for_cvss(metadata.cvss_score);
                    let exploitable = sentinel_core::is_actionable_for_remediation(
                        kev_membership.in_kev,
                        epss_score,
                        metadata.cvss_score,
                    );

                    let vuln_kind = NodeKind::Vulnerability(Vulnerability {
                        cve_id: cve_id.clone(),
                        cvss_score: metadata.cvss_score,
                        cvss_vector: metadata.cvss_vector.clone(),
                        epss_score,
                        severity,
                        exploitable,
                        in_kev: kev_membership.in_kev,
                        description: metadata.description.clone(),
                        published_date: metadata.published_date,
                    });

                    let node_upsert = self.graph.upsert_node(ctx, vuln_kind, now).await?;
                    let edge_attrs = EdgeAttrs {
                        exploitability_score: epss_score,
                        ..Default::default()
                    };
                    let edge_upsert = self
                        .graph
                        .upsert_edge(
                            ctx,
                            EdgeType::HasCve,
                            stored.id.clone(),
                            node_upsert.id.clone(),
                            edge_attrs,
                            now,
                        )
                        .await?;

                    handle.record_action(
                        "enrich",
                        cve_id.clone(),
                        if node_upsert.created { "created" } else { "updated" },
                        serde_json::json!({ "epss_score": epss_score, "in_kev": kev_membership.in_kev }),
                        now,
                    );

                    vulnerabilities_written += 1;
                    if node_upsert.created || edge_upsert.created {
                        net_new_pairings += 1;
                        self.publisher.publish(EventEnvelope {
                            tenant_id: ctx.tenant_id().clone(),
                            event: DomainEvent::VulnerabilityFound {
                                node_id: node_upsert.id.clone(),
                                cve_id: cve_id.clone(),
                                cvss_score: metadata.cvss_score,
                                exploitable,
                            },
                        });
                    }
                }
            }

            if page_len < self.page_size {
                break;
            }
            offset += self.page_size;
        }

        let outcome = if had_failure {
            SessionOutcome::Partial
        } else {
            SessionOutcome::Success
        };
        let summary_text = format!(
            "considered {services_considered} services, {services_unmapped} unmapped, \
             {vulnerabilities_written} vulnerability pairings written"
        );
        let session_id = self.engram.close(handle, outcome, summary_text, now).await?;

        Ok(EnrichmentSummary {
            services_considered,
            services_unmapped,
            vulnerabilities_written,
            net_new_pairings,
            session_id,
            had_failure,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sentinel_core::{NodeKind as CoreNodeKind, Protocol, Service, ServiceState, TenantId};
    use sentinel_engram::{FilesystemObjectStore, SessionIndex};
    use sentinel_graph::{GraphClient, GraphStore};
    use std::collections::HashMap as StdHashMap;
    use std::sync::Mutex;

    struct CollectingPublisher {
        events: Mutex<Vec<EventEnvelope>>,
    }

    impl CollectingPublisher {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }
    }

    impl EventPublisher for CollectingPublisher {
        fn publish(&self, envelope: EventEnvelope) {
            self.events.lock().unwrap().push(envelope);
        }
    }

    struct FixedKevSource;
    #[async_trait]
    impl crate::kev::KevSource for FixedKevSource {
        async fn fetch_catalog(&self) -> Result<Vec<crate::kev::KevCatalogEntry>, IntelError> {
            Ok(vec![crate::kev::KevCatalogEntry {
                cve_id: "CVE-2024-1234".into(),
                date_added: Utc::now(),
            }])
        }
    }

    struct FixedNvdSource;
    #[async_trait]
    impl crate::nvd::NvdSource for FixedNvdSource {
        async fn cves_for_cpe(&self, _cpe: &str) -> Result<Vec<String>, IntelError> {
            Ok(vec!["CVE-2024-1234".into()])
        }
        async fn fetch_metadata(
            &self,
            _cve_id: &str,
        ) -> Result<crate::nvd::NvdCveMetadata, IntelError> {
            Ok(crate::nvd::NvdCveMetadata {
                cvss_score: Some(9.8),
                cvss_vector: Some("CVSS:3.1/AV:N".into()),
                description: Some("critical RCE".into()),
                published_date: Some(Utc::now()),
            })
        }
    }

    struct UnreachableEpssSource;
    #[async_trait]
    impl crate::epss::EpssSource for UnreachableEpssSource {
        async fn fetch_batch(
            &self,
            _cve_ids: &[String],
        ) -> Result<StdHashMap<String, f64>, IntelError> {
            Err(IntelError::SourceUnavailable("epss unreachable".into()))
        }
    }

    async fn test_graph_store() -> GraphStore {
        let client = GraphClient::connect(":memory:", None).await.unwrap();
        GraphStore::new(client)
    }

    async fn test_engram_store(dir: &tempfile::TempDir) -> EngramStore {
        let objects = Arc::new(FilesystemObjectStore::new(dir.path()));
        let index = SessionIndex::connect(":memory:").await.unwrap();
        let (store, _dropped_rx) = EngramStore::new(objects, index);
        store
    }

    const SAMPLE_CPE_TOML: &str = r#"
[[mapping]]
name = "nginx"
version = "1.18.0"
cpes = ["cpe:2.3:a:nginx:nginx:1.18.0:*:*:*:*:*:*:*"]
"#;

    #[tokio::test]
    async fn nvd_critical_with_kev_and_unreachable_epss_yields_partial_session() {
        let now = Utc::now();
        let tenant = TenantId::new("tenant-s4");
        let ctx = TenantContext::new(tenant.clone());

        let graph = test_graph_store().await;
        let host_kind = CoreNodeKind::Service(Service {
            name: "nginx".into(),
            version: Some("1.18.0".into()),
            port: 443,
            protocol: Protocol::Https,
            state: ServiceState::Running,
            banner: None,
            host_natural_key: "host-1".into(),
        });
        let service_upsert = graph.upsert_node(&ctx, host_kind, now).await.unwrap();

        let engram_dir = tempfile::tempdir().unwrap();
        let engram = test_engram_store(&engram_dir).await;

        let cpe_mapping = CpeMapping::parse(SAMPLE_CPE_TOML).unwrap();
        let kev = Arc::new(KevCache::new(Arc::new(FixedKevSource)));
        let epss = Arc::new(EpssClient::new(Arc::new(UnreachableEpssSource), 100));
        let nvd = Arc::new(NvdClient::new(
            Arc::new(FixedNvdSource),
            crate::nvd::NvdRateRegime::Authenticated,
        ));
        let publisher = Arc::new(CollectingPublisher::new());

        let orchestrator = EnrichmentOrchestrator::new(
            graph.clone(),
            engram,
            cpe_mapping,
            kev,
            epss,
            nvd,
            publisher.clone(),
        );

        let summary = orchestrator.run_for_tenant(&ctx, now).await.unwrap();

        assert_eq!(summary.services_considered, 1);
        assert_eq!(summary.services_unmapped, 0);
        assert_eq!(summary.vulnerabilities_written, 1);
        assert_eq!(summary.net_new_pairings, 1);
        assert!(summary.had_failure);

        let page = Page::default();
        let stored = graph
            .list_nodes(&ctx, "Vulnerability", &NodeFilter::default(), page)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        match &stored[0].kind {
            CoreNodeKind::Vulnerability(v) => {
                assert_eq!(v.cve_id, "CVE-2024-1234");
                assert_eq!(v.cvss_score, Some(9.8));
                assert!(v.in_kev);
                assert_eq!(v.epss_score, None);
                assert!(v.exploitable);
            }
            other => panic!("expected Vulnerability node, got {other:?}"),
        }

        let events = publisher.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0].event {
            DomainEvent::VulnerabilityFound { cve_id, exploitable, .. } => {
                assert_eq!(cve_id, "CVE-2024-1234");
                assert!(*exploitable);
            }
            other => panic!("expected VulnerabilityFound, got {other:?}"),
        }

        let _ = service_upsert;
    }

    #[tokio::test]
    async fn service_with_no_mapping_records_dead_end_and_is_skipped() {
        let now = Utc::now();
        let tenant = TenantId::new("tenant-unmapped");
        let ctx = TenantContext::new(tenant);

        let graph = test_graph_store().await;
        let unmapped = CoreNodeKind::Service(Service {
            name: "some-bespoke-agent".into(),
            version: Some("9.9.9".into()),
            port: 8080,
            protocol: Protocol::Tcp,
            state: ServiceState::Running,
            banner: None,
            host_natural_key: "host-2".into(),
        });
        graph.upsert_node(&ctx, unmapped, now).await.unwrap();

        let engram_dir = tempfile::tempdir().unwrap();
        let engram = test_engram_store(&engram_dir).await;
        let cpe_mapping = CpeMapping::parse(SAMPLE_CPE_TOML).unwrap();
        let kev = Arc::new(KevCache::new(Arc::new(FixedKevSource)));
        let epss = Arc::new(EpssClient::new(Arc::new(UnreachableEpssSource), 100));
        let nvd = Arc::new(NvdClient::new(
            Arc::new(FixedNvdSource),
            crate::nvd::NvdRateRegime::Authenticated,
        ));
        let publisher = Arc::new(CollectingPublisher::new());

        let orchestrator =
            EnrichmentOrchestrator::new(graph, engram, cpe_mapping, kev, epss, nvd, publisher);

        let summary = orchestrator.run_for_tenant(&ctx, now).await.unwrap();
        assert_eq!(summary.services_considered, 1);
        assert_eq!(summary.services_unmapped, 1);
        assert_eq!(summary.vulnerabilities_written, 0);
    }
}
