use std::time::Duration;

use chrono::Utc;
use sentinel_core::TenantContext;
use sentinel_graph::GraphStore;
use tokio::time::interval;
use tracing::{info, warn};

use crate::repositories::{ControlPlaneRepository, TenantRecord};

const SWEPT_LABELS: &[&str] = &["Host", "Service"];

/// Marks nodes stale whose `last_seen` has fallen behind the configured
/// TTL (spec §6 Environment, §4.3 `sweep_stale`). One pass visits every
/// known tenant and every label the data model calls out for staleness
/// tracking.
pub async fn spawn_staleness_sweeper(
    graph: GraphStore,
    repository: ControlPlaneRepository,
    sweep_interval: Duration,
    ttl: Duration,
) {
    let mut ticker = interval(sweep_interval);

    tokio::spawn(async move {
        info!("staleness sweeper started");
        loop {
            ticker.tick().await;
            let tenants = match repository.list_tenants().await {
                Ok(tenants) => tenants,
                Err(err) => {
                    warn!(error = %err, "failed to list tenants for staleness sweep");
                    continue;
                }
            };

            for tenant in &tenants {
                sweep_tenant(&graph, tenant, ttl).await;
            }
        }
    });
}

async fn sweep_tenant(graph: &GraphStore, tenant: &TenantRecord, ttl: Duration) {
    let ctx = TenantContext::new(sentinel_core::TenantId::new(tenant.tenant_id.clone()));
    let now = Utc::now();
    let older_than = now - chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());

    for label in SWEPT_LABELS {
        match graph.sweep_stale(&ctx, label, older_than, now).await {
            Ok(count) if count > 0 => {
                info!(tenant = %tenant.tenant_id, label, swept = count, "marked nodes stale");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(tenant = %tenant.tenant_id, label, error = %err, "staleness sweep failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_graph::GraphClient;

    #[tokio::test]
    async fn sweep_tenant_with_no_nodes_does_not_error() {
        let client = GraphClient::connect(":memory:", None).await.unwrap();
        let graph = GraphStore::new(client);
        let tenant = TenantRecord {
            tenant_id: "tenant-a".into(),
            name: "Tenant A".into(),
            created_at: Utc::now(),
        };

        sweep_tenant(&graph, &tenant, Duration::from_secs(60)).await;
    }
}
