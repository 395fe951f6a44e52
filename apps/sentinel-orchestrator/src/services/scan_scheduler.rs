use std::sync::Arc;
use std::time::Duration;

use sentinel_core::{TenantContext, TenantId};
use tokio::time::interval;
use tracing::{info, warn};

use crate::repositories::ControlPlaneRepository;
use crate::services::connector_registry::ConnectorRegistry;
use crate::services::scan_runner::ScanRunner;

/// Triggers every enabled `(tenant, connector)` pair on its configured
/// interval, in addition to the explicit on-request path exposed over HTTP
/// (spec §4.7 "on a schedule or on explicit request"). `AlreadyRunning` from
/// an overlapping on-request scan is expected and simply skipped until the
/// next tick.
pub async fn spawn_scan_scheduler(
    repository: ControlPlaneRepository,
    registry: Arc<ConnectorRegistry>,
    runner: Arc<ScanRunner>,
    poll_interval: Duration,
) {
    let mut ticker = interval(poll_interval);

    tokio::spawn(async move {
        info!("scan scheduler started");
        loop {
            ticker.tick().await;

            let configs = match repository.list_enabled_connector_configs().await {
                Ok(configs) => configs,
                Err(err) => {
                    warn!(error = %err, "failed to list connector configs");
                    continue;
                }
            };

            for config in configs {
                let Some(connector) = registry.get(&config.connector_name) else {
                    warn!(connector = %config.connector_name, "no connector registered for this name");
                    continue;
                };

                let ctx = TenantContext::new(TenantId::new(config.tenant_id.clone()));
                match runner.run(&ctx, connector.as_ref()).await {
                    Ok(scan_id) => {
                        info!(scan_id, tenant = %config.tenant_id, connector = %config.connector_name, "scheduled scan completed");
                    }
                    Err(err) => {
                        warn!(tenant = %config.tenant_id, connector = %config.connector_name, error = %err, "scheduled scan did not complete");
                    }
                }
            }
        }
    });
}
