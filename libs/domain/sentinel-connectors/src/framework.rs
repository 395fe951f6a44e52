use std::time::Instant;

use chrono::{DateTime, Utc};
use sentinel_core::TenantContext;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::connector::Connector;
use crate::error::ConnectorError;
use crate::sync_result::SyncResult;

/// Runs one connector through its full lifecycle: `configure`, then
/// `health_check`, then `discover`. Each stage's failure is terminal for the
/// run — there's no point enumerating resources against a source that just
/// failed its health check. Individual connectors are responsible for their
/// own per-request retry/backoff inside `discover`; this only wraps the
/// outer contract and timing. `cancel` is forwarded to `discover` so a
/// caller can request cooperative cancellation mid-run; a cancel observed
/// before `discover` even starts short-circuits to an empty cancelled
/// result rather than making the call at all.
#[instrument(skip(connector, ctx, cancel), fields(connector = connector.name()))]
pub async fn run_connector(
    connector: &dyn Connector,
    ctx: &TenantContext,
    now: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<SyncResult, ConnectorError> {
    let started = Instant::now();
    connector.configure().await?;
    connector.health_check().await?;
    if cancel.is_cancelled() {
        let mut result = SyncResult::new();
        result.status = crate::sync_result::SyncStatus::Cancelled;
        return Ok(result);
    }
    let result = connector.discover(ctx, now, cancel).await?;
    info!(
        nodes = result.nodes.len(),
        edges = result.edges.len(),
        resources_seen = result.resources_seen,
        resources_failed = result.resources_failed,
        status = ?result.status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "connector run complete"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sentinel_core::TenantId;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct RecordingConnector {
        configured: AtomicBool,
        health_checked: AtomicBool,
        discover_calls: Mutex<u32>,
    }

    #[async_trait]
    impl Connector for RecordingConnector {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn configure(&self) -> Result<(), ConnectorError> {
            self.configured.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ConnectorError> {
            self.health_checked.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn discover(
            &self,
            _ctx: &TenantContext,
            _now: DateTime<Utc>,
            _cancel: &CancellationToken,
        ) -> Result<SyncResult, ConnectorError> {
            *self.discover_calls.lock().unwrap() += 1;
            Ok(SyncResult::new())
        }
    }

    #[tokio::test]
    async fn runs_lifecycle_stages_in_order() {
        let connector = RecordingConnector {
            configured: AtomicBool::new(false),
            health_checked: AtomicBool::new(false),
            discover_calls: Mutex::new(0),
        };
        let ctx = TenantContext::new(TenantId::new("t1"));
        run_connector(&connector, &ctx, Utc::now(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(connector.configured.load(Ordering::SeqCst));
        assert!(connector.health_checked.load(Ordering::SeqCst));
        assert_eq!(*connector.discover_calls.lock().unwrap(), 1);
    }

    struct FailingHealthCheck;

    #[async_trait]
    impl Connector for FailingHealthCheck {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn configure(&self) -> Result<(), ConnectorError> {
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ConnectorError> {
            Err(ConnectorError::HealthCheckFailed("unreachable".into()))
        }

        async fn discover(
            &self,
            _ctx: &TenantContext,
            _now: DateTime<Utc>,
            _cancel: &CancellationToken,
        ) -> Result<SyncResult, ConnectorError> {
            panic!("discover must not run when health_check fails");
        }
    }

    #[tokio::test]
    async fn health_check_failure_short_circuits_discover() {
        let ctx = TenantContext::new(TenantId::new("t1"));
        let result = run_connector(&FailingHealthCheck, &ctx, Utc::now(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(ConnectorError::HealthCheckFailed(_))));
    }

    struct AlwaysCancelled;

    #[async_trait]
    impl Connector for AlwaysCancelled {
        fn name(&self) -> &'static str {
            "always-cancelled"
        }

        async fn configure(&self) -> Result<(), ConnectorError> {
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ConnectorError> {
            Ok(())
        }

        async fn discover(
            &self,
            _ctx: &TenantContext,
            _now: DateTime<Utc>,
            _cancel: &CancellationToken,
        ) -> Result<SyncResult, ConnectorError> {
            panic!("discover must not run when cancel is already observed");
        }
    }

    #[tokio::test]
    async fn cancel_observed_before_discover_short_circuits() {
        let ctx = TenantContext::new(TenantId::new("t1"));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_connector(&AlwaysCancelled, &ctx, Utc::now(), &cancel)
            .await
            .unwrap();
        assert_eq!(result.status, crate::sync_result::SyncStatus::Cancelled);
    }
}
