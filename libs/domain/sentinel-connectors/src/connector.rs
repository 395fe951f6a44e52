use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::{Edge, EdgeAttrs, EdgeType, TenantContext};
use tokio_util::sync::CancellationToken;

use crate::error::ConnectorError;
use crate::sync_result::SyncResult;

/// Uniform lifecycle every connector implements, regardless of source type:
/// `configure` validates its own config up front (so a typo'd region or a
/// missing credential ref fails before any network call), `health_check`
/// makes one cheap call to confirm reachability and valid credentials, and
/// `discover` does the actual enumeration. `cancel` is checked cooperatively
/// at pagination/sub-request boundaries; an observed cancellation stops
/// enumeration early and returns whatever was already collected with
/// `SyncStatus::Cancelled` rather than erroring out.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Stable identifier used in logs, scan history, and the
    /// single-run-per-`(tenant, connector)` guard.
    fn name(&self) -> &'static str;

    async fn configure(&self) -> Result<(), ConnectorError>;

    async fn health_check(&self) -> Result<(), ConnectorError>;

    async fn discover(
        &self,
        ctx: &TenantContext,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<SyncResult, ConnectorError>;
}

/// Fills in the fields every edge needs beyond its type and endpoints, so
/// call sites read as what the edge means rather than a seven-argument
/// constructor.
pub fn make_edge(
    ctx: &TenantContext,
    edge_type: EdgeType,
    source_id: impl Into<String>,
    target_id: impl Into<String>,
    attrs: EdgeAttrs,
    now: DateTime<Utc>,
) -> Edge {
    Edge::new(
        ctx.tenant_id().clone(),
        edge_type,
        source_id.into(),
        target_id.into(),
        attrs,
        now,
    )
}
