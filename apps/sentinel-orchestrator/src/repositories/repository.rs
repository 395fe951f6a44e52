use chrono::{DateTime, Utc};
use libsql::params;
use tracing::instrument;

use super::db::OrchestratorDb;
use super::error::RepositoryError;

#[derive(Debug, Clone, PartialEq)]
pub struct TenantRecord {
    pub tenant_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorConfigRecord {
    pub tenant_id: String,
    pub connector_name: String,
    pub credential_ref: String,
    pub scan_interval_secs: i64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatusRecord {
    Running,
    Success,
    Partial,
    Failed,
    Cancelled,
}

impl ScanStatusRecord {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ScanStatusRecord::Running => "running",
            ScanStatusRecord::Success => "success",
            ScanStatusRecord::Partial => "partial",
            ScanStatusRecord::Failed => "failed",
            ScanStatusRecord::Cancelled => "cancelled",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "success" => ScanStatusRecord::Success,
            "partial" => ScanStatusRecord::Partial,
            "failed" => ScanStatusRecord::Failed,
            "cancelled" => ScanStatusRecord::Cancelled,
            _ => ScanStatusRecord::Running,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub scan_id: String,
    pub tenant_id: String,
    pub connector_name: String,
    pub scan_type: String,
    pub target: String,
    pub status: ScanStatusRecord,
    pub nodes_found: u64,
    pub nodes_updated: u64,
    pub nodes_stale: u64,
    pub resources_failed: u64,
    pub engram_session: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub tenant_id: String,
    pub actor: String,
    pub action: String,
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
}

/// The single path to the orchestrator's own control-plane tables. Mirrors
/// the shape of `sentinel-graph`'s `GraphStore`: one adapter, plain SQL,
/// no ORM.
#[derive(Clone)]
pub struct ControlPlaneRepository {
    db: OrchestratorDb,
}

impl ControlPlaneRepository {
    pub fn new(db: OrchestratorDb) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn upsert_tenant(&self, record: &TenantRecord) -> Result<(), RepositoryError> {
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO tenants (tenant_id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(tenant_id) DO UPDATE SET name = excluded.name",
            params![
                record.tenant_id.clone(),
                record.name.clone(),
                record.created_at.to_rfc3339()
            ],
        )
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_tenants(&self) -> Result<Vec<TenantRecord>, RepositoryError> {
        let conn = self.db.connection()?;
        let mut rows = conn
            .query("SELECT tenant_id, name, created_at FROM tenants ORDER BY tenant_id", ())
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| RepositoryError::Query(e.to_string()))? {
            let created_at_raw: String = row.get(2).map_err(|e| RepositoryError::Query(e.to_string()))?;
            out.push(TenantRecord {
                tenant_id: row.get(0).map_err(|e| RepositoryError::Query(e.to_string()))?,
                name: row.get(1).map_err(|e| RepositoryError::Query(e.to_string()))?,
                created_at: DateTime::parse_from_rfc3339(&created_at_raw)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|e| RepositoryError::Query(e.to_string()))?,
            });
        }
        Ok(out)
    }

    #[instrument(skip(self))]
    pub async fn upsert_connector_config(
        &self,
        record: &ConnectorConfigRecord,
    ) -> Result<(), RepositoryError> {
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO connector_configs
                (tenant_id, connector_name, credential_ref, scan_interval_secs, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(tenant_id, connector_name) DO UPDATE SET
                credential_ref = excluded.credential_ref,
                scan_interval_secs = excluded.scan_interval_secs,
                enabled = excluded.enabled",
            params![
                record.tenant_id.clone(),
                record.connector_name.clone(),
                record.credential_ref.clone(),
                record.scan_interval_secs,
                record.enabled as i64
            ],
        )
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_enabled_connector_configs(
        &self,
    ) -> Result<Vec<ConnectorConfigRecord>, RepositoryError> {
        let conn = self.db.connection()?;
        let mut rows = conn
            .query(
                "SELECT tenant_id, connector_name, credential_ref, scan_interval_secs, enabled
                 FROM connector_configs WHERE enabled = 1",
                (),
            )
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| RepositoryError::Query(e.to_string()))? {
            let enabled: i64 = row.get(4).map_err(|e| RepositoryError::Query(e.to_string()))?;
            out.push(ConnectorConfigRecord {
                tenant_id: row.get(0).map_err(|e| RepositoryError::Query(e.to_string()))?,
                connector_name: row.get(1).map_err(|e| RepositoryError::Query(e.to_string()))?,
                credential_ref: row.get(2).map_err(|e| RepositoryError::Query(e.to_string()))?,
                scan_interval_secs: row.get(3).map_err(|e| RepositoryError::Query(e.to_string()))?,
                enabled: enabled != 0,
            });
        }
        Ok(out)
    }

    #[instrument(skip(self))]
    #[allow(clippy::too_many_arguments)]
    pub async fn start_scan(
        &self,
        scan_id: &str,
        tenant_id: &str,
        connector_name: &str,
        scan_type: &str,
        target: &str,
        engram_session: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO scan_history
                (scan_id, tenant_id, connector_name, scan_type, target, status,
                 engram_session, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                scan_id.to_string(),
                tenant_id.to_string(),
                connector_name.to_string(),
                scan_type.to_string(),
                target.to_string(),
                ScanStatusRecord::Running.as_str(),
                engram_session.to_string(),
                started_at.to_rfc3339()
            ],
        )
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self, error_message))]
    #[allow(clippy::too_many_arguments)]
    pub async fn finish_scan(
        &self,
        scan_id: &str,
        status: ScanStatusRecord,
        nodes_found: u64,
        nodes_updated: u64,
        nodes_stale: u64,
        resources_failed: u64,
        error_message: Option<&str>,
        duration_ms: u64,
        finished_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let conn = self.db.connection()?;
        conn.execute(
            "UPDATE scan_history
             SET status = ?1, nodes_found = ?2, nodes_updated = ?3, nodes_stale = ?4,
                 resources_failed = ?5, error_message = ?6, duration_ms = ?7, finished_at = ?8
             WHERE scan_id = ?9",
            params![
                status.as_str(),
                nodes_found,
                nodes_updated,
                nodes_stale,
                resources_failed,
                error_message.map(|s| s.to_string()),
                duration_ms,
                finished_at.to_rfc3339(),
                scan_id.to_string()
            ],
        )
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_scan(&self, scan_id: &str) -> Result<ScanRecord, RepositoryError> {
        let conn = self.db.connection()?;
        let mut rows = conn
            .query(
                "SELECT scan_id, tenant_id, connector_name, scan_type, target, status,
                        nodes_found, nodes_updated, nodes_stale, resources_failed,
                        engram_session, error_message, duration_ms, started_at, finished_at
                 FROM scan_history WHERE scan_id = ?1",
                params![scan_id.to_string()],
            )
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let row = rows
            .next()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .ok_or_else(|| RepositoryError::NotFound(scan_id.to_string()))?;

        row_to_scan_record(&row)
    }

    #[instrument(skip(self))]
    pub async fn record_audit(&self, entry: &AuditEntry) -> Result<(), RepositoryError> {
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO audit_log (tenant_id, actor, action, detail, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.tenant_id.clone(),
                entry.actor.clone(),
                entry.action.clone(),
                entry.detail.clone(),
                entry.recorded_at.to_rfc3339()
            ],
        )
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }
}

fn row_to_scan_record(row: &libsql::Row) -> Result<ScanRecord, RepositoryError> {
    let status_raw: String = row.get(5).map_err(|e| RepositoryError::Query(e.to_string()))?;
    let duration_ms_raw: Option<i64> = row.get(12).map_err(|e| RepositoryError::Query(e.to_string()))?;
    let started_at_raw: String = row.get(13).map_err(|e| RepositoryError::Query(e.to_string()))?;
    let finished_at_raw: Option<String> = row.get(14).map_err(|e| RepositoryError::Query(e.to_string()))?;

    Ok(ScanRecord {
        scan_id: row.get(0).map_err(|e| RepositoryError::Query(e.to_string()))?,
        tenant_id: row.get(1).map_err(|e| RepositoryError::Query(e.to_string()))?,
        connector_name: row.get(2).map_err(|e| RepositoryError::Query(e.to_string()))?,
        scan_type: row.get(3).map_err(|e| RepositoryError::Query(e.to_string()))?,
        target: row.get(4).map_err(|e| RepositoryError::Query(e.to_string()))?,
        status: ScanStatusRecord::parse(&status_raw),
        nodes_found: row.get(6).map_err(|e| RepositoryError::Query(e.to_string()))?,
        nodes_updated: row.get(7).map_err(|e| RepositoryError::Query(e.to_string()))?,
        nodes_stale: row.get(8).map_err(|e| RepositoryError::Query(e.to_string()))?,
        resources_failed: row.get(9).map_err(|e| RepositoryError::Query(e.to_string()))?,
        engram_session: row.get(10).map_err(|e| RepositoryError::Query(e.to_string()))?,
        error_message: row.get(11).map_err(|e| RepositoryError::Query(e.to_string()))?,
        duration_ms: duration_ms_raw.map(|v| v as u64),
        started_at: DateTime::parse_from_rfc3339(&started_at_raw)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| RepositoryError::Query(e.to_string()))?,
        finished_at: finished_at_raw
            .map(|raw| {
                DateTime::parse_from_rfc3339(&raw)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|e| RepositoryError::Query(e.to_string()))
            })
            .transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn memory_repo() -> ControlPlaneRepository {
        let db = OrchestratorDb::connect(":memory:", None).await.unwrap();
        ControlPlaneRepository::new(db)
    }

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn scan_lifecycle_round_trips() {
        let repo = memory_repo().await;
        repo.start_scan("scan-1", "tenant-a", "aws", "aws", "tenant-a", "session-1", t(0))
            .await
            .unwrap();
        let running = repo.get_scan("scan-1").await.unwrap();
        assert_eq!(running.status, ScanStatusRecord::Running);
        assert_eq!(running.engram_session.as_deref(), Some("session-1"));

        repo.finish_scan(
            "scan-1",
            ScanStatusRecord::Partial,
            12,
            3,
            1,
            2,
            Some("one sub-resource failed"),
            4_500,
            t(10),
        )
        .await
        .unwrap();
        let finished = repo.get_scan("scan-1").await.unwrap();
        assert_eq!(finished.status, ScanStatusRecord::Partial);
        assert_eq!(finished.nodes_found, 12);
        assert_eq!(finished.nodes_updated, 3);
        assert_eq!(finished.nodes_stale, 1);
        assert_eq!(finished.resources_failed, 2);
        assert_eq!(finished.error_message.as_deref(), Some("one sub-resource failed"));
        assert_eq!(finished.duration_ms, Some(4_500));
        assert!(finished.finished_at.is_some());
    }

    #[tokio::test]
    async fn connector_configs_round_trip_and_filter_disabled() {
        let repo = memory_repo().await;
        repo.upsert_connector_config(&ConnectorConfigRecord {
            tenant_id: "tenant-a".into(),
            connector_name: "aws".into(),
            credential_ref: "aws/prod".into(),
            scan_interval_secs: 3600,
            enabled: true,
        })
        .await
        .unwrap();
        repo.upsert_connector_config(&ConnectorConfigRecord {
            tenant_id: "tenant-a".into(),
            connector_name: "okta".into(),
            credential_ref: "okta/prod".into(),
            scan_interval_secs: 3600,
            enabled: false,
        })
        .await
        .unwrap();

        let enabled = repo.list_enabled_connector_configs().await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].connector_name, "aws");
    }

    #[tokio::test]
    async fn get_missing_scan_errors() {
        let repo = memory_repo().await;
        let err = repo.get_scan("nope").await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }
}
