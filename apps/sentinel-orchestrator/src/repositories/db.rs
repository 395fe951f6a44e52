use std::sync::Arc;

use libsql::{Builder, Connection, Database};
use tracing::{info, instrument};

use super::error::RepositoryError;

const SCHEMA: &[(&str, &str)] = &[
    (
        "TABLE_TENANTS",
        r#"
        CREATE TABLE IF NOT EXISTS tenants (
            tenant_id  TEXT PRIMARY KEY,
            name       TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
    "#,
    ),
    (
        "TABLE_CONNECTOR_CONFIGS",
        r#"
        CREATE TABLE IF NOT EXISTS connector_configs (
            tenant_id        TEXT NOT NULL,
            connector_name   TEXT NOT NULL,
            credential_ref   TEXT NOT NULL,
            scan_interval_secs INTEGER NOT NULL,
            enabled          INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (tenant_id, connector_name)
        );
    "#,
    ),
    (
        "TABLE_SCAN_HISTORY",
        r#"
        CREATE TABLE IF NOT EXISTS scan_history (
            scan_id        TEXT PRIMARY KEY,
            tenant_id      TEXT NOT NULL,
            connector_name TEXT NOT NULL,
            scan_type      TEXT NOT NULL,
            target         TEXT NOT NULL,
            status         TEXT NOT NULL,
            nodes_found    INTEGER NOT NULL DEFAULT 0,
            nodes_updated  INTEGER NOT NULL DEFAULT 0,
            nodes_stale    INTEGER NOT NULL DEFAULT 0,
            resources_failed INTEGER NOT NULL DEFAULT 0,
            engram_session TEXT,
            error_message  TEXT,
            duration_ms    INTEGER,
            started_at     TEXT NOT NULL,
            finished_at    TEXT
        );
    "#,
    ),
    (
        "TABLE_AUDIT_LOG",
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id  TEXT NOT NULL,
            actor      TEXT NOT NULL,
            action     TEXT NOT NULL,
            detail     TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        );
    "#,
    ),
];

const INDEXES: &[(&str, &str)] = &[(
    "IDX_SCAN_HISTORY_TENANT",
    "CREATE INDEX IF NOT EXISTS idx_scan_history_tenant ON scan_history(tenant_id, started_at);",
)];

/// Thin connection wrapper over the orchestrator's own control-plane
/// tables (tenants, connector configs, scan history, audit log) — separate
/// from the discovery graph itself, which `sentinel-graph` owns.
#[derive(Clone)]
pub struct OrchestratorDb {
    database: Arc<Database>,
    _memory_anchor: Option<Arc<Connection>>,
}

impl OrchestratorDb {
    #[instrument(skip(auth_token))]
    pub async fn connect(database_url: &str, auth_token: Option<String>) -> Result<Self, RepositoryError> {
        let is_remote = database_url.starts_with("libsql://") || database_url.starts_with("https://");
        let is_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let database = if is_remote {
            let token = auth_token.ok_or_else(|| {
                RepositoryError::Connection("remote control-plane backend requires an auth token".into())
            })?;
            Builder::new_remote(database_url.to_string(), token).build().await
        } else {
            Builder::new_local(database_url).build().await
        }
        .map_err(|e| RepositoryError::Connection(format!("driver init failed: {e}")))?;

        let shared = Arc::new(database);
        let mut anchor = None;

        let bootstrap_conn = shared
            .connect()
            .map_err(|e| RepositoryError::Connection(e.to_string()))?;
        for (identifier, sql) in SCHEMA {
            bootstrap_conn
                .execute(sql, ())
                .await
                .map_err(|e| RepositoryError::Connection(format!("{identifier}: {e}")))?;
        }
        for (identifier, sql) in INDEXES {
            bootstrap_conn
                .execute(sql, ())
                .await
                .map_err(|e| RepositoryError::Connection(format!("{identifier}: {e}")))?;
        }

        if is_memory {
            anchor = Some(Arc::new(bootstrap_conn));
            info!("in-memory control-plane backend anchored");
        }

        Ok(Self {
            database: shared,
            _memory_anchor: anchor,
        })
    }

    pub fn connection(&self) -> Result<Connection, RepositoryError> {
        self.database
            .connect()
            .map_err(|e| RepositoryError::Connection(e.to_string()))
    }
}
