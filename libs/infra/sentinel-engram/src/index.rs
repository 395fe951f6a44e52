use chrono::{DateTime, Utc};
use libsql::{params, Builder, Connection, Database};
use std::sync::Arc;
use tracing::instrument;

use crate::content::SessionOutcome;
use crate::error::EngramError;

const BOOTSTRAP_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS engram_sessions (
    session_id    TEXT PRIMARY KEY,
    tenant_id     TEXT NOT NULL,
    agent_id      TEXT NOT NULL,
    intent        TEXT NOT NULL,
    content_address TEXT NOT NULL,
    outcome       TEXT NOT NULL,
    action_count  INTEGER NOT NULL,
    opened_at     TEXT NOT NULL,
    closed_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_engram_sessions_tenant_closed
    ON engram_sessions(tenant_id, closed_at);
"#;

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub tenant_id: String,
    pub agent_id: String,
    pub intent: String,
    pub content_address: String,
    pub outcome: SessionOutcome,
    pub action_count: i64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

/// Mutable listing/search surface over closed sessions. Kept separate from
/// the immutable, content-addressed objects themselves (spec §4.2): this
/// index can be rebuilt from the object store at any time by re-scanning
/// and re-verifying, since it holds no information that isn't also in the
/// session documents it points at.
#[derive(Clone)]
pub struct SessionIndex {
    database: Arc<Database>,
    /// Keeps an in-memory database's backing store alive for the lifetime
    /// of this index. Without a connection held open continuously, a
    /// `:memory:` database's schema and rows vanish as soon as the last
    /// connection using it closes, breaking visibility across the separate
    /// connections opened per call in `connection()`.
    _memory_anchor: Option<Connection>,
}

impl SessionIndex {
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, EngramError> {
        let is_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let database = Builder::new_local(database_url)
            .build()
            .await
            .map_err(|e| EngramError::IndexFault(e.to_string()))?;

        let bootstrap_conn = database
            .connect()
            .map_err(|e| EngramError::IndexFault(e.to_string()))?;
        bootstrap_conn
            .execute_batch(BOOTSTRAP_SCHEMA)
            .await
            .map_err(|e| EngramError::IndexFault(e.to_string()))?;

        let anchor = if is_memory {
            Some(bootstrap_conn)
        } else {
            None
        };

        Ok(Self {
            database: Arc::new(database),
            _memory_anchor: anchor,
        })
    }

    fn connection(&self) -> Result<Connection, EngramError> {
        self.database
            .connect()
            .map_err(|e| EngramError::IndexFault(e.to_string()))
    }

    #[instrument(skip(self, summary), fields(session_id = %summary.session_id))]
    pub async fn record(&self, summary: &SessionSummary) -> Result<(), EngramError> {
        let conn = self.connection()?;
        let outcome = serde_json::to_value(summary.outcome)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        conn.execute(
            "INSERT INTO engram_sessions
                (session_id, tenant_id, agent_id, intent, content_address, outcome,
                 action_count, opened_at, closed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(session_id) DO UPDATE SET
                content_address = excluded.content_address,
                outcome = excluded.outcome,
                action_count = excluded.action_count,
                closed_at = excluded.closed_at",
            params![
                summary.session_id.clone(),
                summary.tenant_id.clone(),
                summary.agent_id.clone(),
                summary.intent.clone(),
                summary.content_address.clone(),
                outcome,
                summary.action_count,
                summary.opened_at.to_rfc3339(),
                summary.closed_at.to_rfc3339(),
            ],
        )
        .await
        .map_err(|e| EngramError::IndexFault(e.to_string()))?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_for_tenant(
        &self,
        tenant_id: &str,
        limit: u32,
    ) -> Result<Vec<SessionSummary>, EngramError> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT session_id, tenant_id, agent_id, intent, content_address, outcome,
                        action_count, opened_at, closed_at
                 FROM engram_sessions
                 WHERE tenant_id = ?1
                 ORDER BY closed_at DESC
                 LIMIT ?2",
                params![tenant_id.to_string(), limit],
            )
            .await
            .map_err(|e| EngramError::IndexFault(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| EngramError::IndexFault(e.to_string()))?
        {
            out.push(row_to_summary(&row)?);
        }
        Ok(out)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, session_id: &str) -> Result<SessionSummary, EngramError> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT session_id, tenant_id, agent_id, intent, content_address, outcome,
                        action_count, opened_at, closed_at
                 FROM engram_sessions WHERE session_id = ?1",
                params![session_id.to_string()],
            )
            .await
            .map_err(|e| EngramError::IndexFault(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| EngramError::IndexFault(e.to_string()))?
        {
            Some(row) => row_to_summary(&row),
            None => Err(EngramError::NotFound(session_id.to_string())),
        }
    }
}

fn row_to_summary(row: &libsql::Row) -> Result<SessionSummary, EngramError> {
    let outcome_str: String = row
        .get(5)
        .map_err(|e| EngramError::IndexFault(e.to_string()))?;
    let outcome = match outcome_str.as_str() {
        "success" => SessionOutcome::Success,
        "partial" => SessionOutcome::Partial,
        _ => SessionOutcome::Failed,
    };

    let opened_at: String = row
        .get(7)
        .map_err(|e| EngramError::IndexFault(e.to_string()))?;
    let closed_at: String = row
        .get(8)
        .map_err(|e| EngramError::IndexFault(e.to_string()))?;

    Ok(SessionSummary {
        session_id: row.get(0).map_err(|e| EngramError::IndexFault(e.to_string()))?,
        tenant_id: row.get(1).map_err(|e| EngramError::IndexFault(e.to_string()))?,
        agent_id: row.get(2).map_err(|e| EngramError::IndexFault(e.to_string()))?,
        intent: row.get(3).map_err(|e| EngramError::IndexFault(e.to_string()))?,
        content_address: row.get(4).map_err(|e| EngramError::IndexFault(e.to_string()))?,
        outcome,
        action_count: row.get(6).map_err(|e| EngramError::IndexFault(e.to_string()))?,
        opened_at: DateTime::parse_from_rfc3339(&opened_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| EngramError::IndexFault(e.to_string()))?,
        closed_at: DateTime::parse_from_rfc3339(&closed_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| EngramError::IndexFault(e.to_string()))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(id: &str) -> SessionSummary {
        SessionSummary {
            session_id: id.to_string(),
            tenant_id: "t1".into(),
            agent_id: "aws-connector".into(),
            intent: "discover".into(),
            content_address: "deadbeef".into(),
            outcome: SessionOutcome::Success,
            action_count: 3,
            opened_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            closed_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn records_and_lists_by_tenant() {
        let index = SessionIndex::connect(":memory:").await.unwrap();
        index.record(&sample("s1")).await.unwrap();
        index.record(&sample("s2")).await.unwrap();

        let listed = index.list_for_tenant("t1", 10).await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn get_missing_session_errors() {
        let index = SessionIndex::connect(":memory:").await.unwrap();
        let err = index.get("nope").await.unwrap_err();
        assert!(matches!(err, EngramError::NotFound(_)));
    }
}
