use std::sync::Arc;

use libsql::{Builder, Connection, Database};
use tracing::{info, instrument};

use crate::error::GraphError;
use crate::schema::apply_schema;

/// Thin connection wrapper, grounded on the teacher's `TursoClient`: one
/// `Database` shared across the process, with a persistent "anchor"
/// connection to keep an in-memory database's schema alive across the
/// separate connections each operation opens.
#[derive(Clone)]
pub struct GraphClient {
    database: Arc<Database>,
    _memory_anchor: Option<Arc<Connection>>,
}

impl GraphClient {
    #[instrument(skip(auth_token))]
    pub async fn connect(database_url: &str, auth_token: Option<String>) -> Result<Self, GraphError> {
        if database_url.is_empty() {
            return Err(GraphError::Connection("SENTINEL_DB_URL is empty".into()));
        }

        let is_remote = database_url.starts_with("libsql://") || database_url.starts_with("https://");
        let is_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        let database = if is_remote {
            let token = auth_token
                .ok_or_else(|| GraphError::Connection("remote graph backend requires an auth token".into()))?;
            Builder::new_remote(database_url.to_string(), token)
                .build()
                .await
        } else {
            Builder::new_local(database_url).build().await
        }
        .map_err(|e| GraphError::Connection(format!("driver init failed: {e}")))?;

        let shared = Arc::new(database);
        let mut anchor = None;

        if is_memory {
            let anchor_conn = shared
                .connect()
                .map_err(|e| GraphError::Connection(format!("anchor connect failed: {e}")))?;
            apply_schema(&anchor_conn).await?;
            anchor = Some(Arc::new(anchor_conn));
            info!("in-memory graph backend anchored");
        } else {
            let bootstrap_conn = shared
                .connect()
                .map_err(|e| GraphError::Connection(format!("bootstrap connect failed: {e}")))?;
            apply_schema(&bootstrap_conn).await?;
        }

        Ok(Self {
            database: shared,
            _memory_anchor: anchor,
        })
    }

    pub fn connection(&self) -> Result<Connection, GraphError> {
        self.database
            .connect()
            .map_err(|e| GraphError::Connection(e.to_string()))
    }
}
