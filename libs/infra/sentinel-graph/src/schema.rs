use libsql::Connection;
use tracing::{debug, instrument, warn};

use crate::error::GraphError;

/// Base tables. `properties` is an opaque JSON blob (spec §4.1: "map of
/// primitive-typed attributes") rather than one column per attribute,
/// since the attribute set varies by label; uniqueness and staleness
/// indexes below are what make tenant-scoped lookups fast regardless.
const TACTICAL_TABLES: &[(&str, &str)] = &[
    (
        "TABLE_NODES",
        r#"
        CREATE TABLE IF NOT EXISTS nodes (
            tenant_id   TEXT NOT NULL,
            id          TEXT NOT NULL,
            label       TEXT NOT NULL,
            kind_json   TEXT NOT NULL,
            properties  TEXT NOT NULL,
            first_seen  TEXT NOT NULL,
            last_seen   TEXT NOT NULL,
            stale       INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (tenant_id, id)
        );
    "#,
    ),
    (
        "TABLE_EDGES",
        r#"
        CREATE TABLE IF NOT EXISTS edges (
            tenant_id   TEXT NOT NULL,
            edge_type   TEXT NOT NULL,
            source_id   TEXT NOT NULL,
            target_id   TEXT NOT NULL,
            attrs       TEXT NOT NULL,
            first_seen  TEXT NOT NULL,
            last_seen   TEXT NOT NULL,
            PRIMARY KEY (tenant_id, edge_type, source_id, target_id)
        );
    "#,
    ),
];

const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    (
        "IDX_NODES_LABEL",
        "CREATE INDEX IF NOT EXISTS idx_nodes_tenant_label ON nodes(tenant_id, label);",
    ),
    (
        "IDX_NODES_STALENESS",
        "CREATE INDEX IF NOT EXISTS idx_nodes_staleness ON nodes(tenant_id, label, last_seen);",
    ),
    (
        "IDX_EDGES_SOURCE",
        "CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(tenant_id, source_id);",
    ),
    (
        "IDX_EDGES_TARGET",
        "CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(tenant_id, target_id);",
    ),
];

/// Full-text indexes over selected text fields (spec §6). `contentless`
/// FTS5 tables indexed against the `properties` JSON blob would need a
/// custom tokenizer per field; instead we maintain small denormalized FTS
/// tables fed from the write path, one per searchable label.
const SEARCH_INDEXES: &[(&str, &str)] = &[
    (
        "FTS_HOSTS",
        "CREATE VIRTUAL TABLE IF NOT EXISTS hosts_fts USING fts5(tenant_id UNINDEXED, node_id UNINDEXED, text);",
    ),
    (
        "FTS_USERS",
        "CREATE VIRTUAL TABLE IF NOT EXISTS users_fts USING fts5(tenant_id UNINDEXED, node_id UNINDEXED, text);",
    ),
    (
        "FTS_VULNS",
        "CREATE VIRTUAL TABLE IF NOT EXISTS vulnerabilities_fts USING fts5(tenant_id UNINDEXED, node_id UNINDEXED, text);",
    ),
];

#[instrument(skip(conn))]
pub async fn apply_schema(conn: &Connection) -> Result<(), GraphError> {
    for (identifier, sql) in TACTICAL_TABLES {
        debug!("solidifying {}", identifier);
        conn.execute(sql, ())
            .await
            .map_err(|e| GraphError::Connection(format!("{identifier}: {e}")))?;
    }

    for (identifier, sql) in ACCELERATION_INDEXES {
        conn.execute(sql, ())
            .await
            .map_err(|e| GraphError::Connection(format!("{identifier}: {e}")))?;
    }

    for (identifier, sql) in SEARCH_INDEXES {
        if let Err(e) = conn.execute(sql, ()).await {
            // FTS5 virtual tables double-report "already exists" in some
            // libsql builds instead of honoring IF NOT EXISTS cleanly.
            let message = e.to_string();
            if message.contains("already exists") {
                debug!("{} already level", identifier);
            } else {
                warn!("{} bootstrap incomplete: {}", identifier, message);
            }
        }
    }

    Ok(())
}
