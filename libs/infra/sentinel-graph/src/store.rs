use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use libsql::params;
use sentinel_core::{
    DomainEvent, Edge, EdgeAttrs, EdgeType, EventEnvelope, EventPublisher, NodeKind,
    NullEventPublisher, PropertyMap, TenantContext,
};
use tracing::instrument;

use crate::client::GraphClient;
use crate::error::GraphError;
use crate::retry::with_retry;
use crate::time_fmt::{parse_rfc3339, to_rfc3339};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertResult {
    pub id: String,
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    /// Equality filters over `properties()` keys. Deliberately has no
    /// `tenant_id` field — the adapter rejects any attempt to filter on it
    /// directly (spec §4.3), since tenant scoping is supplied once, by the
    /// `TenantContext`, not by caller-constructed predicates.
    pub equals: BTreeMap<String, String>,
}

impl NodeFilter {
    /// Returns an error if the caller attempts to smuggle a `tenant_id`
    /// predicate into the filter instead of going through the context.
    fn validate(&self) -> Result<(), GraphError> {
        if self.equals.contains_key("tenant_id") {
            return Err(GraphError::Query(
                "filters may not reference tenant_id directly".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { offset: 0, limit: 100 }
    }
}

#[derive(Debug, Clone)]
pub struct StoredNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub properties: PropertyMap,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub stale: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GraphStats {
    pub counts_by_label: BTreeMap<String, u64>,
}

#[derive(Debug, Clone)]
pub struct EdgeApplyOutcome {
    pub applied: Vec<(EdgeType, String, String)>,
    pub dropped: Vec<(EdgeType, String, String, GraphError)>,
}

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub nodes_created: u64,
    pub nodes_updated: u64,
    pub edges_applied: u64,
    pub edges_dropped: u64,
}

/// The sole path to the property-graph backend (spec §4.3). No other
/// component is expected to issue raw queries against `nodes`/`edges`.
#[derive(Clone)]
pub struct GraphStore {
    client: GraphClient,
    publisher: Arc<dyn EventPublisher>,
}

impl GraphStore {
    pub fn new(client: GraphClient) -> Self {
        Self {
            client,
            publisher: Arc::new(NullEventPublisher),
        }
    }

    pub fn with_publisher(client: GraphClient, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { client, publisher }
    }

    fn publish(&self, ctx: &TenantContext, event: DomainEvent) {
        self.publisher.publish(EventEnvelope {
            tenant_id: ctx.tenant_id().clone(),
            event,
        });
    }

    #[instrument(skip(self, kind), fields(tenant_id = %ctx.tenant_id(), label = kind.label()))]
    pub async fn upsert_node(
        &self,
        ctx: &TenantContext,
        kind: NodeKind,
        now: DateTime<Utc>,
    ) -> Result<UpsertResult, GraphError> {
        let tenant_id = ctx.tenant_id().as_str().to_string();
        let id = kind.natural_key();
        let label = kind.label().to_string();
        let new_properties = kind.properties();
        let kind_json =
            serde_json::to_string(&kind).map_err(|e| GraphError::Query(e.to_string()))?;
        let properties_json =
            serde_json::to_string(&new_properties).map_err(|e| GraphError::Query(e.to_string()))?;
        let now_str = to_rfc3339(now);

        let outcome = with_retry(|| {
            let tenant_id = tenant_id.clone();
            let id = id.clone();
            let label = label.clone();
            let kind_json = kind_json.clone();
            let properties_json = properties_json.clone();
            let now_str = now_str.clone();
            let new_properties = new_properties.clone();
            async move {
                let conn = self.client.connection()?;
                let tx = conn
                    .transaction()
                    .await
                    .map_err(|e| GraphError::Connection(e.to_string()))?;

                let outcome = Self::upsert_node_in_tx(
                    &tx,
                    &tenant_id,
                    &id,
                    &label,
                    &kind_json,
                    &properties_json,
                    &new_properties,
                    &now_str,
                    now,
                )
                .await?;

                tx.commit()
                    .await
                    .map_err(|e| GraphError::Query(e.to_string()))?;

                Ok(outcome)
            }
        })
        .await?;

        Ok(outcome_to_result(&id, &label, outcome, ctx, self))
    }

    #[instrument(skip(self, attrs), fields(tenant_id = %ctx.tenant_id(), edge_type = ?edge_type))]
    pub async fn upsert_edge(
        &self,
        ctx: &TenantContext,
        edge_type: EdgeType,
        source_id: String,
        target_id: String,
        attrs: EdgeAttrs,
        now: DateTime<Utc>,
    ) -> Result<UpsertResult, GraphError> {
        let tenant_id = ctx.tenant_id().as_str().to_string();
        let attrs_json = serde_json::to_string(&attrs).map_err(|e| GraphError::Query(e.to_string()))?;
        let now_str = to_rfc3339(now);
        let edge_type_str = format!("{edge_type:?}");

        let created = with_retry(|| {
            let tenant_id = tenant_id.clone();
            let source_id = source_id.clone();
            let target_id = target_id.clone();
            let attrs_json = attrs_json.clone();
            let now_str = now_str.clone();
            let edge_type_str = edge_type_str.clone();
            async move {
                let conn = self.client.connection()?;
                let tx = conn
                    .transaction()
                    .await
                    .map_err(|e| GraphError::Connection(e.to_string()))?;

                let created = Self::upsert_edge_in_tx(
                    &tx,
                    &tenant_id,
                    &edge_type_str,
                    &source_id,
                    &target_id,
                    &attrs_json,
                    &now_str,
                    now,
                )
                .await?;

                tx.commit().await.map_err(|e| GraphError::Query(e.to_string()))?;
                Ok(created)
            }
        })
        .await?;

        if created {
            self.publish(
                ctx,
                DomainEvent::EdgeDiscovered {
                    source_id: source_id.clone(),
                    target_id: target_id.clone(),
                    edge_type: edge_type_str.clone(),
                },
            );
        }
        Ok(UpsertResult {
            id: format!("{edge_type_str}:{source_id}:{target_id}"),
            created,
        })
    }

    /// Node-upsert body shared by `upsert_node` and `apply_batch`, run
    /// against a caller-supplied transaction so a batch commits atomically
    /// instead of one transaction per row.
    async fn upsert_node_in_tx(
        tx: &libsql::Transaction,
        tenant_id: &str,
        id: &str,
        label: &str,
        kind_json: &str,
        properties_json: &str,
        new_properties: &PropertyMap,
        now_str: &str,
        now: DateTime<Utc>,
    ) -> Result<NodeUpsertOutcome, GraphError> {
        let mut rows = tx
            .query(
                "SELECT properties, first_seen, last_seen FROM nodes
                 WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id.to_string(), id.to_string()],
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let existing = rows
            .next()
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let outcome = if let Some(row) = existing {
            let old_properties_raw: String =
                row.get(0).map_err(|e| GraphError::Query(e.to_string()))?;
            let old_last_seen_raw: String =
                row.get(2).map_err(|e| GraphError::Query(e.to_string()))?;
            let old_properties: PropertyMap =
                serde_json::from_str(&old_properties_raw).unwrap_or_default();
            let old_last_seen = parse_rfc3339(&old_last_seen_raw);

            let effective_last_seen = old_last_seen.max(now);
            let effective_last_seen_str = to_rfc3339(effective_last_seen);

            tx.execute(
                "UPDATE nodes SET kind_json = ?1, properties = ?2, last_seen = ?3
                 WHERE tenant_id = ?4 AND id = ?5",
                params![
                    kind_json.to_string(),
                    properties_json.to_string(),
                    effective_last_seen_str,
                    tenant_id.to_string(),
                    id.to_string()
                ],
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

            let mut changed_fields: Vec<String> = new_properties
                .iter()
                .filter(|(k, v)| old_properties.get(*k) != Some(*v))
                .map(|(k, _)| k.clone())
                .collect();
            if effective_last_seen != old_last_seen {
                changed_fields.push("last_seen".to_string());
            }

            NodeUpsertOutcome::Updated { changed_fields }
        } else {
            tx.execute(
                "INSERT INTO nodes
                    (tenant_id, id, label, kind_json, properties, first_seen, last_seen, stale)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 0)",
                params![
                    tenant_id.to_string(),
                    id.to_string(),
                    label.to_string(),
                    kind_json.to_string(),
                    properties_json.to_string(),
                    now_str.to_string()
                ],
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

            NodeUpsertOutcome::Created
        };

        Ok(outcome)
    }

    /// Edge-upsert body shared by `upsert_edge` and `apply_batch`; see
    /// `upsert_node_in_tx`.
    async fn upsert_edge_in_tx(
        tx: &libsql::Transaction,
        tenant_id: &str,
        edge_type_str: &str,
        source_id: &str,
        target_id: &str,
        attrs_json: &str,
        now_str: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, GraphError> {
        endpoints_exist_tx(tx, tenant_id, source_id, target_id).await?;

        let mut rows = tx
            .query(
                "SELECT last_seen FROM edges
                 WHERE tenant_id = ?1 AND edge_type = ?2 AND source_id = ?3 AND target_id = ?4",
                params![
                    tenant_id.to_string(),
                    edge_type_str.to_string(),
                    source_id.to_string(),
                    target_id.to_string()
                ],
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let existing = rows.next().await.map_err(|e| GraphError::Query(e.to_string()))?;

        let created = if let Some(row) = existing {
            let old_last_seen_raw: String =
                row.get(0).map_err(|e| GraphError::Query(e.to_string()))?;
            let old_last_seen = parse_rfc3339(&old_last_seen_raw);
            let effective = old_last_seen.max(now);
            tx.execute(
                "UPDATE edges SET attrs = ?1, last_seen = ?2
                 WHERE tenant_id = ?3 AND edge_type = ?4 AND source_id = ?5 AND target_id = ?6",
                params![
                    attrs_json.to_string(),
                    to_rfc3339(effective),
                    tenant_id.to_string(),
                    edge_type_str.to_string(),
                    source_id.to_string(),
                    target_id.to_string()
                ],
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;
            false
        } else {
            tx.execute(
                "INSERT INTO edges
                    (tenant_id, edge_type, source_id, target_id, attrs, first_seen, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    tenant_id.to_string(),
                    edge_type_str.to_string(),
                    source_id.to_string(),
                    target_id.to_string(),
                    attrs_json.to_string(),
                    now_str.to_string()
                ],
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;
            true
        };

        Ok(created)
    }

    /// Applies a batch of nodes then edges in a single logical transaction
    /// (spec §4.3, §7): nodes sorted by `(label, natural_key)` first, then
    /// edges, with endpoint existence re-checked inside the same
    /// transaction. The whole batch commits once at the end; any error
    /// other than a missing edge endpoint rolls the entire batch back
    /// (`Transaction::drop` rolls back an uncommitted transaction). An edge
    /// whose endpoint is missing is dropped individually (P3) without
    /// aborting the rest of the batch.
    #[instrument(skip(self, nodes, edges), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn apply_batch(
        &self,
        ctx: &TenantContext,
        mut nodes: Vec<NodeKind>,
        edges: Vec<(EdgeType, String, String, EdgeAttrs)>,
        now: DateTime<Utc>,
    ) -> Result<BatchResult, GraphError> {
        nodes.sort_by(|a, b| (a.label(), a.natural_key()).cmp(&(b.label(), b.natural_key())));

        let tenant_id = ctx.tenant_id().as_str().to_string();
        let now_str = to_rfc3339(now);

        let (node_outcomes, edge_outcomes, result) = with_retry(|| {
            let tenant_id = tenant_id.clone();
            let now_str = now_str.clone();
            let nodes = nodes.clone();
            let edges = edges.clone();
            async move {
                let conn = self.client.connection()?;
                let tx = conn
                    .transaction()
                    .await
                    .map_err(|e| GraphError::Connection(e.to_string()))?;

                let mut result = BatchResult::default();
                let mut node_outcomes = Vec::with_capacity(nodes.len());
                for node in nodes {
                    let id = node.natural_key();
                    let label = node.label().to_string();
                    let new_properties = node.properties();
                    let kind_json =
                        serde_json::to_string(&node).map_err(|e| GraphError::Query(e.to_string()))?;
                    let properties_json = serde_json::to_string(&new_properties)
                        .map_err(|e| GraphError::Query(e.to_string()))?;

                    let outcome = Self::upsert_node_in_tx(
                        &tx,
                        &tenant_id,
                        &id,
                        &label,
                        &kind_json,
                        &properties_json,
                        &new_properties,
                        &now_str,
                        now,
                    )
                    .await?;

                    match &outcome {
                        NodeUpsertOutcome::Created => result.nodes_created += 1,
                        NodeUpsertOutcome::Updated { .. } => result.nodes_updated += 1,
                    }
                    node_outcomes.push((id, label, outcome));
                }

                let mut edge_outcomes = Vec::with_capacity(edges.len());
                for (edge_type, source_id, target_id, attrs) in edges {
                    let edge_type_str = format!("{edge_type:?}");
                    let attrs_json =
                        serde_json::to_string(&attrs).map_err(|e| GraphError::Query(e.to_string()))?;

                    match Self::upsert_edge_in_tx(
                        &tx,
                        &tenant_id,
                        &edge_type_str,
                        &source_id,
                        &target_id,
                        &attrs_json,
                        &now_str,
                        now,
                    )
                    .await
                    {
                        Ok(created) => {
                            result.edges_applied += 1;
                            edge_outcomes.push((edge_type_str, source_id, target_id, created));
                        }
                        Err(GraphError::EndpointMissing(_)) => {
                            result.edges_dropped += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }

                tx.commit()
                    .await
                    .map_err(|e| GraphError::Query(e.to_string()))?;

                Ok((node_outcomes, edge_outcomes, result))
            }
        })
        .await?;

        for (id, label, outcome) in node_outcomes {
            match outcome {
                NodeUpsertOutcome::Created => {
                    self.publish(
                        ctx,
                        DomainEvent::NodeDiscovered {
                            node_id: id,
                            node_type: label.clone(),
                            label,
                        },
                    );
                }
                NodeUpsertOutcome::Updated { changed_fields } => {
                    self.publish(ctx, DomainEvent::NodeUpdated { node_id: id, changed_fields });
                }
            }
        }

        for (edge_type_str, source_id, target_id, created) in edge_outcomes {
            if created {
                self.publish(
                    ctx,
                    DomainEvent::EdgeDiscovered {
                        source_id,
                        target_id,
                        edge_type: edge_type_str,
                    },
                );
            }
        }

        Ok(result)
    }

    #[instrument(skip(self, filter), fields(tenant_id = %ctx.tenant_id(), label))]
    pub async fn list_nodes(
        &self,
        ctx: &TenantContext,
        label: &str,
        filter: &NodeFilter,
        page: Page,
    ) -> Result<Vec<StoredNode>, GraphError> {
        filter.validate()?;
        let conn = self.client.connection()?;

        let mut rows = conn
            .query(
                "SELECT id, label, kind_json, properties, first_seen, last_seen, stale
                 FROM nodes WHERE tenant_id = ?1 AND label = ?2
                 ORDER BY id LIMIT ?3 OFFSET ?4",
                params![
                    ctx.tenant_id().as_str().to_string(),
                    label.to_string(),
                    page.limit,
                    page.offset
                ],
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| GraphError::Query(e.to_string()))? {
            let node = row_to_stored_node(&row)?;
            if filter
                .equals
                .iter()
                .all(|(k, v)| matches_property(&node.properties, k, v))
            {
                out.push(node);
            }
        }
        Ok(out)
    }

    #[instrument(skip(self), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn neighbors(
        &self,
        ctx: &TenantContext,
        node_id: &str,
        direction: Direction,
        edge_types: Option<&[EdgeType]>,
    ) -> Result<Vec<StoredNode>, GraphError> {
        let conn = self.client.connection()?;
        let tenant_id = ctx.tenant_id().as_str().to_string();

        let mut neighbor_ids = Vec::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            let mut rows = conn
                .query(
                    "SELECT target_id, edge_type FROM edges WHERE tenant_id = ?1 AND source_id = ?2",
                    params![tenant_id.clone(), node_id.to_string()],
                )
                .await
                .map_err(|e| GraphError::Query(e.to_string()))?;
            while let Some(row) = rows.next().await.map_err(|e| GraphError::Query(e.to_string()))? {
                let target: String = row.get(0).map_err(|e| GraphError::Query(e.to_string()))?;
                let et: String = row.get(1).map_err(|e| GraphError::Query(e.to_string()))?;
                if edge_type_allowed(&et, edge_types) {
                    neighbor_ids.push(target);
                }
            }
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            let mut rows = conn
                .query(
                    "SELECT source_id, edge_type FROM edges WHERE tenant_id = ?1 AND target_id = ?2",
                    params![tenant_id.clone(), node_id.to_string()],
                )
                .await
                .map_err(|e| GraphError::Query(e.to_string()))?;
            while let Some(row) = rows.next().await.map_err(|e| GraphError::Query(e.to_string()))? {
                let source: String = row.get(0).map_err(|e| GraphError::Query(e.to_string()))?;
                let et: String = row.get(1).map_err(|e| GraphError::Query(e.to_string()))?;
                if edge_type_allowed(&et, edge_types) {
                    neighbor_ids.push(source);
                }
            }
        }

        let mut out = Vec::new();
        for id in neighbor_ids {
            let mut rows = conn
                .query(
                    "SELECT id, label, kind_json, properties, first_seen, last_seen, stale
                     FROM nodes WHERE tenant_id = ?1 AND id = ?2",
                    params![tenant_id.clone(), id],
                )
                .await
                .map_err(|e| GraphError::Query(e.to_string()))?;
            if let Some(row) = rows.next().await.map_err(|e| GraphError::Query(e.to_string()))? {
                out.push(row_to_stored_node(&row)?);
            }
        }
        Ok(out)
    }

    /// Over pre-declared full-text indexes only (spec §4.3); `index` names
    /// one of `hosts`, `users`, `vulnerabilities`.
    #[instrument(skip(self, query_text), fields(tenant_id = %ctx.tenant_id(), index))]
    pub async fn search(
        &self,
        ctx: &TenantContext,
        index: &str,
        query_text: &str,
        limit: u32,
    ) -> Result<Vec<String>, GraphError> {
        let table = match index {
            "hosts" => "hosts_fts",
            "users" => "users_fts",
            "vulnerabilities" => "vulnerabilities_fts",
            other => return Err(GraphError::Query(format!("unknown search index {other}"))),
        };
        let conn = self.client.connection()?;
        let sql = format!(
            "SELECT node_id FROM {table} WHERE tenant_id = ?1 AND text MATCH ?2 LIMIT ?3"
        );
        let mut rows = conn
            .query(
                &sql,
                params![
                    ctx.tenant_id().as_str().to_string(),
                    query_text.to_string(),
                    limit
                ],
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| GraphError::Query(e.to_string()))? {
            out.push(row.get(0).map_err(|e| GraphError::Query(e.to_string()))?);
        }
        Ok(out)
    }

    #[instrument(skip(self), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn stats(&self, ctx: &TenantContext) -> Result<GraphStats, GraphError> {
        let conn = self.client.connection()?;
        let mut rows = conn
            .query(
                "SELECT label, COUNT(*) FROM nodes WHERE tenant_id = ?1 GROUP BY label",
                params![ctx.tenant_id().as_str().to_string()],
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let mut counts = BTreeMap::new();
        while let Some(row) = rows.next().await.map_err(|e| GraphError::Query(e.to_string()))? {
            let label: String = row.get(0).map_err(|e| GraphError::Query(e.to_string()))?;
            let count: i64 = row.get(1).map_err(|e| GraphError::Query(e.to_string()))?;
            counts.insert(label, count as u64);
        }
        Ok(GraphStats { counts_by_label: counts })
    }

    /// Marks nodes whose `last_seen < older_than` as stale. Idempotent: a
    /// second sweep over the same window marks the same rows again without
    /// changing their state further, and emits no duplicate events for
    /// nodes already marked.
    #[instrument(skip(self), fields(tenant_id = %ctx.tenant_id(), label))]
    pub async fn sweep_stale(
        &self,
        ctx: &TenantContext,
        label: &str,
        older_than: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> Result<u64, GraphError> {
        let conn = self.client.connection()?;
        let tenant_id = ctx.tenant_id().as_str().to_string();
        let threshold = to_rfc3339(older_than);

        let mut rows = conn
            .query(
                "SELECT id, last_seen FROM nodes
                 WHERE tenant_id = ?1 AND label = ?2 AND last_seen < ?3 AND stale = 0",
                params![tenant_id.clone(), label.to_string(), threshold.clone()],
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let mut newly_stale = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| GraphError::Query(e.to_string()))? {
            let id: String = row.get(0).map_err(|e| GraphError::Query(e.to_string()))?;
            let last_seen: String = row.get(1).map_err(|e| GraphError::Query(e.to_string()))?;
            newly_stale.push((id, last_seen));
        }

        conn.execute(
            "UPDATE nodes SET stale = 1
             WHERE tenant_id = ?1 AND label = ?2 AND last_seen < ?3 AND stale = 0",
            params![tenant_id, label.to_string(), threshold],
        )
        .await
        .map_err(|e| GraphError::Query(e.to_string()))?;

        for (id, last_seen) in &newly_stale {
            self.publish(
                ctx,
                DomainEvent::NodeStale {
                    node_id: id.clone(),
                    last_seen: parse_rfc3339(last_seen),
                },
            );
        }

        Ok(newly_stale.len() as u64)
    }
}

enum NodeUpsertOutcome {
    Created,
    Updated { changed_fields: Vec<String> },
}

fn outcome_to_result(
    id: &str,
    label: &str,
    outcome: NodeUpsertOutcome,
    ctx: &TenantContext,
    store: &GraphStore,
) -> UpsertResult {
    match outcome {
        NodeUpsertOutcome::Created => {
            store.publish(
                ctx,
                DomainEvent::NodeDiscovered {
                    node_id: id.to_string(),
                    node_type: label.to_string(),
                    label: label.to_string(),
                },
            );
            UpsertResult {
                id: id.to_string(),
                created: true,
            }
        }
        NodeUpsertOutcome::Updated { changed_fields } => {
            store.publish(
                ctx,
                DomainEvent::NodeUpdated {
                    node_id: id.to_string(),
                    changed_fields,
                },
            );
            UpsertResult {
                id: id.to_string(),
                created: false,
            }
        }
    }
}

async fn endpoints_exist_tx(
    tx: &libsql::Transaction,
    tenant_id: &str,
    source_id: &str,
    target_id: &str,
) -> Result<(), GraphError> {
    for (role, candidate) in [("source", source_id), ("target", target_id)] {
        let mut rows = tx
            .query(
                "SELECT 1 FROM nodes WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id.to_string(), candidate.to_string()],
            )
            .await
            .map_err(|e| GraphError::Query(e.to_string()))?;
        if rows.next().await.map_err(|e| GraphError::Query(e.to_string()))?.is_none() {
            return Err(GraphError::EndpointMissing(format!(
                "{role} node {candidate} not found in tenant {tenant_id}"
            )));
        }
    }
    Ok(())
}

fn edge_type_allowed(candidate: &str, allowed: Option<&[EdgeType]>) -> bool {
    match allowed {
        None => true,
        Some(types) => types.iter().any(|t| format!("{t:?}") == candidate),
    }
}

fn matches_property(properties: &PropertyMap, key: &str, expected: &str) -> bool {
    match properties.get(key) {
        Some(sentinel_core::PropertyValue::String(s)) => s == expected,
        Some(sentinel_core::PropertyValue::Bool(b)) => b.to_string() == expected,
        Some(sentinel_core::PropertyValue::Int(i)) => i.to_string() == expected,
        Some(sentinel_core::PropertyValue::Float(f)) => f.to_string() == expected,
        _ => false,
    }
}

fn row_to_stored_node(row: &libsql::Row) -> Result<StoredNode, GraphError> {
    let id: String = row.get(0).map_err(|e| GraphError::Query(e.to_string()))?;
    let label: String = row.get(1).map_err(|e| GraphError::Query(e.to_string()))?;
    let kind_json: String = row.get(2).map_err(|e| GraphError::Query(e.to_string()))?;
    let properties_json: String = row.get(3).map_err(|e| GraphError::Query(e.to_string()))?;
    let first_seen: String = row.get(4).map_err(|e| GraphError::Query(e.to_string()))?;
    let last_seen: String = row.get(5).map_err(|e| GraphError::Query(e.to_string()))?;
    let stale: i64 = row.get(6).map_err(|e| GraphError::Query(e.to_string()))?;

    let kind: NodeKind =
        serde_json::from_str(&kind_json).map_err(|e| GraphError::Query(e.to_string()))?;
    let properties: PropertyMap =
        serde_json::from_str(&properties_json).map_err(|e| GraphError::Query(e.to_string()))?;

    Ok(StoredNode {
        id,
        label,
        kind,
        properties,
        first_seen: parse_rfc3339(&first_seen),
        last_seen: parse_rfc3339(&last_seen),
        stale: stale != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sentinel_core::{Criticality, Host, TenantId};

    async fn store() -> GraphStore {
        let client = GraphClient::connect(":memory:", None).await.unwrap();
        GraphStore::new(client)
    }

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, minute, 0).unwrap()
    }

    fn host(ip: &str, instance_id: &str) -> NodeKind {
        NodeKind::Host(Host {
            ip: ip.to_string(),
            hostname: None,
            os: None,
            mac: None,
            provider: Some("aws".into()),
            instance_id: Some(instance_id.into()),
            region: Some("us-east-1".into()),
            criticality: Criticality::Medium,
            tags: vec![],
        })
    }

    #[tokio::test]
    async fn upsert_node_is_idempotent_and_preserves_first_seen() {
        let store = store().await;
        let ctx = TenantContext::new(TenantId::new("t1"));

        let first = store.upsert_node(&ctx, host("10.0.0.1", "i-1"), t(0)).await.unwrap();
        assert!(first.created);

        let second = store.upsert_node(&ctx, host("10.0.0.1", "i-1"), t(60)).await.unwrap();
        assert!(!second.created);
        assert_eq!(first.id, second.id);

        let rows = store
            .list_nodes(&ctx, "Host", &NodeFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].first_seen, t(0));
        assert_eq!(rows[0].last_seen, t(60));
    }

    #[tokio::test]
    async fn upsert_edge_requires_both_endpoints() {
        let store = store().await;
        let ctx = TenantContext::new(TenantId::new("t1"));

        let host_result = store.upsert_node(&ctx, host("10.0.0.1", "i-1"), t(0)).await.unwrap();

        let err = store
            .upsert_edge(
                &ctx,
                EdgeType::BelongsToSubnet,
                host_result.id.clone(),
                "missing-subnet".to_string(),
                EdgeAttrs::default(),
                t(0),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::EndpointMissing(_)));
    }

    #[tokio::test]
    async fn apply_batch_drops_edges_with_missing_endpoints_without_aborting() {
        let store = store().await;
        let ctx = TenantContext::new(TenantId::new("t1"));

        let nodes = vec![host("10.0.0.1", "i-1")];
        let edges = vec![(
            EdgeType::BelongsToSubnet,
            "will-not-exist".to_string(),
            "also-missing".to_string(),
            EdgeAttrs::default(),
        )];

        let result = store.apply_batch(&ctx, nodes, edges, t(0)).await.unwrap();
        assert_eq!(result.nodes_created, 1);
        assert_eq!(result.edges_applied, 0);
        assert_eq!(result.edges_dropped, 1);
    }

    #[tokio::test]
    async fn filters_cannot_reference_tenant_id_directly() {
        let store = store().await;
        let ctx = TenantContext::new(TenantId::new("t1"));
        let mut filter = NodeFilter::default();
        filter.equals.insert("tenant_id".to_string(), "t2".to_string());

        let err = store
            .list_nodes(&ctx, "Host", &filter, Page::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Query(_)));
    }

    #[tokio::test]
    async fn cross_tenant_lists_never_mix() {
        let store = store().await;
        let t1 = TenantContext::new(TenantId::new("t1"));
        let t2 = TenantContext::new(TenantId::new("t2"));

        // Same source-native identifiers under both tenants: if isolation
        // were broken, the second upsert would update tenant t1's row
        // instead of inserting a distinct row for t2.
        store.upsert_node(&t1, host("10.0.0.1", "i-1"), t(0)).await.unwrap();
        store.upsert_node(&t2, host("10.0.0.1", "i-1"), t(0)).await.unwrap();

        let t1_hosts = store
            .list_nodes(&t1, "Host", &NodeFilter::default(), Page::default())
            .await
            .unwrap();
        let t2_hosts = store
            .list_nodes(&t2, "Host", &NodeFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(t1_hosts.len(), 1);
        assert_eq!(t2_hosts.len(), 1);
    }

    #[tokio::test]
    async fn sweep_stale_marks_idempotently() {
        let store = store().await;
        let ctx = TenantContext::new(TenantId::new("t1"));
        store.upsert_node(&ctx, host("10.0.0.1", "i-1"), t(0)).await.unwrap();

        let first_sweep = store
            .sweep_stale(&ctx, "Host", t(30), t(31))
            .await
            .unwrap();
        assert_eq!(first_sweep, 1);

        let second_sweep = store
            .sweep_stale(&ctx, "Host", t(30), t(31))
            .await
            .unwrap();
        assert_eq!(second_sweep, 0);
    }
}
