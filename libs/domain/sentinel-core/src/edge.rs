use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tenant::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    ConnectsTo,
    HasAccess,
    MemberOf,
    RunsOn,
    Trusts,
    RoutesTo,
    Exposes,
    DependsOn,
    CanReach,
    HasCve,
    HasPort,
    HasCertificate,
    BelongsToSubnet,
    BelongsToVpc,
    HasFinding,
}

/// Opaque, optional edge properties. `extras` absorbs anything connector
/// specific that doesn't warrant its own column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeAttrs {
    pub protocol: Option<String>,
    pub port: Option<u16>,
    pub encrypted: Option<bool>,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub exploitability_score: Option<f64>,
    #[serde(default)]
    pub extras: serde_json::Value,
}

/// Edge identity is `(tenant, type, source_id, target_id)` (no separate
/// `id` field — the tuple already determines uniqueness per the data
/// model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub tenant_id: TenantId,
    pub edge_type: EdgeType,
    pub source_id: String,
    pub target_id: String,
    pub attrs: EdgeAttrs,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Edge {
    pub fn new(
        tenant_id: TenantId,
        edge_type: EdgeType,
        source_id: String,
        target_id: String,
        attrs: EdgeAttrs,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id,
            edge_type,
            source_id,
            target_id,
            attrs,
            first_seen: now,
            last_seen: now,
        }
    }
}
