use serde::{Deserialize, Serialize};

use crate::tenant::TenantId;

/// The eight event kinds the core produces (spec §6). Declared once here
/// and referenced by value everywhere a producer or subscriber needs them,
/// rather than duplicated per crate or passed around as untyped JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DomainEvent {
    NodeDiscovered {
        node_id: String,
        node_type: String,
        label: String,
    },
    NodeUpdated {
        node_id: String,
        changed_fields: Vec<String>,
    },
    NodeStale {
        node_id: String,
        last_seen: chrono::DateTime<chrono::Utc>,
    },
    EdgeDiscovered {
        source_id: String,
        target_id: String,
        edge_type: String,
    },
    VulnerabilityFound {
        node_id: String,
        cve_id: String,
        cvss_score: Option<f64>,
        exploitable: bool,
    },
    ScanStarted {
        scan_id: String,
        scan_type: String,
        target: String,
    },
    ScanCompleted {
        scan_id: String,
        nodes_found: u64,
        nodes_updated: u64,
        nodes_stale: u64,
        duration_ms: u64,
    },
    EngramRecorded {
        session_id: String,
        agent_type: String,
        intent: String,
        action_count: u64,
    },
}

/// A `DomainEvent` together with the tenant it belongs to. Topics are
/// partitioned by `tenant_id` (spec §6); per-`(tenant, topic)` order is
/// preserved by whatever channel carries this envelope, not by the event
/// itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub tenant_id: TenantId,
    pub event: DomainEvent,
}

/// The narrowest possible seam between event producers (the graph adapter,
/// the enrichment orchestrator) and whatever actually fans events out (the
/// orchestrator's broadcast-backed event bus). Producers depend only on
/// this trait, never on the bus implementation, so tests can substitute a
/// `Vec`-collecting double.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, envelope: EventEnvelope);
}

/// No-op publisher for call sites (and tests) that don't care about events.
pub struct NullEventPublisher;

impl EventPublisher for NullEventPublisher {
    fn publish(&self, _envelope: EventEnvelope) {}
}
