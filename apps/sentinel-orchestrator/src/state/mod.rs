use std::sync::Arc;

use sentinel_engram::EngramStore;
use sentinel_graph::GraphStore;
use sentinel_intel::EnrichmentOrchestrator;

use crate::repositories::ControlPlaneRepository;
use crate::services::{ConnectorRegistry, EventBus, RunGuard, ScanRunner};

/// The composition root every handler and background daemon is built
/// against. Cloning is cheap: every field is either `Arc`-wrapped or
/// already cheap to clone (`GraphStore`, `EngramStore`, `ControlPlaneRepository`
/// all wrap an `Arc` internally).
#[derive(Clone)]
pub struct AppState {
    pub graph: GraphStore,
    pub engram: EngramStore,
    pub repository: ControlPlaneRepository,
    pub event_bus: Arc<EventBus>,
    pub run_guard: Arc<RunGuard>,
    pub connector_registry: Arc<ConnectorRegistry>,
    pub scan_runner: Arc<ScanRunner>,
    pub enrichment: Arc<EnrichmentOrchestrator>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: GraphStore,
        engram: EngramStore,
        repository: ControlPlaneRepository,
        connector_registry: Arc<ConnectorRegistry>,
        enrichment: Arc<EnrichmentOrchestrator>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let run_guard = Arc::new(RunGuard::new());
        let scan_runner = Arc::new(ScanRunner::new(
            graph.clone(),
            engram.clone(),
            repository.clone(),
            event_bus.clone(),
            run_guard.clone(),
        ));

        Self {
            graph,
            engram,
            repository,
            event_bus,
            run_guard,
            connector_registry,
            scan_runner,
            enrichment,
        }
    }
}
