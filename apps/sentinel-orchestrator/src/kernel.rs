use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use sentinel_engram::{EngramStore, FilesystemObjectStore, SessionIndex};
use sentinel_graph::{GraphClient, GraphStore};
use sentinel_intel::{
    CpeMapping, EnrichmentOrchestrator, EpssClient, KevCache, NvdClient, NvdRateRegime,
    ReqwestEpssSource, ReqwestKevSource, ReqwestNvdSource,
};
use tokio::signal;
use tracing::{info, instrument};

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::repositories::{ControlPlaneRepository, OrchestratorDb};
use crate::routes::build_router;
use crate::services::staleness_sweeper::spawn_staleness_sweeper;
use crate::services::{scan_scheduler::spawn_scan_scheduler, ConnectorRegistry};
use crate::state::AppState;

const KEV_CATALOG_URL: &str = "https://www.cisa.gov/sites/default/files/feeds/known_exploited_vulnerabilities.json";
const EPSS_BASE_URL: &str = "https://api.first.org/data/v1/epss";
const NVD_BASE_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";
const DEFAULT_STALENESS_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Composition root for the scan orchestrator binary. `ignite` wires every
/// dependency into an `AppState`; `launch` fans out the background daemons
/// and blocks serving HTTP until shutdown is requested.
pub struct OrchestratorKernel {
    port: u16,
    state: AppState,
    sweep_interval: Duration,
    scheduler_interval: Duration,
    shutdown_grace_period: Duration,
}

impl OrchestratorKernel {
    #[instrument(skip(config))]
    pub async fn ignite(config: &OrchestratorConfig) -> Result<Self, OrchestratorError> {
        let graph_client = GraphClient::connect(&config.database_url, config.database_auth_token.clone())
            .await
            .map_err(OrchestratorError::Graph)?;
        let graph = GraphStore::new(graph_client);

        let object_store = Arc::new(FilesystemObjectStore::new(
            config.engram_object_store_path.clone(),
        ));
        let session_index = SessionIndex::connect(&config.engram_index_url)
            .await
            .map_err(OrchestratorError::Engram)?;
        let (engram, _dropped_rx) = EngramStore::new(object_store, session_index);

        let orchestrator_db =
            OrchestratorDb::connect(&config.database_url, config.database_auth_token.clone())
                .await
                .map_err(OrchestratorError::Repository)?;
        let repository = ControlPlaneRepository::new(orchestrator_db);

        let cpe_mapping = CpeMapping::load_default().map_err(OrchestratorError::Intel)?;

        let kev = Arc::new(KevCache::new(Arc::new(ReqwestKevSource::new(
            KEV_CATALOG_URL.to_string(),
        ))));
        let epss = Arc::new(EpssClient::new(
            Arc::new(ReqwestEpssSource::new(EPSS_BASE_URL.to_string())),
            10,
        ));
        let regime = if config.nvd_api_key.is_some() {
            NvdRateRegime::Authenticated
        } else {
            NvdRateRegime::Unauthenticated
        };
        let nvd = Arc::new(NvdClient::new(
            Arc::new(ReqwestNvdSource::new(
                NVD_BASE_URL.to_string(),
                config.nvd_api_key.clone(),
            )),
            regime,
        ));

        let connector_registry = Arc::new(ConnectorRegistry::new());
        let event_bus = Arc::new(crate::services::EventBus::new());

        let enrichment = Arc::new(EnrichmentOrchestrator::new(
            graph.clone(),
            engram.clone(),
            cpe_mapping,
            kev,
            epss,
            nvd,
            event_bus.clone(),
        ));

        let state = AppState::new(
            graph,
            engram,
            repository,
            connector_registry,
            enrichment,
            event_bus,
        );

        Ok(Self {
            port: config.port,
            state,
            sweep_interval: config.staleness_sweep_interval,
            scheduler_interval: config.scan_scheduler_interval,
            shutdown_grace_period: config.shutdown_grace_period,
        })
    }

    pub async fn launch(self) -> Result<(), OrchestratorError> {
        spawn_staleness_sweeper(
            self.state.graph.clone(),
            self.state.repository.clone(),
            self.sweep_interval,
            DEFAULT_STALENESS_TTL,
        )
        .await;

        spawn_scan_scheduler(
            self.state.repository.clone(),
            self.state.connector_registry.clone(),
            self.state.scan_runner.clone(),
            self.scheduler_interval,
        )
        .await;

        let router = build_router(self.state);
        let bind_address = SocketAddr::new("0.0.0.0".parse::<IpAddr>().unwrap(), self.port);

        info!(%bind_address, "sentinel-orchestrator listening");

        let listener = tokio::net::TcpListener::bind(bind_address)
            .await
            .map_err(|e| OrchestratorError::Config(format!("failed to bind {bind_address}: {e}")))?;

        let grace_period = self.shutdown_grace_period;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal(grace_period))
            .await
            .map_err(|e| OrchestratorError::Config(format!("server error: {e}")))?;

        Ok(())
    }
}

/// Waits for SIGINT or SIGTERM, then logs the bounded grace period the
/// caller is about to observe before in-flight requests are dropped (spec
/// §6 "Exit conditions").
async fn shutdown_signal(grace_period: Duration) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(grace_period_secs = grace_period.as_secs(), "shutdown signal received, draining in-flight work");
}
