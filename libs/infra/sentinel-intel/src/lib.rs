//! Vulnerability enrichment: KEV membership, EPSS likelihood, NVD metadata,
//! the (name, version) -> CPE mapping table, and the orchestrator that joins
//! all three per CVE before writing `Vulnerability` nodes into the graph.

pub mod cpe;
pub mod epss;
pub mod error;
pub mod kev;
pub mod nvd;
pub mod orchestrator;

pub use cpe::CpeMapping;
pub use epss::{EpssClient, EpssSource, ReqwestEpssSource};
pub use error::IntelError;
pub use kev::{KevCache, KevCatalogEntry, KevMembership, KevSource, ReqwestKevSource};
pub use nvd::{NvdCveMetadata, NvdClient, NvdRateRegime, NvdSource, ReqwestNvdSource};
pub use orchestrator::{EnrichmentOrchestrator, EnrichmentSummary};
