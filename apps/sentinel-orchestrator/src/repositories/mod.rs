pub mod db;
pub mod error;
pub mod repository;

pub use db::OrchestratorDb;
pub use error::RepositoryError;
pub use repository::{
    AuditEntry, ConnectorConfigRecord, ControlPlaneRepository, ScanRecord, ScanStatusRecord,
    TenantRecord,
};
