use thiserror::Error;

use sentinel_connectors::ConnectorError;
use sentinel_core::CoreError;
use sentinel_engram::EngramError;
use sentinel_graph::GraphError;
use sentinel_intel::IntelError;

use crate::repositories::RepositoryError;

/// Top-level error for the orchestrator app. Every layer below funnels its
/// own error type through here rather than the app reaching into layer
/// errors directly at call sites.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("credential error: {0}")]
    Credential(String),
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Engram(#[from] EngramError),
    #[error(transparent)]
    Intel(#[from] IntelError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("a scan is already running for this tenant/connector")]
    AlreadyRunning,
    #[error("scan cancelled")]
    Cancelled,
    #[error("scan {0} not found")]
    ScanNotFound(String),
    #[error("unknown connector {0}")]
    UnknownConnector(String),
}

impl From<OrchestratorError> for CoreError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::AlreadyRunning => CoreError::AlreadyRunning,
            OrchestratorError::Cancelled => CoreError::Cancelled,
            OrchestratorError::Config(msg) => CoreError::ConfigError(msg),
            OrchestratorError::Credential(msg) => CoreError::CredentialError(msg),
            other => CoreError::TransientFailure(other.to_string()),
        }
    }
}
