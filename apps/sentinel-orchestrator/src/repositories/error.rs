use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum RepositoryError {
    #[error("[ORCH_DB_CONNECTION_FAULT] {0}")]
    Connection(String),
    #[error("[ORCH_DB_QUERY_FAULT] {0}")]
    Query(String),
    #[error("[ORCH_DB_NOT_FOUND] {0}")]
    NotFound(String),
}

impl From<RepositoryError> for sentinel_core::CoreError {
    fn from(err: RepositoryError) -> Self {
        sentinel_core::CoreError::TransientFailure(err.to_string())
    }
}
