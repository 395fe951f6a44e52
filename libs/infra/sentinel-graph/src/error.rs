use thiserror::Error;
use sentinel_core::CoreError;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("[GRAPH_CONN_FAULT] connection error: {0}")]
    Connection(String),

    #[error("[GRAPH_TENANT_FAULT] operation tenant {requested} does not match context tenant {context}")]
    TenantMismatch { context: String, requested: String },

    #[error("[GRAPH_ENDPOINT_FAULT] edge endpoint missing: {0}")]
    EndpointMissing(String),

    #[error("[GRAPH_SCHEMA_FAULT] backend constraint violation: {0}")]
    SchemaMismatch(String),

    #[error("[GRAPH_CONTENTION_FAULT] exhausted retries on backend contention: {0}")]
    ContentionExhausted(String),

    #[error("[GRAPH_QUERY_FAULT] query error: {0}")]
    Query(String),
}

impl From<GraphError> for CoreError {
    fn from(value: GraphError) -> Self {
        match value {
            GraphError::EndpointMissing(m) => CoreError::EndpointMissing(m),
            GraphError::SchemaMismatch(m) => CoreError::SchemaMismatch(m),
            other => CoreError::TransientFailure(other.to_string()),
        }
    }
}
