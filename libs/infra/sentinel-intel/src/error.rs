use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntelError {
    #[error("[INTEL_SOURCE_FAULT] {0}")]
    SourceUnavailable(String),

    #[error("[INTEL_RATE_LIMITED] retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("[INTEL_MAPPING_FAULT] {0}")]
    MappingFault(String),

    #[error("[INTEL_CONFIG_FAULT] {0}")]
    Config(String),

    #[error("[INTEL_GRAPH_FAULT] {0}")]
    Graph(#[from] sentinel_graph::GraphError),

    #[error("[INTEL_ENGRAM_FAULT] {0}")]
    Engram(#[from] sentinel_engram::EngramError),
}

impl From<IntelError> for sentinel_core::CoreError {
    fn from(err: IntelError) -> Self {
        let rendered = err.to_string();
        match err {
            IntelError::SourceUnavailable(msg) => sentinel_core::CoreError::TransientFailure(msg),
            IntelError::RateLimited { retry_after_secs } => {
                sentinel_core::CoreError::TransientFailure(format!(
                    "rate limited, retry after {retry_after_secs}s"
                ))
            }
            IntelError::MappingFault(msg) => sentinel_core::CoreError::ConfigError(msg),
            IntelError::Config(msg) => sentinel_core::CoreError::ConfigError(msg),
            IntelError::Graph(_) => sentinel_core::CoreError::TransientFailure(rendered),
            IntelError::Engram(_) => sentinel_core::CoreError::EngramStoreUnavailable(rendered),
        }
    }
}
