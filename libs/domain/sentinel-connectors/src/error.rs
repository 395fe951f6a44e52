use thiserror::Error;

/// Fault taxonomy for connector execution. Bracketed codes mirror the
/// convention used across the other infra crates so operators can grep logs
/// by prefix regardless of which connector emitted them.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("[CONNECTOR_CONFIG_FAULT] {0}")]
    Config(String),

    #[error("[CONNECTOR_CREDENTIAL_FAULT] {0}")]
    Credential(String),

    #[error("[CONNECTOR_TRANSIENT_FAULT] {0}")]
    Transient(String),

    #[error("[CONNECTOR_RATE_LIMITED] retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("[CONNECTOR_TERMINAL_FAULT] {0}")]
    Terminal(String),

    #[error("[CONNECTOR_HEALTH_FAULT] {0}")]
    HealthCheckFailed(String),
}

impl ConnectorError {
    /// Whether a retry loop should attempt this call again. Rate limits and
    /// transient faults are retryable; everything else (bad config, expired
    /// credentials, a 4xx that isn't a 429) is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectorError::Transient(_) | ConnectorError::RateLimited { .. }
        )
    }
}

impl From<ConnectorError> for sentinel_core::CoreError {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::Config(msg) => sentinel_core::CoreError::ConfigError(msg),
            ConnectorError::Credential(msg) => sentinel_core::CoreError::CredentialError(msg),
            ConnectorError::Transient(msg) => sentinel_core::CoreError::TransientFailure(msg),
            ConnectorError::RateLimited { retry_after_secs } => {
                sentinel_core::CoreError::TransientFailure(format!(
                    "rate limited, retry after {retry_after_secs}s"
                ))
            }
            ConnectorError::Terminal(msg) => sentinel_core::CoreError::ConfigError(msg),
            ConnectorError::HealthCheckFailed(msg) => {
                sentinel_core::CoreError::TransientFailure(msg)
            }
        }
    }
}
