use thiserror::Error;

/// Shared error taxonomy (spec §7), realized here as the variants every
/// downstream crate's own error enum converts into or wraps. `sentinel-core`
/// itself only produces the first two — the rest are declared here so every
/// crate speaks the same vocabulary instead of inventing per-crate synonyms.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("malformed or missing configuration: {0}")]
    ConfigError(String),

    #[error("credential error: {0}")]
    CredentialError(String),

    #[error("transient failure: {0}")]
    TransientFailure(String),

    #[error("edge endpoint missing: {0}")]
    EndpointMissing(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("run already in progress for this tenant/connector")]
    AlreadyRunning,

    #[error("operation cancelled")]
    Cancelled,

    #[error("engram store unavailable: {0}")]
    EngramStoreUnavailable(String),
}
