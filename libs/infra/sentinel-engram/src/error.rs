use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngramError {
    #[error("[ENGRAM_STORE_FAULT] object store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("[ENGRAM_INDEX_FAULT] session index error: {0}")]
    IndexFault(String),

    #[error("[ENGRAM_SERIALIZE_FAULT] canonical serialization failed: {0}")]
    SerializeFault(String),

    #[error("[ENGRAM_INTEGRITY_FAULT] recomputed hash does not match recorded address for session {0}")]
    IntegrityViolation(String),

    #[error("[ENGRAM_NOT_FOUND] session {0} not found")]
    NotFound(String),

    #[error("[ENGRAM_OVERFLOW] in-memory buffer exceeded bound for session {0}")]
    BufferOverflow(String),
}

impl From<EngramError> for sentinel_core::CoreError {
    fn from(value: EngramError) -> Self {
        sentinel_core::CoreError::EngramStoreUnavailable(value.to_string())
    }
}
