use std::path::PathBuf;

use async_trait::async_trait;
use tracing::instrument;

use crate::error::EngramError;

/// The append-only, content-addressed object surface. A session is written
/// once, under its content address, and never mutated afterward — there is
/// deliberately no `delete`/`update` method on this trait.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, tenant_id: &str, address: &str, bytes: &[u8]) -> Result<(), EngramError>;
    async fn get(&self, tenant_id: &str, address: &str) -> Result<Vec<u8>, EngramError>;
}

/// Filesystem-backed object store, one subdirectory per tenant, keyed by
/// content address. This is the default for local runs and tests; a
/// production deployment can substitute a different `ObjectStore`
/// implementation (e.g. object storage) without touching session capture.
pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, tenant_id: &str, address: &str) -> PathBuf {
        self.root.join(tenant_id).join(address)
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    #[instrument(skip(self, bytes), fields(tenant_id, address, bytes = bytes.len()))]
    async fn put(&self, tenant_id: &str, address: &str, bytes: &[u8]) -> Result<(), EngramError> {
        let dir = self.root.join(tenant_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| EngramError::StoreUnavailable(e.to_string()))?;

        let path = self.path_for(tenant_id, address);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            // Content-addressed: an object already at this address is byte
            // identical by construction, so writing it again is a no-op.
            return Ok(());
        }

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| EngramError::StoreUnavailable(e.to_string()))
    }

    #[instrument(skip(self))]
    async fn get(&self, tenant_id: &str, address: &str) -> Result<Vec<u8>, EngramError> {
        let path = self.path_for(tenant_id, address);
        tokio::fs::read(&path)
            .await
            .map_err(|_| EngramError::NotFound(address.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_bytes_by_address() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemObjectStore::new(dir.path());
        store.put("t1", "abc123", b"hello").await.unwrap();
        let read = store.get("t1", "abc123").await.unwrap();
        assert_eq!(read, b"hello");
    }

    #[tokio::test]
    async fn get_missing_address_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemObjectStore::new(dir.path());
        let err = store.get("t1", "missing").await.unwrap_err();
        assert!(matches!(err, EngramError::NotFound(_)));
    }
}
