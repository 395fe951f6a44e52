use std::collections::HashMap;
use std::sync::Arc;

use sentinel_connectors::Connector;

/// Maps a connector name (as stored in `connector_configs.connector_name`)
/// to the live `Connector` instance the scheduler and the control API
/// dispatch against. Populated once at startup from the concrete connectors
/// each tenant has configured.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        self.connectors.insert(connector.name().to_string(), connector);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use sentinel_connectors::{ConnectorError, SyncResult};
    use sentinel_core::TenantContext;
    use tokio_util::sync::CancellationToken;

    struct StubConnector;

    #[async_trait]
    impl Connector for StubConnector {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn configure(&self) -> Result<(), ConnectorError> {
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ConnectorError> {
            Ok(())
        }

        async fn discover(
            &self,
            _ctx: &TenantContext,
            _now: DateTime<Utc>,
            _cancel: &CancellationToken,
        ) -> Result<SyncResult, ConnectorError> {
            Ok(SyncResult::new())
        }
    }

    #[test]
    fn unregistered_name_returns_none() {
        let registry = ConnectorRegistry::new();
        assert!(registry.get("stub").is_none());
    }

    #[test]
    fn registered_connector_is_retrievable_by_name() {
        let mut registry = ConnectorRegistry::new();
        registry.register(Arc::new(StubConnector));
        assert!(registry.get("stub").is_some());
        assert!(registry.get("other").is_none());
    }
}
