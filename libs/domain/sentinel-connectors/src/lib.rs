//! Uniform connector lifecycle (`configure -> health_check -> discover`)
//! plus the concrete cloud and identity-provider connectors. Every external
//! call goes through a small trait (`CloudApiClient`, `IdentityApiClient`)
//! so discovery logic is testable against deterministic doubles without a
//! live source.

pub mod cloud;
pub mod config;
pub mod connector;
pub mod connectors;
pub mod error;
pub mod framework;
pub mod http;
pub mod identity;
pub mod rate_limit;
pub mod retry;
pub mod secret;
pub mod sync_result;

pub use cloud::{CloudApiClient, CloudConnector, CloudWorkload};
pub use config::ConnectorConfig;
pub use connector::{make_edge, Connector};
pub use error::ConnectorError;
pub use framework::run_connector;
pub use identity::{IdentityApiClient, IdentityConnector};
pub use rate_limit::RequestLimiter;
pub use secret::{CredentialRef, EnvSecretStore, InMemorySecretStore, Secret, SecretStore};
pub use sync_result::{SyncResult, SyncStatus};

#[cfg(test)]
mod integration_tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use sentinel_core::{TenantContext, TenantId};
    use tokio_util::sync::CancellationToken;

    use crate::cloud::{
        CloudApiClient, CloudConnector, CloudInstance, CloudManagedService, CloudSecurityGroup,
        CloudSubnet, CloudVpc, CloudWorkload,
    };
    use crate::config::ConnectorConfig;
    use crate::connector::Connector;
    use crate::error::ConnectorError;
    use crate::identity::{
        IdentityApiClient, IdentityConnector, IdentityGroup, IdentityRole, IdentityUser,
    };
    use crate::sync_result::SyncStatus;

    struct FakeCloudApi;

    #[async_trait]
    impl CloudApiClient for FakeCloudApi {
        async fn list_instances(&self, _region: &str) -> Result<Vec<CloudInstance>, ConnectorError> {
            Ok(vec![CloudInstance {
                id: "i-1".into(),
                ip: "10.0.1.5".into(),
                hostname: Some("web-1".into()),
                os: Some("linux".into()),
                vpc_id: Some("vpc-1".into()),
                subnet_id: Some("subnet-1".into()),
                tags: vec!["prod".into()],
            }])
        }

        async fn list_vpcs(&self, _region: &str) -> Result<Vec<CloudVpc>, ConnectorError> {
            Ok(vec![CloudVpc {
                id: "vpc-1".into(),
                cidr: Some("10.0.0.0/16".into()),
                is_public: false,
            }])
        }

        async fn list_subnets(&self, _region: &str) -> Result<Vec<CloudSubnet>, ConnectorError> {
            Ok(vec![CloudSubnet {
                id: "subnet-1".into(),
                vpc_id: "vpc-1".into(),
                cidr: "10.0.1.0/24".into(),
                is_public: true,
            }])
        }

        async fn list_security_groups(
            &self,
            _region: &str,
        ) -> Result<Vec<CloudSecurityGroup>, ConnectorError> {
            Ok(vec![CloudSecurityGroup {
                id: "sg-1".into(),
                name: "web-sg".into(),
                attached_instance_ids: vec!["i-1".into()],
                rules: serde_json::json!([]),
            }])
        }

        async fn list_managed_services(
            &self,
            _region: &str,
        ) -> Result<Vec<CloudManagedService>, ConnectorError> {
            Ok(vec![CloudManagedService {
                id: "db-1".into(),
                name: "prod-db".into(),
                port: 5432,
                attached_instance_id: Some("i-1".into()),
                publicly_accessible: true,
            }])
        }

        async fn list_storage_buckets(&self, _region: &str) -> Result<Vec<CloudWorkload>, ConnectorError> {
            Ok(vec![CloudWorkload {
                id: "bucket-1".into(),
                name: "bucket-1".into(),
                app_type: "object-storage-bucket",
            }])
        }

        async fn list_container_clusters(
            &self,
            _region: &str,
        ) -> Result<Vec<CloudWorkload>, ConnectorError> {
            Ok(vec![CloudWorkload {
                id: "cluster-1".into(),
                name: "cluster-1".into(),
                app_type: "container-cluster",
            }])
        }

        async fn list_serverless_functions(
            &self,
            _region: &str,
        ) -> Result<Vec<CloudWorkload>, ConnectorError> {
            Ok(vec![CloudWorkload {
                id: "fn-1".into(),
                name: "fn-1".into(),
                app_type: "serverless-function",
            }])
        }
    }

    #[tokio::test]
    async fn cloud_connector_normalizes_resources_and_links_edges() {
        let config = ConnectorConfig::new("aws-test").with_regions(vec!["us-east-1".into()]);
        let connector = CloudConnector::new("aws", config, Arc::new(FakeCloudApi));
        let ctx = TenantContext::new(TenantId::new("t1"));

        connector.configure().await.unwrap();
        connector.health_check().await.unwrap();
        let result = connector
            .discover(&ctx, Utc::now(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, SyncStatus::Success);
        // Host, Vpc, Subnet, Policy, Service, 3 workload Applications.
        assert_eq!(result.nodes.len(), 8);
        // BELONGS_TO_VPC, BELONGS_TO_SUBNET, HAS_ACCESS, RUNS_ON, EXPOSES.
        assert_eq!(result.edges.len(), 5);
    }

    #[tokio::test]
    async fn cloud_connector_honors_kind_exclude_list() {
        let config = ConnectorConfig::new("aws-test")
            .with_regions(vec!["us-east-1".into()])
            .with_exclude(vec!["Policy".to_string(), "Application".to_string()]);
        let connector = CloudConnector::new("aws", config, Arc::new(FakeCloudApi));
        let ctx = TenantContext::new(TenantId::new("t1"));

        let result = connector
            .discover(&ctx, Utc::now(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!result.nodes.iter().any(|n| n.kind.label() == "Policy"));
        assert!(!result.nodes.iter().any(|n| n.kind.label() == "Application"));
        // Host, Vpc, Subnet, Service survive.
        assert_eq!(result.nodes.len(), 4);
    }

    #[tokio::test]
    async fn cloud_connector_stops_early_when_already_cancelled() {
        let config = ConnectorConfig::new("aws-test").with_regions(vec!["us-east-1".into()]);
        let connector = CloudConnector::new("aws", config, Arc::new(FakeCloudApi));
        let ctx = TenantContext::new(TenantId::new("t1"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = connector.discover(&ctx, Utc::now(), &cancel).await.unwrap();
        assert_eq!(result.status, SyncStatus::Cancelled);
        assert!(result.nodes.is_empty());
    }

    struct FlakyCloudApi;

    #[async_trait]
    impl CloudApiClient for FlakyCloudApi {
        async fn list_instances(&self, _region: &str) -> Result<Vec<CloudInstance>, ConnectorError> {
            Ok(vec![])
        }
        async fn list_vpcs(&self, _region: &str) -> Result<Vec<CloudVpc>, ConnectorError> {
            Err(ConnectorError::Terminal("vpc api down".into()))
        }
        async fn list_subnets(&self, _region: &str) -> Result<Vec<CloudSubnet>, ConnectorError> {
            Ok(vec![])
        }
        async fn list_security_groups(
            &self,
            _region: &str,
        ) -> Result<Vec<CloudSecurityGroup>, ConnectorError> {
            Ok(vec![])
        }
        async fn list_managed_services(
            &self,
            _region: &str,
        ) -> Result<Vec<CloudManagedService>, ConnectorError> {
            Ok(vec![])
        }
        async fn list_storage_buckets(&self, _region: &str) -> Result<Vec<CloudWorkload>, ConnectorError> {
            Ok(vec![])
        }
        async fn list_container_clusters(
            &self,
            _region: &str,
        ) -> Result<Vec<CloudWorkload>, ConnectorError> {
            Ok(vec![])
        }
        async fn list_serverless_functions(
            &self,
            _region: &str,
        ) -> Result<Vec<CloudWorkload>, ConnectorError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn one_failing_sub_resource_downgrades_to_partial_without_aborting() {
        let config = ConnectorConfig::new("aws-test").with_regions(vec!["us-east-1".into()]);
        let connector = CloudConnector::new("aws", config, Arc::new(FlakyCloudApi));
        let ctx = TenantContext::new(TenantId::new("t1"));

        let result = connector
            .discover(&ctx, Utc::now(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.status, SyncStatus::Partial);
        assert_eq!(result.resources_failed, 1);
    }

    struct FakeIdentityApi;

    #[async_trait]
    impl IdentityApiClient for FakeIdentityApi {
        async fn list_users(&self) -> Result<Vec<IdentityUser>, ConnectorError> {
            Ok(vec![IdentityUser {
                id: "u-1".into(),
                username: "alice".into(),
                email: Some("alice@example.com".into()),
                is_service_account: false,
                enabled: true,
                mfa_enabled: Some(true),
                group_ids: vec!["g-1".into()],
            }])
        }

        async fn list_groups(&self) -> Result<Vec<IdentityGroup>, ConnectorError> {
            Ok(vec![IdentityGroup {
                id: "g-1".into(),
                name: "engineering".into(),
            }])
        }

        async fn list_roles(&self) -> Result<Vec<IdentityRole>, ConnectorError> {
            Ok(vec![IdentityRole {
                id: "r-1".into(),
                name: "admin".into(),
                assigned_user_ids: vec!["u-1".into()],
            }])
        }
    }

    #[tokio::test]
    async fn identity_connector_links_users_to_groups_and_roles() {
        let config = ConnectorConfig::new("entra-test");
        let connector = IdentityConnector::new(
            "entra_id",
            sentinel_core::IdentitySource::EntraId,
            config,
            Arc::new(FakeIdentityApi),
        );
        let ctx = TenantContext::new(TenantId::new("t1"));

        let result = connector
            .discover(&ctx, Utc::now(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.nodes.len(), 3); // Group, User, Role.
        assert_eq!(result.edges.len(), 2); // MEMBER_OF, HAS_ACCESS.
        assert_eq!(result.status, SyncStatus::Success);
    }
}
