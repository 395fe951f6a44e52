use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use sentinel_core::{
    Application, Criticality, EdgeAttrs, EdgeType, Host, Node, NodeKind, Policy, PolicyType,
    Protocol, Service, ServiceState, Subnet, TenantContext, Vpc,
};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::ConnectorConfig;
use crate::connector::{make_edge, Connector};
use crate::error::ConnectorError;
use crate::sync_result::{SyncResult, SyncStatus};

/// One compute instance as a cloud provider's API describes it, before it's
/// normalized into a [`Host`].
#[derive(Debug, Clone)]
pub struct CloudInstance {
    pub id: String,
    pub ip: String,
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CloudVpc {
    pub id: String,
    pub cidr: Option<String>,
    pub is_public: bool,
}

#[derive(Debug, Clone)]
pub struct CloudSubnet {
    pub id: String,
    pub vpc_id: String,
    pub cidr: String,
    pub is_public: bool,
}

#[derive(Debug, Clone)]
pub struct CloudSecurityGroup {
    pub id: String,
    pub name: String,
    pub attached_instance_ids: Vec<String>,
    pub rules: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CloudManagedService {
    pub id: String,
    pub name: String,
    pub port: u16,
    pub attached_instance_id: Option<String>,
    pub publicly_accessible: bool,
}

/// One object-storage bucket, container cluster, or serverless function —
/// each normalizes to an [`Application`] node (spec: "object-storage
/// buckets, container clusters, and serverless functions are Applications").
#[derive(Debug, Clone)]
pub struct CloudWorkload {
    pub id: String,
    pub name: String,
    pub app_type: &'static str,
}

/// What a cloud provider's API surface needs to expose for discovery. Each
/// provider module (`aws`, `azure`, `gcp`) supplies its own implementation;
/// [`CloudConnector`] only knows how to normalize whatever comes back.
#[async_trait]
pub trait CloudApiClient: Send + Sync {
    async fn list_instances(&self, region: &str) -> Result<Vec<CloudInstance>, ConnectorError>;
    async fn list_vpcs(&self, region: &str) -> Result<Vec<CloudVpc>, ConnectorError>;
    async fn list_subnets(&self, region: &str) -> Result<Vec<CloudSubnet>, ConnectorError>;
    async fn list_security_groups(
        &self,
        region: &str,
    ) -> Result<Vec<CloudSecurityGroup>, ConnectorError>;
    async fn list_managed_services(
        &self,
        region: &str,
    ) -> Result<Vec<CloudManagedService>, ConnectorError>;
    async fn list_storage_buckets(&self, region: &str) -> Result<Vec<CloudWorkload>, ConnectorError>;
    async fn list_container_clusters(
        &self,
        region: &str,
    ) -> Result<Vec<CloudWorkload>, ConnectorError>;
    async fn list_serverless_functions(
        &self,
        region: &str,
    ) -> Result<Vec<CloudWorkload>, ConnectorError>;
}

/// Shared discovery engine for every cloud provider. `provider` tags the
/// `Host.provider` field and becomes part of each node's natural key, so the
/// same instance id from two providers never collides.
pub struct CloudConnector {
    provider: &'static str,
    config: ConnectorConfig,
    client: Arc<dyn CloudApiClient>,
}

impl CloudConnector {
    pub fn new(provider: &'static str, config: ConnectorConfig, client: Arc<dyn CloudApiClient>) -> Self {
        Self {
            provider,
            config,
            client,
        }
    }

    /// Pushes `node` onto `result` only if `self.config` allows its kind
    /// (spec: per-resource-kind include/exclude lists). Excluded nodes are
    /// neither counted toward `resources_seen` nor written to the graph,
    /// but are still usable as edge endpoints by the caller before the
    /// filter check if needed.
    fn push_allowed(&self, result: &mut SyncResult, node: Node) {
        if self.config.allows_kind(node.kind.label()) {
            result.push_node(node);
        }
    }

    async fn discover_region(
        &self,
        ctx: &TenantContext,
        region: &str,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> SyncResult {
        let mut result = SyncResult::new();

        let instances = match self.client.list_instances(region).await {
            Ok(instances) => instances,
            Err(err) => {
                warn!(region, error = %err, "failed to list instances");
                result.record_failure();
                result.status = SyncStatus::Partial;
                return result;
            }
        };
        let mut host_ids = std::collections::HashMap::new();
        for instance in &instances {
            let host = NodeKind::Host(Host {
                ip: instance.ip.clone(),
                hostname: instance.hostname.clone(),
                os: instance.os.clone(),
                mac: None,
                provider: Some(self.provider.to_string()),
                instance_id: Some(instance.id.clone()),
                region: Some(region.to_string()),
                criticality: Criticality::Medium,
                tags: instance.tags.clone(),
            });
            let node = Node::new(ctx.tenant_id().clone(), host, now);
            host_ids.insert(instance.id.clone(), node.id.clone());
            self.push_allowed(&mut result, node);
        }

        if cancel.is_cancelled() {
            result.status = SyncStatus::Cancelled;
            return result;
        }

        let mut subnet_ids = std::collections::HashMap::new();
        if let Ok(vpcs) = self.client.list_vpcs(region).await {
            let mut vpc_ids = std::collections::HashMap::new();
            for vpc in &vpcs {
                let kind = NodeKind::Vpc(Vpc {
                    source_id: vpc.id.clone(),
                    cidr: vpc.cidr.clone(),
                    region: Some(region.to_string()),
                    is_public: vpc.is_public,
                });
                let node = Node::new(ctx.tenant_id().clone(), kind, now);
                vpc_ids.insert(vpc.id.clone(), node.id.clone());
                self.push_allowed(&mut result, node);
            }
            if let Ok(subnets) = self.client.list_subnets(region).await {
                for subnet in &subnets {
                    let kind = NodeKind::Subnet(Subnet {
                        cidr: subnet.cidr.clone(),
                        region: Some(region.to_string()),
                        is_public: subnet.is_public,
                    });
                    let node = Node::new(ctx.tenant_id().clone(), kind, now);
                    subnet_ids.insert(subnet.id.clone(), node.id.clone());
                    if let Some(vpc_node_id) = vpc_ids.get(&subnet.vpc_id) {
                        result.push_edge(make_edge(
                            ctx,
                            EdgeType::BelongsToVpc,
                            node.id.clone(),
                            vpc_node_id.clone(),
                            EdgeAttrs::default(),
                            now,
                        ));
                    }
                    self.push_allowed(&mut result, node);
                }
            }
        } else {
            result.record_failure();
            result.status = SyncStatus::Partial;
        }

        if cancel.is_cancelled() {
            result.status = SyncStatus::Cancelled;
            return result;
        }

        for instance in &instances {
            if let (Some(host_id), Some(subnet_id)) = (
                host_ids.get(&instance.id),
                instance
                    .subnet_id
                    .as_ref()
                    .and_then(|id| subnet_ids.get(id)),
            ) {
                result.push_edge(make_edge(
                    ctx,
                    EdgeType::BelongsToSubnet,
                    host_id.clone(),
                    subnet_id.clone(),
                    EdgeAttrs::default(),
                    now,
                ));
            }
        }

        match self.client.list_security_groups(region).await {
            Ok(groups) => {
                for group in groups {
                    let kind = NodeKind::Policy(Policy {
                        policy_type: PolicyType::SecurityGroup,
                        source_id: group.id.clone(),
                        name: group.name.clone(),
                        rules: group.rules.clone(),
                    });
                    let node = Node::new(ctx.tenant_id().clone(), kind, now);
                    for instance_id in &group.attached_instance_ids {
                        if let Some(host_id) = host_ids.get(instance_id) {
                            result.push_edge(make_edge(
                                ctx,
                                EdgeType::HasAccess,
                                node.id.clone(),
                                host_id.clone(),
                                EdgeAttrs::default(),
                                now,
                            ));
                        }
                    }
                    self.push_allowed(&mut result, node);
                }
            }
            Err(err) => {
                warn!(region, error = %err, "failed to list security groups");
                result.record_failure();
                result.status = SyncStatus::Partial;
            }
        }

        if cancel.is_cancelled() {
            result.status = SyncStatus::Cancelled;
            return result;
        }

        match self.client.list_managed_services(region).await {
            Ok(services) => {
                for service in services {
                    let host_natural_key = service
                        .attached_instance_id
                        .as_ref()
                        .and_then(|id| host_ids.get(id))
                        .cloned()
                        .unwrap_or_default();
                    let kind = NodeKind::Service(Service {
                        name: service.name.clone(),
                        version: None,
                        port: service.port,
                        protocol: Protocol::Tcp,
                        state: ServiceState::Running,
                        banner: None,
                        host_natural_key: host_natural_key.clone(),
                    });
                    let node = Node::new(ctx.tenant_id().clone(), kind, now);
                    if !host_natural_key.is_empty() {
                        result.push_edge(make_edge(
                            ctx,
                            EdgeType::RunsOn,
                            node.id.clone(),
                            host_natural_key.clone(),
                            EdgeAttrs::default(),
                            now,
                        ));
                        if service.publicly_accessible {
                            result.push_edge(make_edge(
                                ctx,
                                EdgeType::Exposes,
                                host_natural_key,
                                node.id.clone(),
                                EdgeAttrs {
                                    port: Some(service.port),
                                    ..Default::default()
                                },
                                now,
                            ));
                        }
                    }
                    self.push_allowed(&mut result, node);
                }
            }
            Err(err) => {
                warn!(region, error = %err, "failed to list managed services");
                result.record_failure();
                result.status = SyncStatus::Partial;
            }
        }

        if cancel.is_cancelled() {
            result.status = SyncStatus::Cancelled;
            return result;
        }

        self.discover_workloads(ctx, region, now, &mut result).await;

        result
    }

    /// Object-storage buckets, container clusters, and serverless functions
    /// all normalize to `Application` nodes (spec: cloud resource kinds
    /// without a more specific node type).
    async fn discover_workloads(
        &self,
        ctx: &TenantContext,
        region: &str,
        now: DateTime<Utc>,
        result: &mut SyncResult,
    ) {
        match self.client.list_storage_buckets(region).await {
            Ok(buckets) => {
                for bucket in buckets {
                    self.push_workload(ctx, result, bucket, now);
                }
            }
            Err(err) => {
                warn!(region, error = %err, "failed to list storage buckets");
                result.record_failure();
                result.status = SyncStatus::Partial;
            }
        }

        match self.client.list_container_clusters(region).await {
            Ok(clusters) => {
                for cluster in clusters {
                    self.push_workload(ctx, result, cluster, now);
                }
            }
            Err(err) => {
                warn!(region, error = %err, "failed to list container clusters");
                result.record_failure();
                result.status = SyncStatus::Partial;
            }
        }

        match self.client.list_serverless_functions(region).await {
            Ok(functions) => {
                for function in functions {
                    self.push_workload(ctx, result, function, now);
                }
            }
            Err(err) => {
                warn!(region, error = %err, "failed to list serverless functions");
                result.record_failure();
                result.status = SyncStatus::Partial;
            }
        }
    }

    fn push_workload(&self, ctx: &TenantContext, result: &mut SyncResult, workload: CloudWorkload, now: DateTime<Utc>) {
        let kind = NodeKind::Application(Application {
            name: workload.name,
            app_type: workload.app_type.to_string(),
            provider: Some(self.provider.to_string()),
            source_id: workload.id,
        });
        let node = Node::new(ctx.tenant_id().clone(), kind, now);
        self.push_allowed(result, node);
    }
}

#[async_trait]
impl Connector for CloudConnector {
    fn name(&self) -> &'static str {
        self.provider
    }

    async fn configure(&self) -> Result<(), ConnectorError> {
        if self.config.regions.is_empty() {
            return Err(ConnectorError::Config(
                "at least one region must be configured".into(),
            ));
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ConnectorError> {
        let region = self
            .config
            .regions
            .first()
            .ok_or_else(|| ConnectorError::Config("no region to health-check against".into()))?;
        self.client.list_vpcs(region).await.map(|_| ())
    }

    async fn discover(
        &self,
        ctx: &TenantContext,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<SyncResult, ConnectorError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallelism));
        let regions = self.config.regions.clone();
        let results: Vec<SyncResult> = stream::iter(regions)
            .map(|region| {
                let semaphore = semaphore.clone();
                async move {
                    if cancel.is_cancelled() {
                        let mut result = SyncResult::new();
                        result.status = SyncStatus::Cancelled;
                        return result;
                    }
                    let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                    self.discover_region(ctx, &region, now, cancel).await
                }
            })
            .buffer_unordered(self.config.max_parallelism)
            .collect()
            .await;

        let mut merged = SyncResult::new();
        for partial in results {
            merged.merge(partial);
        }
        Ok(merged)
    }
}
