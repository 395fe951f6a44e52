use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::cloud::{
    CloudApiClient, CloudConnector, CloudInstance, CloudManagedService, CloudSecurityGroup,
    CloudSubnet, CloudVpc, CloudWorkload,
};
use crate::config::ConnectorConfig;
use crate::connector::Connector;
use crate::error::ConnectorError;
use crate::http::{authed_client, map_error_response};
use crate::retry::with_retry;
use crate::secret::SecretStore;

#[derive(Deserialize)]
struct InstanceDto {
    instance_id: String,
    internal_ip: String,
    hostname: Option<String>,
    #[serde(default)]
    os_family: Option<String>,
    network_id: Option<String>,
    subnetwork_id: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
}

#[derive(Deserialize)]
struct NetworkDto {
    network_id: String,
    #[serde(default)]
    range: Option<String>,
    #[serde(default)]
    auto_create_subnetworks: bool,
}

#[derive(Deserialize)]
struct SubnetworkDto {
    subnetwork_id: String,
    network_id: String,
    ip_cidr_range: String,
    #[serde(default)]
    private_ip_google_access: bool,
}

#[derive(Deserialize)]
struct FirewallRuleDto {
    rule_id: String,
    name: String,
    #[serde(default)]
    target_instance_ids: Vec<String>,
    #[serde(default)]
    allowed: serde_json::Value,
}

#[derive(Deserialize)]
struct CloudSqlInstanceDto {
    instance_name: String,
    database_version: String,
    port: u16,
    #[serde(default)]
    compute_instance_id: Option<String>,
    #[serde(default)]
    ip_configuration_public: bool,
}

#[derive(Deserialize)]
struct GcsBucketDto {
    bucket_name: String,
}

#[derive(Deserialize)]
struct GkeClusterDto {
    cluster_name: String,
}

#[derive(Deserialize)]
struct CloudFunctionDto {
    function_name: String,
}

/// Talks to a GCP Compute/VPC/Cloud SQL-shaped REST facade.
pub struct ReqwestGcpApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ReqwestGcpApiClient {
    pub fn new(base_url: String, secret: &crate::secret::Secret) -> Result<Self, ConnectorError> {
        Ok(Self {
            http: authed_client(secret)?,
            base_url,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ConnectorError> {
        with_retry(|| async {
            let response = self
                .http
                .get(format!("{}{}", self.base_url, path))
                .send()
                .await
                .map_err(|e| ConnectorError::Transient(e.to_string()))?;
            if !response.status().is_success() {
                return Err(map_error_response(response).await);
            }
            response
                .json::<Vec<T>>()
                .await
                .map_err(|e| ConnectorError::Terminal(e.to_string()))
        })
        .await
    }
}

#[async_trait]
impl CloudApiClient for ReqwestGcpApiClient {
    async fn list_instances(&self, region: &str) -> Result<Vec<CloudInstance>, ConnectorError> {
        let dtos: Vec<InstanceDto> = self.get(&format!("/{region}/instances")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudInstance {
                id: d.instance_id,
                ip: d.internal_ip,
                hostname: d.hostname,
                os: d.os_family,
                vpc_id: d.network_id,
                subnet_id: d.subnetwork_id,
                tags: d.labels,
            })
            .collect())
    }

    async fn list_vpcs(&self, region: &str) -> Result<Vec<CloudVpc>, ConnectorError> {
        let dtos: Vec<NetworkDto> = self.get(&format!("/{region}/networks")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudVpc {
                id: d.network_id,
                cidr: d.range,
                is_public: d.auto_create_subnetworks,
            })
            .collect())
    }

    async fn list_subnets(&self, region: &str) -> Result<Vec<CloudSubnet>, ConnectorError> {
        let dtos: Vec<SubnetworkDto> = self.get(&format!("/{region}/subnetworks")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudSubnet {
                id: d.subnetwork_id,
                vpc_id: d.network_id,
                cidr: d.ip_cidr_range,
                is_public: !d.private_ip_google_access,
            })
            .collect())
    }

    async fn list_security_groups(
        &self,
        region: &str,
    ) -> Result<Vec<CloudSecurityGroup>, ConnectorError> {
        let dtos: Vec<FirewallRuleDto> = self.get(&format!("/{region}/firewalls")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudSecurityGroup {
                id: d.rule_id,
                name: d.name,
                attached_instance_ids: d.target_instance_ids,
                rules: d.allowed,
            })
            .collect())
    }

    async fn list_managed_services(
        &self,
        region: &str,
    ) -> Result<Vec<CloudManagedService>, ConnectorError> {
        let dtos: Vec<CloudSqlInstanceDto> = self.get(&format!("/{region}/sqlInstances")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudManagedService {
                id: d.instance_name.clone(),
                name: format!("{} ({})", d.instance_name, d.database_version),
                port: d.port,
                attached_instance_id: d.compute_instance_id,
                publicly_accessible: d.ip_configuration_public,
            })
            .collect())
    }

    async fn list_storage_buckets(&self, region: &str) -> Result<Vec<CloudWorkload>, ConnectorError> {
        let dtos: Vec<GcsBucketDto> = self.get(&format!("/{region}/buckets")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudWorkload {
                id: d.bucket_name.clone(),
                name: d.bucket_name,
                app_type: "object-storage-bucket",
            })
            .collect())
    }

    async fn list_container_clusters(
        &self,
        region: &str,
    ) -> Result<Vec<CloudWorkload>, ConnectorError> {
        let dtos: Vec<GkeClusterDto> = self.get(&format!("/{region}/gkeClusters")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudWorkload {
                id: d.cluster_name.clone(),
                name: d.cluster_name,
                app_type: "container-cluster",
            })
            .collect())
    }

    async fn list_serverless_functions(
        &self,
        region: &str,
    ) -> Result<Vec<CloudWorkload>, ConnectorError> {
        let dtos: Vec<CloudFunctionDto> = self.get(&format!("/{region}/cloudFunctions")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudWorkload {
                id: d.function_name.clone(),
                name: d.function_name,
                app_type: "serverless-function",
            })
            .collect())
    }
}

pub fn connector(
    config: ConnectorConfig,
    secret_store: Arc<dyn SecretStore>,
) -> Result<impl Connector, ConnectorError> {
    let secret = secret_store.resolve(&config.credential_ref)?;
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| "https://gcp-gateway.internal".to_string());
    let client = ReqwestGcpApiClient::new(base_url, &secret)?;
    Ok(CloudConnector::new("gcp", config, Arc::new(client)))
}
