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
struct VmDto {
    vm_id: String,
    private_ip_address: String,
    computer_name: Option<String>,
    os_type: Option<String>,
    vnet_id: Option<String>,
    subnet_id: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct VnetDto {
    vnet_id: String,
    address_space: Option<String>,
    #[serde(default)]
    has_public_ip_prefix: bool,
}

#[derive(Deserialize)]
struct SubnetDto {
    subnet_id: String,
    vnet_id: String,
    address_prefix: String,
    #[serde(default)]
    default_outbound_access: bool,
}

#[derive(Deserialize)]
struct NsgDto {
    nsg_id: String,
    name: String,
    #[serde(default)]
    attached_vm_ids: Vec<String>,
    #[serde(default)]
    security_rules: serde_json::Value,
}

#[derive(Deserialize)]
struct SqlDatabaseDto {
    database_id: String,
    name: String,
    port: u16,
    #[serde(default)]
    hosting_vm_id: Option<String>,
    #[serde(default)]
    public_network_access_enabled: bool,
}

#[derive(Deserialize)]
struct StorageAccountDto {
    account_name: String,
}

#[derive(Deserialize)]
struct AksClusterDto {
    cluster_name: String,
}

#[derive(Deserialize)]
struct FunctionAppDto {
    function_app_name: String,
}

/// Talks to an Azure Resource Manager-shaped REST facade (VMs, VNets,
/// subnets, NSGs, SQL databases).
pub struct ReqwestAzureApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ReqwestAzureApiClient {
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
impl CloudApiClient for ReqwestAzureApiClient {
    async fn list_instances(&self, region: &str) -> Result<Vec<CloudInstance>, ConnectorError> {
        let dtos: Vec<VmDto> = self.get(&format!("/{region}/virtualMachines")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudInstance {
                id: d.vm_id,
                ip: d.private_ip_address,
                hostname: d.computer_name,
                os: d.os_type,
                vpc_id: d.vnet_id,
                subnet_id: d.subnet_id,
                tags: d.tags,
            })
            .collect())
    }

    async fn list_vpcs(&self, region: &str) -> Result<Vec<CloudVpc>, ConnectorError> {
        let dtos: Vec<VnetDto> = self.get(&format!("/{region}/virtualNetworks")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudVpc {
                id: d.vnet_id,
                cidr: d.address_space,
                is_public: d.has_public_ip_prefix,
            })
            .collect())
    }

    async fn list_subnets(&self, region: &str) -> Result<Vec<CloudSubnet>, ConnectorError> {
        let dtos: Vec<SubnetDto> = self.get(&format!("/{region}/subnets")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudSubnet {
                id: d.subnet_id,
                vpc_id: d.vnet_id,
                cidr: d.address_prefix,
                is_public: d.default_outbound_access,
            })
            .collect())
    }

    async fn list_security_groups(
        &self,
        region: &str,
    ) -> Result<Vec<CloudSecurityGroup>, ConnectorError> {
        let dtos: Vec<NsgDto> = self
            .get(&format!("/{region}/networkSecurityGroups"))
            .await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudSecurityGroup {
                id: d.nsg_id,
                name: d.name,
                attached_instance_ids: d.attached_vm_ids,
                rules: d.security_rules,
            })
            .collect())
    }

    async fn list_managed_services(
        &self,
        region: &str,
    ) -> Result<Vec<CloudManagedService>, ConnectorError> {
        let dtos: Vec<SqlDatabaseDto> = self.get(&format!("/{region}/sqlDatabases")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudManagedService {
                id: d.database_id,
                name: d.name,
                port: d.port,
                attached_instance_id: d.hosting_vm_id,
                publicly_accessible: d.public_network_access_enabled,
            })
            .collect())
    }

    async fn list_storage_buckets(&self, region: &str) -> Result<Vec<CloudWorkload>, ConnectorError> {
        let dtos: Vec<StorageAccountDto> = self.get(&format!("/{region}/storageAccounts")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudWorkload {
                id: d.account_name.clone(),
                name: d.account_name,
                app_type: "object-storage-bucket",
            })
            .collect())
    }

    async fn list_container_clusters(
        &self,
        region: &str,
    ) -> Result<Vec<CloudWorkload>, ConnectorError> {
        let dtos: Vec<AksClusterDto> = self.get(&format!("/{region}/aksClusters")).await?;
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
        let dtos: Vec<FunctionAppDto> = self.get(&format!("/{region}/functionApps")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudWorkload {
                id: d.function_app_name.clone(),
                name: d.function_app_name,
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
        .unwrap_or_else(|| "https://azure-gateway.internal".to_string());
    let client = ReqwestAzureApiClient::new(base_url, &secret)?;
    Ok(CloudConnector::new("azure", config, Arc::new(client)))
}
