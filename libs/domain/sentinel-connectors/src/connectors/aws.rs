use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use sentinel_core::IdentitySource;

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
    private_ip: String,
    public_dns: Option<String>,
    platform: Option<String>,
    vpc_id: Option<String>,
    subnet_id: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct VpcDto {
    vpc_id: String,
    cidr_block: Option<String>,
    #[serde(default)]
    internet_gateway_attached: bool,
}

#[derive(Deserialize)]
struct SubnetDto {
    subnet_id: String,
    vpc_id: String,
    cidr_block: String,
    #[serde(default)]
    map_public_ip_on_launch: bool,
}

#[derive(Deserialize)]
struct SecurityGroupDto {
    group_id: String,
    group_name: String,
    #[serde(default)]
    attached_instance_ids: Vec<String>,
    #[serde(default)]
    ip_permissions: serde_json::Value,
}

#[derive(Deserialize)]
struct RdsInstanceDto {
    db_instance_identifier: String,
    engine: String,
    port: u16,
    #[serde(default)]
    ec2_instance_id: Option<String>,
    #[serde(default)]
    publicly_accessible: bool,
}

#[derive(Deserialize)]
struct S3BucketDto {
    bucket_name: String,
}

#[derive(Deserialize)]
struct EksClusterDto {
    cluster_name: String,
}

#[derive(Deserialize)]
struct LambdaFunctionDto {
    function_name: String,
}

/// Talks to an EC2/VPC/RDS-shaped REST facade. The exact wire shape is
/// whatever the deployment's AWS ingestion gateway exposes; this client only
/// assumes a conventional `GET /{region}/...` resource layout.
pub struct ReqwestAwsApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ReqwestAwsApiClient {
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
impl CloudApiClient for ReqwestAwsApiClient {
    async fn list_instances(&self, region: &str) -> Result<Vec<CloudInstance>, ConnectorError> {
        let dtos: Vec<InstanceDto> = self.get(&format!("/{region}/instances")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudInstance {
                id: d.instance_id,
                ip: d.private_ip,
                hostname: d.public_dns,
                os: d.platform,
                vpc_id: d.vpc_id,
                subnet_id: d.subnet_id,
                tags: d.tags,
            })
            .collect())
    }

    async fn list_vpcs(&self, region: &str) -> Result<Vec<CloudVpc>, ConnectorError> {
        let dtos: Vec<VpcDto> = self.get(&format!("/{region}/vpcs")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudVpc {
                id: d.vpc_id,
                cidr: d.cidr_block,
                is_public: d.internet_gateway_attached,
            })
            .collect())
    }

    async fn list_subnets(&self, region: &str) -> Result<Vec<CloudSubnet>, ConnectorError> {
        let dtos: Vec<SubnetDto> = self.get(&format!("/{region}/subnets")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudSubnet {
                id: d.subnet_id,
                vpc_id: d.vpc_id,
                cidr: d.cidr_block,
                is_public: d.map_public_ip_on_launch,
            })
            .collect())
    }

    async fn list_security_groups(
        &self,
        region: &str,
    ) -> Result<Vec<CloudSecurityGroup>, ConnectorError> {
        let dtos: Vec<SecurityGroupDto> = self.get(&format!("/{region}/security-groups")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudSecurityGroup {
                id: d.group_id,
                name: d.group_name,
                attached_instance_ids: d.attached_instance_ids,
                rules: d.ip_permissions,
            })
            .collect())
    }

    async fn list_managed_services(
        &self,
        region: &str,
    ) -> Result<Vec<CloudManagedService>, ConnectorError> {
        let dtos: Vec<RdsInstanceDto> = self.get(&format!("/{region}/rds-instances")).await?;
        Ok(dtos
            .into_iter()
            .map(|d| CloudManagedService {
                id: d.db_instance_identifier.clone(),
                name: format!("{} ({})", d.db_instance_identifier, d.engine),
                port: d.port,
                attached_instance_id: d.ec2_instance_id,
                publicly_accessible: d.publicly_accessible,
            })
            .collect())
    }

    async fn list_storage_buckets(&self, region: &str) -> Result<Vec<CloudWorkload>, ConnectorError> {
        let dtos: Vec<S3BucketDto> = self.get(&format!("/{region}/s3-buckets")).await?;
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
        let dtos: Vec<EksClusterDto> = self.get(&format!("/{region}/eks-clusters")).await?;
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
        let dtos: Vec<LambdaFunctionDto> = self.get(&format!("/{region}/lambda-functions")).await?;
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

/// `IdentitySource::AwsIam` is reserved for a future IAM-users-and-roles
/// connector; this module covers compute/network/managed-service discovery
/// only (spec scope: cloud resource enumeration, not IAM principals).
#[allow(dead_code)]
const _AWS_IDENTITY_SOURCE: IdentitySource = IdentitySource::AwsIam;

pub fn connector(
    config: ConnectorConfig,
    secret_store: Arc<dyn SecretStore>,
) -> Result<impl Connector, ConnectorError> {
    let secret = secret_store.resolve(&config.credential_ref)?;
    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| "https://aws-gateway.internal".to_string());
    let client = ReqwestAwsApiClient::new(base_url, &secret)?;
    Ok(CloudConnector::new("aws", config, Arc::new(client)))
}
