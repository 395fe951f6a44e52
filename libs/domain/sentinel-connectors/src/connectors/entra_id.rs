use std::sync::Arc;

use async_trait::async_trait;
use sentinel_core::IdentitySource;
use serde::Deserialize;

use crate::config::ConnectorConfig;
use crate::connector::Connector;
use crate::error::ConnectorError;
use crate::http::{authed_client, map_error_response};
use crate::identity::{IdentityApiClient, IdentityConnector, IdentityGroup, IdentityRole, IdentityUser};
use crate::retry::with_retry;
use crate::secret::SecretStore;

#[derive(Deserialize)]
struct GraphUserDto {
    id: String,
    user_principal_name: String,
    mail: Option<String>,
    #[serde(default)]
    account_enabled: bool,
    #[serde(default)]
    is_service_principal: bool,
    #[serde(default)]
    strong_auth_methods_registered: bool,
    #[serde(default)]
    member_of_group_ids: Vec<String>,
}

#[derive(Deserialize)]
struct GraphGroupDto {
    id: String,
    display_name: String,
}

#[derive(Deserialize)]
struct GraphRoleAssignmentDto {
    role_definition_id: String,
    role_name: String,
    #[serde(default)]
    principal_ids: Vec<String>,
}

/// Talks to a Microsoft Graph-shaped REST facade (`/users`, `/groups`,
/// `/roleAssignments`).
pub struct ReqwestEntraIdApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ReqwestEntraIdApiClient {
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
impl IdentityApiClient for ReqwestEntraIdApiClient {
    async fn list_users(&self) -> Result<Vec<IdentityUser>, ConnectorError> {
        let dtos: Vec<GraphUserDto> = self.get("/users").await?;
        Ok(dtos
            .into_iter()
            .map(|d| IdentityUser {
                id: d.id,
                username: d.user_principal_name,
                email: d.mail,
                is_service_account: d.is_service_principal,
                enabled: d.account_enabled,
                mfa_enabled: Some(d.strong_auth_methods_registered),
                group_ids: d.member_of_group_ids,
            })
            .collect())
    }

    async fn list_groups(&self) -> Result<Vec<IdentityGroup>, ConnectorError> {
        let dtos: Vec<GraphGroupDto> = self.get("/groups").await?;
        Ok(dtos
            .into_iter()
            .map(|d| IdentityGroup {
                id: d.id,
                name: d.display_name,
            })
            .collect())
    }

    async fn list_roles(&self) -> Result<Vec<IdentityRole>, ConnectorError> {
        let dtos: Vec<GraphRoleAssignmentDto> = self.get("/roleAssignments").await?;
        Ok(dtos
            .into_iter()
            .map(|d| IdentityRole {
                id: d.role_definition_id,
                name: d.role_name,
                assigned_user_ids: d.principal_ids,
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
        .unwrap_or_else(|| "https://graph.microsoft.com/v1.0".to_string());
    let client = ReqwestEntraIdApiClient::new(base_url, &secret)?;
    Ok(IdentityConnector::new(
        "entra_id",
        IdentitySource::EntraId,
        config,
        Arc::new(client),
    ))
}
