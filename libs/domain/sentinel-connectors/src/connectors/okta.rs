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
struct OktaUserDto {
    id: String,
    login: String,
    email: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    is_service_app: bool,
    #[serde(default)]
    mfa_factors_enrolled: u32,
    #[serde(default)]
    group_ids: Vec<String>,
}

#[derive(Deserialize)]
struct OktaGroupDto {
    id: String,
    profile_name: String,
}

#[derive(Deserialize)]
struct OktaRoleDto {
    id: String,
    label: String,
    #[serde(default)]
    member_ids: Vec<String>,
}

/// Talks to an Okta-shaped REST facade (`/users`, `/groups`,
/// `/adminRoles`).
pub struct ReqwestOktaApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ReqwestOktaApiClient {
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
impl IdentityApiClient for ReqwestOktaApiClient {
    async fn list_users(&self) -> Result<Vec<IdentityUser>, ConnectorError> {
        let dtos: Vec<OktaUserDto> = self.get("/users").await?;
        Ok(dtos
            .into_iter()
            .map(|d| IdentityUser {
                id: d.id,
                username: d.login,
                email: d.email,
                is_service_account: d.is_service_app,
                enabled: d.status == "ACTIVE",
                mfa_enabled: Some(d.mfa_factors_enrolled > 0),
                group_ids: d.group_ids,
            })
            .collect())
    }

    async fn list_groups(&self) -> Result<Vec<IdentityGroup>, ConnectorError> {
        let dtos: Vec<OktaGroupDto> = self.get("/groups").await?;
        Ok(dtos
            .into_iter()
            .map(|d| IdentityGroup {
                id: d.id,
                name: d.profile_name,
            })
            .collect())
    }

    async fn list_roles(&self) -> Result<Vec<IdentityRole>, ConnectorError> {
        let dtos: Vec<OktaRoleDto> = self.get("/adminRoles").await?;
        Ok(dtos
            .into_iter()
            .map(|d| IdentityRole {
                id: d.id,
                name: d.label,
                assigned_user_ids: d.member_ids,
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
        .unwrap_or_else(|| "https://example.okta.com/api/v1".to_string());
    let client = ReqwestOktaApiClient::new(base_url, &secret)?;
    Ok(IdentityConnector::new(
        "okta",
        IdentitySource::Okta,
        config,
        Arc::new(client),
    ))
}
