use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::{
    EdgeAttrs, EdgeType, Group, IdentitySource, Node, NodeKind, Role, TenantContext, User, UserType,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::ConnectorConfig;
use crate::connector::{make_edge, Connector};
use crate::error::ConnectorError;
use crate::sync_result::{SyncResult, SyncStatus};

#[derive(Debug, Clone)]
pub struct IdentityUser {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub is_service_account: bool,
    pub enabled: bool,
    pub mfa_enabled: Option<bool>,
    pub group_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IdentityGroup {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct IdentityRole {
    pub id: String,
    pub name: String,
    pub assigned_user_ids: Vec<String>,
}

/// What an identity provider's API surface needs to expose. `entra_id` and
/// `okta` each supply their own implementation against this trait.
#[async_trait]
pub trait IdentityApiClient: Send + Sync {
    async fn list_users(&self) -> Result<Vec<IdentityUser>, ConnectorError>;
    async fn list_groups(&self) -> Result<Vec<IdentityGroup>, ConnectorError>;
    async fn list_roles(&self) -> Result<Vec<IdentityRole>, ConnectorError>;
}

/// Shared discovery engine for every identity provider. `source` tags
/// `User.source`/`Group.source`/`Role.source` and becomes part of each
/// node's natural key.
pub struct IdentityConnector {
    provider: &'static str,
    source: IdentitySource,
    config: ConnectorConfig,
    client: Arc<dyn IdentityApiClient>,
}

impl IdentityConnector {
    pub fn new(
        provider: &'static str,
        source: IdentitySource,
        config: ConnectorConfig,
        client: Arc<dyn IdentityApiClient>,
    ) -> Self {
        Self {
            provider,
            source,
            config,
            client,
        }
    }
}

#[async_trait]
impl Connector for IdentityConnector {
    fn name(&self) -> &'static str {
        self.provider
    }

    async fn configure(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ConnectorError> {
        self.client.list_groups().await.map(|_| ())
    }

    async fn discover(
        &self,
        ctx: &TenantContext,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<SyncResult, ConnectorError> {
        let _ = self.config.page_size;
        let mut result = SyncResult::new();

        let mut group_ids = HashMap::new();
        match self.client.list_groups().await {
            Ok(groups) => {
                for group in groups {
                    let kind = NodeKind::Group(Group {
                        source: self.source,
                        source_id: group.id.clone(),
                        name: group.name.clone(),
                    });
                    let node = Node::new(ctx.tenant_id().clone(), kind, now);
                    group_ids.insert(group.id.clone(), node.id.clone());
                    if self.config.allows_kind(node.kind.label()) {
                        result.push_node(node);
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to list groups");
                result.record_failure();
                result.status = SyncStatus::Partial;
            }
        }

        if cancel.is_cancelled() {
            result.status = SyncStatus::Cancelled;
            return Ok(result);
        }

        let mut user_ids = HashMap::new();
        match self.client.list_users().await {
            Ok(users) => {
                for user in &users {
                    let kind = NodeKind::User(User {
                        source: self.source,
                        source_id: user.id.clone(),
                        username: user.username.clone(),
                        email: user.email.clone(),
                        user_type: if user.is_service_account {
                            UserType::ServiceAccount
                        } else {
                            UserType::Human
                        },
                        enabled: user.enabled,
                        mfa_enabled: user.mfa_enabled,
                    });
                    let node = Node::new(ctx.tenant_id().clone(), kind, now);
                    user_ids.insert(user.id.clone(), node.id.clone());
                    for group_ref in &user.group_ids {
                        if let Some(group_node_id) = group_ids.get(group_ref) {
                            result.push_edge(make_edge(
                                ctx,
                                EdgeType::MemberOf,
                                node.id.clone(),
                                group_node_id.clone(),
                                EdgeAttrs::default(),
                                now,
                            ));
                        }
                    }
                    if self.config.allows_kind(node.kind.label()) {
                        result.push_node(node);
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to list users");
                result.record_failure();
                result.status = SyncStatus::Partial;
            }
        }

        if cancel.is_cancelled() {
            result.status = SyncStatus::Cancelled;
            return Ok(result);
        }

        match self.client.list_roles().await {
            Ok(roles) => {
                for role in roles {
                    let kind = NodeKind::Role(Role {
                        source: self.source,
                        source_id: role.id.clone(),
                        name: role.name.clone(),
                    });
                    let node = Node::new(ctx.tenant_id().clone(), kind, now);
                    for user_ref in &role.assigned_user_ids {
                        if let Some(user_node_id) = user_ids.get(user_ref) {
                            result.push_edge(make_edge(
                                ctx,
                                EdgeType::HasAccess,
                                user_node_id.clone(),
                                node.id.clone(),
                                EdgeAttrs::default(),
                                now,
                            ));
                        }
                    }
                    if self.config.allows_kind(node.kind.label()) {
                        result.push_node(node);
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to list roles");
                result.record_failure();
                result.status = SyncStatus::Partial;
            }
        }

        Ok(result)
    }
}
