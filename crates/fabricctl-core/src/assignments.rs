//! Membership resources: workspace users, semantic model users and
//! workspace-to-domain links.
//!
//! Each resource is a [`Member`] type plus a [`MembershipBackend`] that maps
//! add/update/remove onto the REST calls of the Power BI or Fabric surface.
//! The `create_*`, `update_*` and `delete_*` functions drive the reconciler
//! for the three lifecycle phases of an assignment resource.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::FabricClient;
use crate::error::{FabricError, Result};
use crate::reconcile::{self, Member, MembershipBackend, ReconcileReport};

/// Principal type sent for workspace users
pub const USER_PRINCIPAL_TYPE: &str = "User";

/// Access right that revokes a semantic model permission
pub const NO_ACCESS_RIGHT: &str = "None";

// Workspace users

/// A user with a role on a workspace, keyed by email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceUser {
    pub email: String,
    /// `Admin`, `Member`, `Contributor` or `Viewer`
    pub role: String,
}

impl WorkspaceUser {
    pub fn new(email: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            role: role.into(),
        }
    }
}

impl Member for WorkspaceUser {
    fn identity(&self) -> &str {
        &self.email
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupUserRequest<'a> {
    identifier: &'a str,
    group_user_access_right: &'a str,
    principal_type: &'a str,
}

impl<'a> From<&'a WorkspaceUser> for GroupUserRequest<'a> {
    fn from(user: &'a WorkspaceUser) -> Self {
        Self {
            identifier: &user.email,
            group_user_access_right: &user.role,
            principal_type: USER_PRINCIPAL_TYPE,
        }
    }
}

/// Workspace user calls on the Power BI `groups` surface
#[derive(Debug, Clone)]
pub struct WorkspaceUserBackend {
    client: FabricClient,
    workspace_id: String,
}

impl WorkspaceUserBackend {
    pub fn new(client: &FabricClient, workspace_id: impl Into<String>) -> Self {
        Self {
            client: client.clone(),
            workspace_id: workspace_id.into(),
        }
    }
}

#[async_trait]
impl MembershipBackend<WorkspaceUser> for WorkspaceUserBackend {
    async fn add(&self, user: &WorkspaceUser) -> Result<()> {
        let url = self.client.endpoints().workspace_users(&self.workspace_id);
        self.client.post(&url, &GroupUserRequest::from(user)).await?;
        Ok(())
    }

    async fn update(&self, user: &WorkspaceUser) -> Result<()> {
        let url = self.client.endpoints().workspace_users(&self.workspace_id);
        self.client.put(&url, &GroupUserRequest::from(user)).await?;
        Ok(())
    }

    async fn remove(&self, user: &WorkspaceUser) -> Result<()> {
        let url = self
            .client
            .endpoints()
            .workspace_user(&self.workspace_id, &user.email);
        self.client.delete(&url).await
    }
}

/// Assigns every desired user to a workspace with no prior state.
pub async fn create_workspace_users(
    client: &FabricClient,
    workspace_id: &str,
    desired: &[WorkspaceUser],
) -> Result<ReconcileReport<WorkspaceUser>> {
    let backend = WorkspaceUserBackend::new(client, workspace_id);
    reconcile::reconcile(desired, &[], &backend).await
}

/// Converges the workspace users from the stored list to the desired one.
pub async fn update_workspace_users(
    client: &FabricClient,
    workspace_id: &str,
    desired: &[WorkspaceUser],
    stored: &[WorkspaceUser],
) -> Result<ReconcileReport<WorkspaceUser>> {
    let backend = WorkspaceUserBackend::new(client, workspace_id);
    reconcile::reconcile(desired, stored, &backend).await
}

/// Removes every stored user from the workspace.
pub async fn delete_workspace_users(
    client: &FabricClient,
    workspace_id: &str,
    stored: &[WorkspaceUser],
) -> Result<ReconcileReport<WorkspaceUser>> {
    let backend = WorkspaceUserBackend::new(client, workspace_id);
    reconcile::reconcile(&[], stored, &backend).await
}

// Semantic model users

/// A principal's access right on a semantic model, keyed by email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticModelUser {
    pub email: String,
    /// `Read`, `ReadReshare`, `ReadExplore`, ...
    pub role: String,
    #[serde(default = "default_principal_type")]
    pub principal_type: String,
}

fn default_principal_type() -> String {
    USER_PRINCIPAL_TYPE.to_string()
}

impl SemanticModelUser {
    pub fn new(
        email: impl Into<String>,
        role: impl Into<String>,
        principal_type: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            role: role.into(),
            principal_type: principal_type.into(),
        }
    }
}

impl Member for SemanticModelUser {
    fn identity(&self) -> &str {
        &self.email
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SemanticModelUserRequest<'a> {
    identifier: &'a str,
    semantic_model_user_access_right: &'a str,
    principal_type: &'a str,
}

/// Semantic model permission calls. Removal sets the access right to `None`.
#[derive(Debug, Clone)]
pub struct SemanticModelUserBackend {
    client: FabricClient,
    url: String,
}

impl SemanticModelUserBackend {
    pub fn new(client: &FabricClient, workspace_id: &str, semantic_model_id: &str) -> Self {
        Self {
            url: client
                .endpoints()
                .semantic_model_users(workspace_id, semantic_model_id),
            client: client.clone(),
        }
    }

    fn request<'a>(user: &'a SemanticModelUser, access_right: &'a str) -> SemanticModelUserRequest<'a> {
        SemanticModelUserRequest {
            identifier: &user.email,
            semantic_model_user_access_right: access_right,
            principal_type: &user.principal_type,
        }
    }
}

#[async_trait]
impl MembershipBackend<SemanticModelUser> for SemanticModelUserBackend {
    async fn add(&self, user: &SemanticModelUser) -> Result<()> {
        self.client
            .post(&self.url, &Self::request(user, &user.role))
            .await?;
        Ok(())
    }

    async fn update(&self, user: &SemanticModelUser) -> Result<()> {
        self.client
            .put(&self.url, &Self::request(user, &user.role))
            .await?;
        Ok(())
    }

    async fn remove(&self, user: &SemanticModelUser) -> Result<()> {
        self.client
            .put(&self.url, &Self::request(user, NO_ACCESS_RIGHT))
            .await?;
        Ok(())
    }
}

pub async fn create_semantic_model_users(
    client: &FabricClient,
    workspace_id: &str,
    semantic_model_id: &str,
    desired: &[SemanticModelUser],
) -> Result<ReconcileReport<SemanticModelUser>> {
    let backend = SemanticModelUserBackend::new(client, workspace_id, semantic_model_id);
    reconcile::reconcile(desired, &[], &backend).await
}

pub async fn update_semantic_model_users(
    client: &FabricClient,
    workspace_id: &str,
    semantic_model_id: &str,
    desired: &[SemanticModelUser],
    stored: &[SemanticModelUser],
) -> Result<ReconcileReport<SemanticModelUser>> {
    let backend = SemanticModelUserBackend::new(client, workspace_id, semantic_model_id);
    reconcile::reconcile(desired, stored, &backend).await
}

pub async fn delete_semantic_model_users(
    client: &FabricClient,
    workspace_id: &str,
    semantic_model_id: &str,
    stored: &[SemanticModelUser],
) -> Result<ReconcileReport<SemanticModelUser>> {
    let backend = SemanticModelUserBackend::new(client, workspace_id, semantic_model_id);
    reconcile::reconcile(&[], stored, &backend).await
}

// Domain workspaces

/// A workspace linked to a domain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainWorkspace {
    pub workspace_id: String,
}

impl DomainWorkspace {
    pub fn new(workspace_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
        }
    }
}

impl Member for DomainWorkspace {
    fn identity(&self) -> &str {
        &self.workspace_id
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DomainWorkspacesRequest<'a> {
    workspaces_ids: [&'a str; 1],
}

/// Domain assignment calls, one workspace per request
#[derive(Debug, Clone)]
pub struct DomainWorkspaceBackend {
    client: FabricClient,
    domain_id: String,
}

impl DomainWorkspaceBackend {
    pub fn new(client: &FabricClient, domain_id: impl Into<String>) -> Self {
        Self {
            client: client.clone(),
            domain_id: domain_id.into(),
        }
    }

    async fn send(&self, url: &str, link: &DomainWorkspace) -> Result<()> {
        let body = serde_json::to_vec(&DomainWorkspacesRequest {
            workspaces_ids: [&link.workspace_id],
        })
        .map_err(|e| FabricError::decode(format!("request body for {url}"), e))?;
        self.client.post_bytes(url, body).await?;
        Ok(())
    }
}

#[async_trait]
impl MembershipBackend<DomainWorkspace> for DomainWorkspaceBackend {
    async fn add(&self, link: &DomainWorkspace) -> Result<()> {
        let url = self.client.endpoints().domain_assign_workspaces(&self.domain_id);
        self.send(&url, link).await
    }

    /// The identity is the only field, so a link is never planned for update.
    /// Re-assigning is harmless if it ever is.
    async fn update(&self, link: &DomainWorkspace) -> Result<()> {
        debug!(workspace_id = %link.workspace_id, "re-assigning domain workspace");
        self.add(link).await
    }

    async fn remove(&self, link: &DomainWorkspace) -> Result<()> {
        let url = self
            .client
            .endpoints()
            .domain_unassign_workspaces(&self.domain_id);
        self.send(&url, link).await
    }
}

pub async fn create_domain_workspaces(
    client: &FabricClient,
    domain_id: &str,
    desired: &[DomainWorkspace],
) -> Result<ReconcileReport<DomainWorkspace>> {
    let backend = DomainWorkspaceBackend::new(client, domain_id);
    reconcile::reconcile(desired, &[], &backend).await
}

pub async fn update_domain_workspaces(
    client: &FabricClient,
    domain_id: &str,
    desired: &[DomainWorkspace],
    stored: &[DomainWorkspace],
) -> Result<ReconcileReport<DomainWorkspace>> {
    let backend = DomainWorkspaceBackend::new(client, domain_id);
    reconcile::reconcile(desired, stored, &backend).await
}

pub async fn delete_domain_workspaces(
    client: &FabricClient,
    domain_id: &str,
    stored: &[DomainWorkspace],
) -> Result<ReconcileReport<DomainWorkspace>> {
    let backend = DomainWorkspaceBackend::new(client, domain_id);
    reconcile::reconcile(&[], stored, &backend).await
}
