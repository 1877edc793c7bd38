//! Multi-step workflows
//!
//! These compose client calls for the resources whose creation is more than
//! a single request. None of them roll back: a failure part way leaves the
//! earlier steps applied.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::FabricClient;
use crate::endpoints::UNASSIGNED_CAPACITY_ID;
use crate::error::{FabricError, Result};
use crate::progress::ProgressCallback;

/// Create/update body shared by workspace items
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRequest {
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ItemRequest {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            description: None,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A workspace item as returned by the Fabric API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub item_type: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<String>,
}

/// Create an eventstream and wait for the backend to finish provisioning it
///
/// The create call may complete asynchronously; the id is read from the
/// operation result.
///
/// # Returns
///
/// The id of the created eventstream.
pub async fn create_eventstream(
    client: &FabricClient,
    workspace_id: &str,
    request: &ItemRequest,
    on_progress: Option<ProgressCallback>,
) -> Result<String> {
    let url = client.endpoints().eventstreams(workspace_id);
    let result = client
        .post_with_operation_check_progress(&url, request, on_progress)
        .await?;
    let item: Item =
        serde_json::from_value(result).map_err(|e| FabricError::decode(&url, e))?;

    info!(workspace_id, eventstream_id = %item.id, "eventstream created");
    Ok(item.id)
}

/// Create a lakehouse and read it back
///
/// The lakehouse is not readable right after creation, so the read waits
/// for the client's settle delay first.
pub async fn create_lakehouse_and_read(
    client: &FabricClient,
    workspace_id: &str,
    request: &ItemRequest,
) -> Result<Item> {
    let url = client.endpoints().lakehouses(workspace_id);

    // Step 1: Create
    let created: Item = client.post(&url, request).await?.decode(&url)?;
    debug!(workspace_id, lakehouse_id = %created.id, "lakehouse created, waiting to read back");

    // Step 2: Let the backend settle
    client.sleep(client.settle_delay()).await?;

    // Step 3: Read back
    let lakehouse = client
        .get_json::<Item>(&client.endpoints().lakehouse(workspace_id, &created.id))
        .await?;
    info!(workspace_id, lakehouse_id = %lakehouse.id, "lakehouse ready");
    Ok(lakehouse)
}

/// Git provider coordinates of a workspace connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitProviderDetails {
    pub organization_name: String,
    pub project_name: String,
    /// e.g. `AzureDevOps`
    pub git_provider_type: String,
    pub repository_name: String,
    pub branch_name: String,
    pub directory_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GitConnectRequest<'a> {
    git_provider_details: &'a GitProviderDetails,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GitInitializeRequest<'a> {
    initialization_strategy: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GitInitializeResponse {
    #[serde(default)]
    remote_commit_hash: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateFromGitRequest<'a> {
    remote_commit_hash: &'a str,
}

/// Connect a workspace to Git and pull the remote content
///
/// 1. Connects the workspace to the repository
/// 2. Initializes the connection with `initialization_strategy`
///    (e.g. `PreferRemote`), which reports the remote commit hash
/// 3. Updates the workspace from that commit
///
/// # Returns
///
/// The remote commit hash the workspace was updated to.
///
/// # Errors
///
/// [`FabricError::Decode`] if initialization reports no commit hash; the
/// connection made in step 1 stays in place.
pub async fn connect_git_and_sync(
    client: &FabricClient,
    workspace_id: &str,
    details: &GitProviderDetails,
    initialization_strategy: &str,
) -> Result<String> {
    let endpoints = client.endpoints();

    // Step 1: Connect
    let url = endpoints.git_connect(workspace_id);
    let body = serde_json::to_vec(&GitConnectRequest {
        git_provider_details: details,
    })
    .map_err(|e| FabricError::decode(format!("request body for {url}"), e))?;
    client.post_bytes(&url, body).await?;
    debug!(workspace_id, repository = %details.repository_name, "workspace connected to git");

    // Step 2: Initialize
    let url = endpoints.git_initialize(workspace_id);
    let init: GitInitializeResponse = client
        .post(
            &url,
            &GitInitializeRequest {
                initialization_strategy,
            },
        )
        .await?
        .decode(&url)?;
    let remote_commit_hash = init
        .remote_commit_hash
        .filter(|hash| !hash.is_empty())
        .ok_or_else(|| {
            FabricError::decode(
                &url,
                serde::de::Error::custom("remoteCommitHash missing or empty"),
            )
        })?;

    // Step 3: Update from git
    let url = endpoints.git_update_from_git(workspace_id);
    client
        .post(
            &url,
            &UpdateFromGitRequest {
                remote_commit_hash: &remote_commit_hash,
            },
        )
        .await?;

    info!(workspace_id, remote_commit_hash = %remote_commit_hash, "workspace synced from git");
    Ok(remote_commit_hash)
}

/// Disconnect a workspace from Git
pub async fn disconnect_git(client: &FabricClient, workspace_id: &str) -> Result<()> {
    let url = client.endpoints().git_disconnect(workspace_id);
    client.post(&url, &serde_json::json!({})).await?;
    info!(workspace_id, "workspace disconnected from git");
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssignToCapacityRequest<'a> {
    capacity_id: &'a str,
}

/// Assign a workspace to a capacity
///
/// Passing [`UNASSIGNED_CAPACITY_ID`] detaches the workspace.
pub async fn assign_capacity(
    client: &FabricClient,
    workspace_id: &str,
    capacity_id: &str,
) -> Result<()> {
    let url = client.endpoints().assign_to_capacity(workspace_id);
    client
        .post(&url, &AssignToCapacityRequest { capacity_id })
        .await?;
    info!(workspace_id, capacity_id, "workspace assigned to capacity");
    Ok(())
}

/// Move a workspace to another capacity: unassign, then assign
pub async fn reassign_capacity(
    client: &FabricClient,
    workspace_id: &str,
    capacity_id: &str,
) -> Result<()> {
    assign_capacity(client, workspace_id, UNASSIGNED_CAPACITY_ID).await?;
    assign_capacity(client, workspace_id, capacity_id).await
}
