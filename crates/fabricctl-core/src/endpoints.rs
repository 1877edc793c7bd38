//! URL builders for the Fabric and Power BI REST surfaces

/// Default Fabric REST API base
pub const DEFAULT_FABRIC_BASE_URL: &str = "https://api.fabric.microsoft.com/v1";

/// Default legacy Power BI REST API base
pub const DEFAULT_POWERBI_BASE_URL: &str = "https://api.powerbi.com/v1.0/myorg";

/// Capacity id that detaches a workspace from its capacity
pub const UNASSIGNED_CAPACITY_ID: &str = "00000000-0000-0000-0000-000000000000";

/// API bases used to build every request URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    fabric_base: String,
    powerbi_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_FABRIC_BASE_URL, DEFAULT_POWERBI_BASE_URL)
    }
}

impl Endpoints {
    pub fn new(fabric_base: impl Into<String>, powerbi_base: impl Into<String>) -> Self {
        Self {
            fabric_base: fabric_base.into().trim_end_matches('/').to_string(),
            powerbi_base: powerbi_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn fabric_base(&self) -> &str {
        &self.fabric_base
    }

    pub fn powerbi_base(&self) -> &str {
        &self.powerbi_base
    }

    /// Status endpoint of a long-running operation
    pub fn operation_result(&self, operation_id: &str) -> String {
        format!("{}/operations/{}/result", self.fabric_base, operation_id)
    }

    // Workspaces

    pub fn workspaces(&self) -> String {
        format!("{}/workspaces", self.fabric_base)
    }

    pub fn workspace(&self, workspace_id: &str) -> String {
        format!("{}/workspaces/{}", self.fabric_base, workspace_id)
    }

    pub fn workspace_users(&self, workspace_id: &str) -> String {
        format!("{}/groups/{}/users", self.powerbi_base, workspace_id)
    }

    /// The Power BI API addresses a workspace user by email in the path
    pub fn workspace_user(&self, workspace_id: &str, email: &str) -> String {
        format!(
            "{}/groups/{}/users/{}",
            self.powerbi_base,
            workspace_id,
            urlencoding::encode(email)
        )
    }

    pub fn assign_to_capacity(&self, workspace_id: &str) -> String {
        format!("{}/groups/{}/AssignToCapacity", self.powerbi_base, workspace_id)
    }

    // Domains

    pub fn domains(&self) -> String {
        format!("{}/admin/domains", self.fabric_base)
    }

    pub fn domain(&self, domain_id: &str) -> String {
        format!("{}/admin/domains/{}", self.fabric_base, domain_id)
    }

    pub fn domain_assign_workspaces(&self, domain_id: &str) -> String {
        format!("{}/admin/domains/{}/assignWorkspaces", self.fabric_base, domain_id)
    }

    pub fn domain_unassign_workspaces(&self, domain_id: &str) -> String {
        format!(
            "{}/admin/domains/{}/unassignWorkspaces",
            self.fabric_base, domain_id
        )
    }

    // Workspace items

    pub fn lakehouses(&self, workspace_id: &str) -> String {
        format!("{}/workspaces/{}/lakehouses", self.fabric_base, workspace_id)
    }

    pub fn lakehouse(&self, workspace_id: &str, lakehouse_id: &str) -> String {
        format!(
            "{}/workspaces/{}/lakehouses/{}",
            self.fabric_base, workspace_id, lakehouse_id
        )
    }

    pub fn eventstreams(&self, workspace_id: &str) -> String {
        format!("{}/workspaces/{}/eventstreams", self.fabric_base, workspace_id)
    }

    pub fn eventstream(&self, workspace_id: &str, eventstream_id: &str) -> String {
        format!(
            "{}/workspaces/{}/eventstreams/{}",
            self.fabric_base, workspace_id, eventstream_id
        )
    }

    pub fn spark_pools(&self, workspace_id: &str) -> String {
        format!("{}/workspaces/{}/spark/pools", self.fabric_base, workspace_id)
    }

    pub fn spark_pool(&self, workspace_id: &str, pool_id: &str) -> String {
        format!(
            "{}/workspaces/{}/spark/pools/{}",
            self.fabric_base, workspace_id, pool_id
        )
    }

    pub fn semantic_model_users(&self, workspace_id: &str, semantic_model_id: &str) -> String {
        format!(
            "{}/workspaces/{}/semanticModels/{}/users",
            self.powerbi_base, workspace_id, semantic_model_id
        )
    }

    // Git integration

    pub fn git_connect(&self, workspace_id: &str) -> String {
        format!("{}/workspaces/{}/git/connect", self.fabric_base, workspace_id)
    }

    pub fn git_initialize(&self, workspace_id: &str) -> String {
        format!(
            "{}/workspaces/{}/git/initializeConnection",
            self.fabric_base, workspace_id
        )
    }

    pub fn git_update_from_git(&self, workspace_id: &str) -> String {
        format!(
            "{}/workspaces/{}/git/updateFromGit",
            self.fabric_base, workspace_id
        )
    }

    pub fn git_disconnect(&self, workspace_id: &str) -> String {
        format!("{}/workspaces/{}/git/disconnect", self.fabric_base, workspace_id)
    }

    // Deployment pipelines

    pub fn pipelines(&self) -> String {
        format!("{}/pipelines", self.powerbi_base)
    }

    pub fn pipeline(&self, pipeline_id: &str) -> String {
        format!("{}/pipelines/{}", self.powerbi_base, pipeline_id)
    }

    pub fn pipeline_stage_assign(&self, pipeline_id: &str, stage_order: u32) -> String {
        format!(
            "{}/pipelines/{}/stages/{}/assignWorkspace",
            self.powerbi_base, pipeline_id, stage_order
        )
    }

    pub fn pipeline_stage_unassign(&self, pipeline_id: &str, stage_order: u32) -> String {
        format!(
            "{}/pipelines/{}/stages/{}/unassignWorkspace",
            self.powerbi_base, pipeline_id, stage_order
        )
    }
}
