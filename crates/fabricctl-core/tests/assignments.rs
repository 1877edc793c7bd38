//! Membership reconciliation and multi-step workflows against a mock API

mod common;

use common::MockFabricServer;
use fabricctl_core::assignments::{
    DomainWorkspace, SemanticModelUser, WorkspaceUser, create_domain_workspaces,
    create_workspace_users, delete_semantic_model_users, update_domain_workspaces,
    update_workspace_users,
};
use fabricctl_core::reconcile::{Mutation, ReconcileState};
use fabricctl_core::workflows::{
    GitProviderDetails, ItemRequest, connect_git_and_sync, create_lakehouse_and_read,
    reassign_capacity,
};
use fabricctl_core::FabricError;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, ResponseTemplate};

fn pair(method: &str, path: &str) -> (String, String) {
    (method.to_string(), path.to_string())
}

#[tokio::test]
async fn role_change_issues_exactly_one_put() {
    let server = MockFabricServer::start().await;
    server.mock_token_any().await;
    Mock::given(method("PUT"))
        .and(path(server.powerbi("/groups/ws-1/users")))
        .and(body_json(json!({
            "identifier": "a@x.com",
            "groupUserAccessRight": "Admin",
            "principalType": "User"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server.server)
        .await;

    let client = server.client();
    let report = update_workspace_users(
        &client,
        "ws-1",
        &[WorkspaceUser::new("a@x.com", "Admin")],
        &[WorkspaceUser::new("a@x.com", "Member")],
    )
    .await
    .unwrap();

    assert!(report.is_converged());
    assert_eq!(server.api_calls().await, vec![pair("PUT", "/pbi/groups/ws-1/users")]);
}

#[tokio::test]
async fn unchanged_membership_issues_no_calls() {
    let server = MockFabricServer::start().await;
    server.mock_token(3599, 0).await;

    let users = vec![
        WorkspaceUser::new("a@x.com", "Admin"),
        WorkspaceUser::new("b@x.com", "Viewer"),
    ];
    let client = server.client();
    let report = update_workspace_users(&client, "ws-1", &users, &users)
        .await
        .unwrap();

    assert_eq!(report.state(), ReconcileState::Converged);
    assert_eq!(report.unchanged(), 2);
    assert!(report.applied().is_empty());
    assert!(server.api_calls().await.is_empty());
}

#[tokio::test]
async fn duplicate_desired_users_block_every_call() {
    let server = MockFabricServer::start().await;
    server.mock_token(3599, 0).await;

    let client = server.client();
    let err = create_workspace_users(
        &client,
        "ws-1",
        &[
            WorkspaceUser::new("a@x.com", "Admin"),
            WorkspaceUser::new("a@x.com", "Viewer"),
        ],
    )
    .await
    .unwrap_err();

    assert!(matches!(err, FabricError::DuplicateIdentity { ref key } if key == "a@x.com"));
    assert!(server.api_calls().await.is_empty());
}

#[tokio::test]
async fn additions_and_updates_run_before_removals() {
    let server = MockFabricServer::start().await;
    server.mock_token_any().await;
    Mock::given(method("POST"))
        .and(path(server.powerbi("/groups/ws-1/users")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server.server)
        .await;
    Mock::given(method("PUT"))
        .and(path(server.powerbi("/groups/ws-1/users")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server.server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(server.powerbi("/groups/ws-1/users/old%40x.com")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server.server)
        .await;

    let client = server.client();
    let report = update_workspace_users(
        &client,
        "ws-1",
        &[
            WorkspaceUser::new("new@x.com", "Viewer"),
            WorkspaceUser::new("kept@x.com", "Admin"),
        ],
        &[
            WorkspaceUser::new("old@x.com", "Admin"),
            WorkspaceUser::new("kept@x.com", "Member"),
        ],
    )
    .await
    .unwrap();

    assert!(report.is_converged());
    assert_eq!(
        server.api_calls().await,
        vec![
            pair("POST", "/pbi/groups/ws-1/users"),
            pair("PUT", "/pbi/groups/ws-1/users"),
            pair("DELETE", "/pbi/groups/ws-1/users/old%40x.com"),
        ]
    );
}

#[tokio::test]
async fn failed_call_leaves_earlier_calls_applied() {
    let server = MockFabricServer::start().await;
    server.mock_token_any().await;
    Mock::given(method("POST"))
        .and(path(server.powerbi("/groups/ws-1/users")))
        .and(body_partial_json(json!({"identifier": "a@x.com"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server.server)
        .await;
    Mock::given(method("POST"))
        .and(path(server.powerbi("/groups/ws-1/users")))
        .and(body_partial_json(json!({"identifier": "b@x.com"})))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .expect(1)
        .mount(&server.server)
        .await;
    Mock::given(method("POST"))
        .and(path(server.powerbi("/groups/ws-1/users")))
        .and(body_partial_json(json!({"identifier": "c@x.com"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server.server)
        .await;

    let client = server.client();
    let report = create_workspace_users(
        &client,
        "ws-1",
        &[
            WorkspaceUser::new("a@x.com", "Admin"),
            WorkspaceUser::new("b@x.com", "Admin"),
            WorkspaceUser::new("c@x.com", "Admin"),
        ],
    )
    .await
    .unwrap();

    assert_eq!(report.state(), ReconcileState::PartiallyFailed);
    assert_eq!(
        report.applied(),
        &[Mutation::Added(WorkspaceUser::new("a@x.com", "Admin"))]
    );
    assert!(report.error().is_some_and(FabricError::is_server_error));
}

#[tokio::test]
async fn semantic_model_removal_sets_access_to_none() {
    let server = MockFabricServer::start().await;
    server.mock_token_any().await;
    Mock::given(method("PUT"))
        .and(path(server.powerbi("/workspaces/ws-1/semanticModels/sm-1/users")))
        .and(body_json(json!({
            "identifier": "a@x.com",
            "semanticModelUserAccessRight": "None",
            "principalType": "User"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server.server)
        .await;

    let client = server.client();
    let report = delete_semantic_model_users(
        &client,
        "ws-1",
        "sm-1",
        &[SemanticModelUser::new("a@x.com", "Read", "User")],
    )
    .await
    .unwrap();

    assert!(report.is_converged());
}

#[tokio::test]
async fn domain_workspaces_are_assigned_one_per_call() {
    let server = MockFabricServer::start().await;
    server.mock_token_any().await;
    Mock::given(method("POST"))
        .and(path(server.fabric("/admin/domains/d-1/assignWorkspaces")))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server.server)
        .await;

    let client = server.client();
    create_domain_workspaces(
        &client,
        "d-1",
        &[DomainWorkspace::new("ws-1"), DomainWorkspace::new("ws-2")],
    )
    .await
    .unwrap()
    .into_result()
    .unwrap();

    assert_eq!(
        server.api_bodies().await,
        vec![
            json!({"workspacesIds": ["ws-1"]}),
            json!({"workspacesIds": ["ws-2"]}),
        ]
    );
}

#[tokio::test]
async fn domain_workspace_removal_unassigns() {
    let server = MockFabricServer::start().await;
    server.mock_token_any().await;
    Mock::given(method("POST"))
        .and(path(server.fabric("/admin/domains/d-1/unassignWorkspaces")))
        .and(body_json(json!({"workspacesIds": ["ws-1"]})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server.server)
        .await;

    let client = server.client();
    let report = update_domain_workspaces(
        &client,
        "d-1",
        &[DomainWorkspace::new("ws-2")],
        &[DomainWorkspace::new("ws-1"), DomainWorkspace::new("ws-2")],
    )
    .await
    .unwrap();

    assert_eq!(
        report.applied(),
        &[Mutation::Removed(DomainWorkspace::new("ws-1"))]
    );
}

fn git_details() -> GitProviderDetails {
    GitProviderDetails {
        organization_name: "contoso".to_string(),
        project_name: "analytics".to_string(),
        git_provider_type: "AzureDevOps".to_string(),
        repository_name: "fabric-items".to_string(),
        branch_name: "main".to_string(),
        directory_name: "/ws".to_string(),
    }
}

#[tokio::test]
async fn git_connect_initialize_and_update() {
    let server = MockFabricServer::start().await;
    server.mock_token_any().await;
    Mock::given(method("POST"))
        .and(path(server.fabric("/workspaces/ws-1/git/connect")))
        .and(body_partial_json(json!({
            "gitProviderDetails": {"repositoryName": "fabric-items", "branchName": "main"}
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server.server)
        .await;
    Mock::given(method("POST"))
        .and(path(server.fabric("/workspaces/ws-1/git/initializeConnection")))
        .and(body_json(json!({"initializationStrategy": "PreferRemote"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "requiredAction": "UpdateFromGit",
            "remoteCommitHash": "7d03b2918bf6aa62f96d0a4307293f3853201705"
        })))
        .expect(1)
        .mount(&server.server)
        .await;
    Mock::given(method("POST"))
        .and(path(server.fabric("/workspaces/ws-1/git/updateFromGit")))
        .and(body_json(json!({
            "remoteCommitHash": "7d03b2918bf6aa62f96d0a4307293f3853201705"
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server.server)
        .await;

    let client = server.client();
    let hash = connect_git_and_sync(&client, "ws-1", &git_details(), "PreferRemote")
        .await
        .unwrap();
    assert_eq!(hash, "7d03b2918bf6aa62f96d0a4307293f3853201705");
}

#[tokio::test]
async fn git_initialize_without_commit_hash_stops_the_flow() {
    let server = MockFabricServer::start().await;
    server.mock_token_any().await;
    Mock::given(method("POST"))
        .and(path(server.fabric("/workspaces/ws-1/git/connect")))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server.server)
        .await;
    Mock::given(method("POST"))
        .and(path(server.fabric("/workspaces/ws-1/git/initializeConnection")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"requiredAction": "None"})),
        )
        .expect(1)
        .mount(&server.server)
        .await;
    Mock::given(method("POST"))
        .and(path(server.fabric("/workspaces/ws-1/git/updateFromGit")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server.server)
        .await;

    let client = server.client();
    let err = connect_git_and_sync(&client, "ws-1", &git_details(), "PreferRemote")
        .await
        .unwrap_err();
    assert!(matches!(err, FabricError::Decode { .. }));
}

#[tokio::test]
async fn reassign_capacity_unassigns_first() {
    let server = MockFabricServer::start().await;
    server.mock_token_any().await;
    Mock::given(method("POST"))
        .and(path(server.powerbi("/groups/ws-1/AssignToCapacity")))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server.server)
        .await;

    let client = server.client();
    reassign_capacity(&client, "ws-1", "cap-2").await.unwrap();

    assert_eq!(
        server.api_bodies().await,
        vec![
            json!({"capacityId": "00000000-0000-0000-0000-000000000000"}),
            json!({"capacityId": "cap-2"}),
        ]
    );
}

#[tokio::test]
async fn lakehouse_is_read_back_after_creation() {
    let server = MockFabricServer::start().await;
    server.mock_token_any().await;
    Mock::given(method("POST"))
        .and(path(server.fabric("/workspaces/ws-1/lakehouses")))
        .and(body_json(json!({"displayName": "bronze"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "lh-1"})))
        .expect(1)
        .mount(&server.server)
        .await;
    Mock::given(method("GET"))
        .and(path(server.fabric("/workspaces/ws-1/lakehouses/lh-1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "lh-1",
            "displayName": "bronze",
            "type": "Lakehouse",
            "workspaceId": "ws-1"
        })))
        .expect(1)
        .mount(&server.server)
        .await;

    let client = server.client();
    let lakehouse = create_lakehouse_and_read(&client, "ws-1", &ItemRequest::new("bronze"))
        .await
        .unwrap();

    assert_eq!(lakehouse.display_name.as_deref(), Some("bronze"));
    assert_eq!(lakehouse.workspace_id.as_deref(), Some("ws-1"));
}
