//! Route tests driven through `tower::ServiceExt::oneshot`, backed by an
//! in-memory store and `MockExecutor`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use agents::mock::MockExecutor;
use agents::AgentCatalog;
use engine::{RunnerConfig, SqlWorkflowStore, StatusBroadcaster, WorkflowRunner};

use crate::{router, AppState};

async fn create_test_state(executor: MockExecutor) -> AppState {
    let pool = db::pool::create_memory_pool().await.unwrap();
    let executor = Arc::new(executor);
    let runner = Arc::new(WorkflowRunner::new(
        executor.clone(),
        Arc::new(SqlWorkflowStore::new(pool)),
        StatusBroadcaster::default(),
        RunnerConfig::default(),
    ));
    AppState::new(runner, executor, AgentCatalog::default())
}

async fn create_test_router() -> Router {
    router(create_test_state(MockExecutor::new()).await)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn chain_body(name: &str) -> Value {
    json!({
        "name": name,
        "description": "three steps",
        "nodes": [
            { "id": "1", "agentType": "analyzer", "label": "Analyze", "arguments": "one" },
            { "id": "2", "agentType": "coder", "label": "Build", "arguments": "two" },
            { "id": "3", "agentType": "tester", "label": "Test", "arguments": "three" }
        ],
        "edges": [
            { "id": "e1-2", "source": "1", "target": "2" },
            { "id": "e2-3", "source": "2", "target": "3" }
        ]
    })
}

async fn create_workflow(app: &Router, body: Value) -> Value {
    let (status, workflow) = send(app, "POST", "/api/v1/workflows", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    workflow
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_router().await;
    let (status, body) = send(&app, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_agents_and_templates_are_listed() {
    let app = create_test_router().await;

    let (status, agents) = send(&app, "GET", "/api/v1/agents", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agents.as_array().unwrap().len(), 7);

    let (status, templates) = send(&app, "GET", "/api/v1/templates", None).await;
    assert_eq!(status, StatusCode::OK);
    let keys: Vec<&str> = templates
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["fullstack", "debug"]);
}

#[tokio::test]
async fn test_workflow_crud_round_trip() {
    let app = create_test_router().await;
    let created = create_workflow(&app, chain_body("crud")).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["executionCount"], 0);
    assert_eq!(created["graph"]["nodes"].as_array().unwrap().len(), 3);

    let (status, fetched) = send(&app, "GET", &format!("/api/v1/workflows/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, updated) = send(
        &app,
        "PUT",
        &format!("/api/v1/workflows/{id}"),
        Some(json!({ "name": "renamed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "renamed");
    assert_eq!(updated["created"], created["created"]);

    let (status, list) = send(&app, "GET", "/api/v1/workflows", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "DELETE", &format!("/api/v1/workflows/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, "GET", &format!("/api/v1/workflows/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_empty_workflow_starts_with_starter_node() {
    let app = create_test_router().await;
    let created = create_workflow(&app, json!({ "name": "fresh" })).await;
    let nodes = created["graph"]["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["label"], "Start Here");
}

#[tokio::test]
async fn test_create_rejects_bad_definitions() {
    let app = create_test_router().await;

    let (status, _) = send(&app, "POST", "/api/v1/workflows", Some(json!({ "name": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let dangling = json!({
        "name": "dangling",
        "nodes": [{ "id": "1", "agentType": "coder", "label": "A" }],
        "edges": [{ "source": "1", "target": "9" }]
    });
    let (status, body) = send(&app, "POST", "/api/v1/workflows", Some(dangling)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains('9'));
}

#[tokio::test]
async fn test_stale_update_is_a_conflict() {
    let app = create_test_router().await;
    let created = create_workflow(&app, chain_body("stale")).await;
    let id = created["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/v1/workflows/{id}"),
        Some(json!({ "description": "edit", "expectedModified": "2000-01-01T00:00:00Z" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/api/v1/workflows/{id}"),
        Some(json!({ "description": "edit", "expectedModified": created["modified"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_execute_and_wait_returns_record_and_history() {
    let app = router(create_test_state(MockExecutor::new().failing("two", "broken build")).await);
    let created = create_workflow(&app, chain_body("run")).await;
    let id = created["id"].as_str().unwrap();

    let (status, record) = send(&app, "POST", &format!("/api/v1/workflows/{id}/execute?wait=true"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "error");
    assert_eq!(record["reason"], json!({ "kind": "nodeFailed", "nodeId": "2" }));
    assert_eq!(record["nodeStates"]["1"], "completed");
    assert_eq!(record["nodeStates"]["2"], "failed");
    assert_eq!(record["nodeStates"]["3"], "idle");

    let execution_id = record["executionId"].as_str().unwrap();
    let (status, view) = send(&app, "GET", &format!("/api/v1/executions/{execution_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["state"], "finished");
    assert_eq!(view["execution"], record);

    let (status, history) = send(&app, "GET", &format!("/api/v1/workflows/{id}/executions"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);

    let (_, workflow) = send(&app, "GET", &format!("/api/v1/workflows/{id}"), None).await;
    assert_eq!(workflow["executionCount"], 1);
}

#[tokio::test]
async fn test_waiting_client_that_goes_away_does_not_stop_the_run() {
    let app = router(create_test_state(MockExecutor::new().delay("two", Duration::from_millis(200))).await);
    let created = create_workflow(&app, chain_body("detached")).await;
    let id = created["id"].as_str().unwrap().to_string();

    // Give up on the response while node "2" is still running.
    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/workflows/{id}/execute?wait=true"))
        .body(Body::empty())
        .unwrap();
    let gave_up = tokio::time::timeout(Duration::from_millis(50), app.clone().oneshot(request)).await;
    assert!(gave_up.is_err());

    // The run still finishes and is recorded.
    let mut history = Value::Null;
    for _ in 0..100 {
        let (_, body) = send(&app, "GET", &format!("/api/v1/workflows/{id}/executions"), None).await;
        if !body.as_array().unwrap().is_empty() {
            history = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let runs = history.as_array().expect("run was recorded");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["status"], "completed");
    assert_eq!(runs[0]["nodeStates"]["3"], "completed");

    let (_, workflow) = send(&app, "GET", &format!("/api/v1/workflows/{id}"), None).await;
    assert_eq!(workflow["executionCount"], 1);
}

#[tokio::test]
async fn test_execute_in_background_is_accepted() {
    let app = create_test_router().await;
    let created = create_workflow(&app, chain_body("background")).await;
    let id = created["id"].as_str().unwrap();

    let (status, accepted) = send(
        &app,
        "POST",
        &format!("/api/v1/workflows/{id}/execute"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(accepted["executionOrder"], json!(["1", "2", "3"]));
    assert!(accepted["executionId"].as_str().is_some());
}

#[tokio::test]
async fn test_execute_cyclic_workflow_is_rejected() {
    let app = create_test_router().await;
    let created = create_workflow(
        &app,
        json!({
            "name": "loop",
            "nodes": [
                { "id": "a", "agentType": "coder", "label": "A" },
                { "id": "b", "agentType": "coder", "label": "B" }
            ],
            "edges": [
                { "source": "a", "target": "b" },
                { "source": "b", "target": "a" }
            ]
        }),
    )
    .await;
    let id = created["id"].as_str().unwrap();

    let (status, body) = send(&app, "POST", &format!("/api/v1/workflows/{id}/execute?wait=true"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("cycle"));
}

#[tokio::test]
async fn test_execute_missing_workflow_is_not_found() {
    let app = create_test_router().await;
    let uri = "/api/v1/workflows/00000000-0000-0000-0000-000000000000/execute";
    let (status, _) = send(&app, "POST", uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_unknown_execution_is_not_found() {
    let app = create_test_router().await;
    let uri = "/api/v1/executions/00000000-0000-0000-0000-000000000000/cancel";
    let (status, _) = send(&app, "POST", uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_execute_single_agent() {
    let app = router(create_test_state(MockExecutor::new().exiting("--fail", 2)).await);

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/agents/execute",
        Some(json!({ "agent": "coder", "args": "write tests" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "output": "coder:write tests", "exitStatus": 0 }));

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/agents/execute",
        Some(json!({ "agent": "tester", "args": "--fail" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["exitStatus"], 2);

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/agents/execute",
        Some(json!({ "agent": "hacker", "args": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
