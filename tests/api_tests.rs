mod test_harness;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use snowflake::api::{router, ControlResponse, ControlState, PING_RESPONSE};
use snowflake::scheduler::JobRegistry;
use test_harness::fast_registry;

fn create_test_app(registry: &Arc<JobRegistry>) -> Router {
    router(ControlState {
        registry: Arc::clone(registry),
    })
}

async fn send(app: Router, content_type: &str, body: String) -> (StatusCode, ControlResponse) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header("content-type", content_type)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let reply: ControlResponse = serde_json::from_slice(&bytes).unwrap();
    (status, reply)
}

async fn post(app: Router, body: Value) -> (StatusCode, ControlResponse) {
    send(app, "application/json", body.to_string()).await
}

async fn job_count(registry: &JobRegistry) -> usize {
    registry.len().await
}

#[tokio::test]
async fn test_ping() {
    let registry = fast_registry();
    let (status, reply) = post(create_test_app(&registry), json!({ "request": "ping" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply.response, PING_RESPONSE);
    assert!(reply.errors.is_empty());
}

#[tokio::test]
async fn test_request_type_is_case_insensitive() {
    let registry = fast_registry();
    let (status, reply) = post(create_test_app(&registry), json!({ "request": "PING" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply.response, "ping received.");
}

#[tokio::test]
async fn test_ls_without_jobs() {
    let registry = fast_registry();
    let (status, reply) = post(create_test_app(&registry), json!({ "request": "ls" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply.response, "No jobs deployed.");
}

#[tokio::test]
async fn test_deploy_then_ls() {
    let registry = fast_registry();

    let (status, reply) = post(
        create_test_app(&registry),
        json!({
            "request": "deploy",
            "name": "backup",
            "target_path": "/opt/jobs/backup.py",
            "command": "python3",
            "repeat": true,
            "operating_week_days": ["mon", "tue"],
            "operating_time_window": ["09:00", "17:00"]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{:?}", reply.errors);
    assert!(reply
        .response
        .starts_with("Successfully deployed new cron job process 'backup'"));

    let job = registry.get("backup").await.unwrap();
    assert!(job.repeat);
    assert!(reply.response.contains(&job.id));

    let (_, listing) = post(create_test_app(&registry), json!({ "request": "ls" })).await;
    let rows: Vec<&str> = listing.response.lines().collect();
    assert_eq!(rows.len(), 3);
    assert!(rows[0].starts_with("JOB"));
    assert!(rows[2].starts_with("backup"));
    assert!(rows[2].ends_with(&job.id));
}

#[tokio::test]
async fn test_deploy_invalid_window_adds_nothing() {
    let registry = fast_registry();

    let (status, reply) = post(
        create_test_app(&registry),
        json!({
            "request": "deploy",
            "name": "broken",
            "target_path": "job.sh",
            "command": "bash",
            "operating_time_window": ["12:00"]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reply.response.is_empty());
    assert_eq!(reply.errors.len(), 1);
    assert!(reply.errors[0].contains("operating_time_window"));
    assert_eq!(job_count(&registry).await, 0);

    let (_, listing) = post(create_test_app(&registry), json!({ "request": "ls" })).await;
    assert_eq!(listing.response, "No jobs deployed.");
}

#[tokio::test]
async fn test_deploy_missing_command_for_unknown_extension() {
    let registry = fast_registry();

    let (status, reply) = post(
        create_test_app(&registry),
        json!({ "request": "deploy", "name": "tool", "target_path": "/usr/bin/tool" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reply.errors[0].contains("\"command\""));
    assert_eq!(job_count(&registry).await, 0);
}

#[tokio::test]
async fn test_double_encoded_request() {
    let registry = fast_registry();
    let inner = json!({
        "request": "deploy",
        "name": "legacy",
        "target_path": "task.sh"
    })
    .to_string();

    let (status, reply) = post(create_test_app(&registry), Value::String(inner)).await;

    assert_eq!(status, StatusCode::OK, "{:?}", reply.errors);
    assert!(registry.get("legacy").await.is_some());
}

#[tokio::test]
async fn test_non_json_body_is_rejected() {
    let registry = fast_registry();

    let (status, reply) = send(
        create_test_app(&registry),
        "text/plain",
        r#"{"request": "halt"}"#.to_string(),
    )
    .await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(!reply.errors.is_empty());
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let registry = fast_registry();

    let (status, reply) = send(
        create_test_app(&registry),
        "application/json",
        "{not json".to_string(),
    )
    .await;

    assert!(status.is_client_error());
    assert!(!reply.errors.is_empty());
}

#[tokio::test]
async fn test_unknown_request_changes_nothing() {
    let registry = fast_registry();
    post(
        create_test_app(&registry),
        json!({ "request": "deploy", "name": "keep", "target_path": "keep.sh" }),
    )
    .await;

    let (status, reply) = post(
        create_test_app(&registry),
        json!({ "request": "delete", "name": "keep" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reply.errors[0].contains("delete"));
    assert_eq!(job_count(&registry).await, 1);
    assert!(!registry.get("keep").await.unwrap().disabled);
}

#[tokio::test]
async fn test_missing_request_type() {
    let registry = fast_registry();
    let (status, reply) = post(create_test_app(&registry), json!({ "name": "x" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.errors, ["No request type provided."]);
}

#[tokio::test]
async fn test_enable_and_disable() {
    let registry = fast_registry();
    post(
        create_test_app(&registry),
        json!({ "request": "deploy", "name": "svc", "target_path": "svc.sh" }),
    )
    .await;
    let id = registry.get("svc").await.unwrap().id;

    let (status, reply) = post(
        create_test_app(&registry),
        json!({ "request": "disable", "id": id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply.response, "Job 'svc' disabled.");
    assert!(registry.get("svc").await.unwrap().disabled);

    let (status, reply) = post(
        create_test_app(&registry),
        json!({ "request": "enable", "name": "svc" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply.response, "Job 'svc' enabled.");
    assert!(!registry.get("svc").await.unwrap().disabled);
}

#[tokio::test]
async fn test_unknown_identifier() {
    let registry = fast_registry();

    let (status, reply) = post(
        create_test_app(&registry),
        json!({ "request": "enable", "name": "nope" }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(reply.errors, ["Identifier 'nope' not found"]);
}

#[tokio::test]
async fn test_non_string_id_falls_back_to_name() {
    let registry = fast_registry();
    post(
        create_test_app(&registry),
        json!({ "request": "deploy", "name": "worker", "target_path": "worker.sh" }),
    )
    .await;

    let (status, reply) = post(
        create_test_app(&registry),
        json!({ "request": "disable", "id": 5, "name": "worker" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{:?}", reply.errors);
    assert_eq!(reply.response, "Job 'worker' disabled.");
    assert!(registry.get("worker").await.unwrap().disabled);
}

#[tokio::test]
async fn test_missing_identifier() {
    let registry = fast_registry();

    let (status, reply) = post(create_test_app(&registry), json!({ "request": "disable" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reply.errors[0].contains("identifier"));
}

#[tokio::test]
async fn test_config_pair_and_set_alias() {
    let registry = fast_registry();
    post(
        create_test_app(&registry),
        json!({ "request": "deploy", "name": "tune", "target_path": "tune.sh" }),
    )
    .await;

    let (status, reply) = post(
        create_test_app(&registry),
        json!({ "request": "config", "name": "tune", "argument": ["repeat", true] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{:?}", reply.errors);
    assert!(registry.get("tune").await.unwrap().repeat);

    let (status, _) = post(
        create_test_app(&registry),
        json!({ "request": "set", "name": "tune", "argument": "operating_time_window", "value": ["22:00", "02:00"] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(registry
        .get("tune")
        .await
        .unwrap()
        .operating_time_window
        .is_some());
}

#[tokio::test]
async fn test_config_rejects_invalid_value() {
    let registry = fast_registry();
    post(
        create_test_app(&registry),
        json!({ "request": "deploy", "name": "tune", "target_path": "tune.sh" }),
    )
    .await;

    let (status, reply) = post(
        create_test_app(&registry),
        json!({ "request": "config", "name": "tune", "argument": ["repeat", "yes"] }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reply.errors[0].contains("repeat"));
    assert!(!registry.get("tune").await.unwrap().repeat);
}

#[tokio::test]
async fn test_halt_disables_everything() {
    let registry = fast_registry();
    for name in ["a", "b", "c"] {
        post(
            create_test_app(&registry),
            json!({ "request": "deploy", "name": name, "target_path": "x.sh" }),
        )
        .await;
    }

    let (status, reply) = post(create_test_app(&registry), json!({ "request": "halt" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply.response, "Disabled 3 job(s).");
    assert!(registry.list().await.iter().all(|job| job.disabled));
}
