//! Integration tests for the compose API

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use compose_service::{
    create_router, AppState, ComposeClient, ComposeService, ComposeStore, MemoryStore,
    MockPipeline, Worker,
};
use composer_common::{ComposeRequest, ImageStatusValue, UploadResult, UploadStatusValue};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // for `oneshot`

/// Helper to create a test app over an in-memory store
fn create_test_app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service = ComposeService::new(store.clone(), "test-1");
    let app = create_router(AppState::new(Arc::new(service)));
    (app, store)
}

/// Start a worker draining `store` in the background
fn spawn_worker(store: Arc<MemoryStore>) -> tokio::task::JoinHandle<()> {
    let worker = Worker::new(0, store, Arc::new(MockPipeline::default()))
        .with_poll_timeout(Duration::from_millis(50));
    tokio::spawn(async move {
        let _ = worker.run().await;
    })
}

fn compose_request() -> Value {
    json!({
        "distribution": "rhel-8",
        "customizations": {
            "packages": ["postgres"],
            "subscription": {
                "organization": 2040324,
                "activation-key": "my-secret-key",
                "server-url": "subscription.rhsm.redhat.com",
                "base-url": "http://cdn.redhat.com/",
                "insights": true
            }
        },
        "image_requests": [{
            "architecture": "x86_64",
            "image_type": "vhd",
            "repositories": [
                {"baseurl": "https://cdn.redhat.com/content/dist/rhel8/baseos", "rhsm": true}
            ],
            "upload_request": {
                "type": "azure",
                "options": {
                    "subscription_id": "4e5d8b2c-ab24-4413-90c5-612306e809e2",
                    "tenant_id": "5c7ef5b6-1c3f-4da0-a622-0b060239d7d7",
                    "resource_group": "ToucanResourceGroup",
                    "location": "westeurope",
                    "image_name": "my-image"
                }
            }
        }]
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };

    (status, json)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn post_compose(app: &Router, body: &Value) -> (StatusCode, Value) {
    send(
        app,
        Request::builder()
            .uri("/compose")
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(body).unwrap()))
            .unwrap(),
    )
    .await
}

#[tokio::test]
async fn test_health_check() {
    let (app, _store) = create_test_app();

    let (status, json) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "compose-service");
}

#[tokio::test]
async fn test_submit_compose() {
    let (app, _store) = create_test_app();

    let (status, json) = post_compose(&app, &compose_request()).await;

    assert_eq!(status, StatusCode::CREATED);
    let id = json["id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());

    let (status, json) = get(&app, &format!("/compose/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"image_status": {"status": "pending"}}));
}

#[tokio::test]
async fn test_metadata_not_ready_while_pending() {
    let (app, _store) = create_test_app();

    let (_, json) = post_compose(&app, &compose_request()).await;
    let id = json["id"].as_str().unwrap();

    let (status, json) = get(&app, &format!("/compose/{}/metadata", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_compose_without_image_requests() {
    let (app, store) = create_test_app();

    let mut request = compose_request();
    request["image_requests"] = json!([]);

    let (status, json) = post_compose(&app, &request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("At least one image request"));
    assert_eq!(store.queue_length().await.unwrap(), 0);
}

#[tokio::test]
async fn test_compose_with_unknown_upload_type() {
    let (app, _store) = create_test_app();

    let mut request = compose_request();
    request["image_requests"][0]["upload_request"]["type"] = json!("openstack");

    let (status, json) = post_compose(&app, &request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("openstack"));
}

#[tokio::test]
async fn test_compose_with_malformed_body() {
    let (app, _store) = create_test_app();

    let (status, _) = send(
        &app,
        Request::builder()
            .uri("/compose")
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from("{\"distribution\": "))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Request::builder()
            .uri("/compose")
            .method("POST")
            .body(Body::from(compose_request().to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_unknown_compose_id() {
    let (app, _store) = create_test_app();
    let id = uuid::Uuid::new_v4();

    let (status, _) = get(&app, &format!("/compose/{}", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app, &format!("/compose/{}/metadata", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_compose_id() {
    let (app, _store) = create_test_app();

    let (status, json) = get(&app, "/compose/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Invalid compose id"));
}

#[tokio::test]
async fn test_version_and_openapi() {
    let (app, _store) = create_test_app();

    let (status, json) = get(&app, "/version").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({"version": "test-1"}));

    let (status, json) = get(&app, "/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["info"]["version"], "test-1");
    assert!(json["paths"]["/compose/{id}/metadata"].is_object());
}

#[tokio::test]
async fn test_compose_runs_to_success() {
    let (app, store) = create_test_app();
    let worker = spawn_worker(store.clone());

    let (_, json) = post_compose(&app, &compose_request()).await;
    let id = json["id"].as_str().unwrap().to_string();

    let mut last = Value::Null;
    for _ in 0..100 {
        let (_, json) = get(&app, &format!("/compose/{}", id)).await;
        last = json;
        if last["image_status"]["status"] == "success" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    worker.abort();

    assert_eq!(last["image_status"]["status"], "success");
    assert_eq!(
        last["image_status"]["upload_status"],
        json!({
            "type": "azure",
            "status": "success",
            "options": {"image_name": "my-image"}
        })
    );

    let (status, json) = get(&app, &format!("/compose/{}/metadata", id)).await;
    assert_eq!(status, StatusCode::OK);
    let packages = json["packages"].as_array().unwrap();
    assert!(packages.iter().any(|p| p["name"] == "postgres"));
    assert!(json.get("ostree_commit").is_none());
}

#[tokio::test]
async fn test_client_against_running_service() {
    let (app, store) = create_test_app();
    let worker = spawn_worker(store);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = ComposeClient::new(format!("http://{}", addr));

    assert_eq!(client.version().await.unwrap().version, "test-1");
    assert_eq!(client.openapi().await.unwrap()["openapi"], "3.0.1");

    let request: ComposeRequest = serde_json::from_value(compose_request()).unwrap();
    let result = client.compose(&request).await.unwrap();

    let status = client
        .poll_until_terminal(&result.id, Duration::from_millis(20), 100)
        .await
        .unwrap();
    assert_eq!(status.image_status.status, ImageStatusValue::Success);

    let upload = status.image_status.upload_status.unwrap();
    assert_eq!(upload.status, UploadStatusValue::Success);
    assert!(matches!(
        upload.decode_result().unwrap(),
        Some(UploadResult::Azure(_))
    ));

    assert!(client.compose_metadata(&result.id).await.unwrap().is_some());
    assert!(client
        .compose_status(&uuid::Uuid::new_v4().to_string())
        .await
        .unwrap()
        .is_none());

    let mut invalid = request.clone();
    invalid.image_requests.clear();
    assert!(client.compose(&invalid).await.is_err());

    worker.abort();
    server.abort();
}
