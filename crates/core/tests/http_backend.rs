//! HTTP backend integration tests.
//!
//! Runs the orchestrator and poller against an in-process fake control plane
//! serving the same JSON endpoints as the real one.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use chronos_core::{
    testing::fixtures, BackendError, ControlPlaneConfig, HttpUploadBackend, JobStatusPoller,
    PollOutcome, TaskState, TaskStatusSource, UploadBackend, UploadError, UploadOrchestrator,
};

/// State of the fake control plane.
#[derive(Default)]
struct FakeControlPlane {
    base_url: Mutex<String>,
    stored: Mutex<BTreeMap<u32, Vec<u8>>>,
    committed: Mutex<Vec<Value>>,
    aborted: Mutex<Vec<Value>>,
    status_queries: Mutex<u32>,
    /// Parts whose PUT response carries no ETag header.
    untagged_parts: Mutex<Vec<u32>>,
    /// Error text returned by the commit endpoint.
    commit_error: Mutex<Option<String>>,
    /// Time the store takes to accept each part.
    store_delay: Mutex<Option<Duration>>,
}

type Shared = Arc<FakeControlPlane>;

async fn initialize(Json(body): Json<Value>) -> Response {
    if body.get("objectKey").and_then(Value::as_str).is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "objectKey is required" })),
        )
            .into_response();
    }
    Json(json!({ "uploadId": "fake-upload-1" })).into_response()
}

async fn part_url(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let part_number = body["partNumber"].as_u64().unwrap_or_default();
    let base_url = state.base_url.lock().unwrap().clone();
    Json(json!({ "url": format!("{}/store/{}", base_url, part_number) }))
}

async fn store_part(
    State(state): State<Shared>,
    Path(part_number): Path<u32>,
    body: Bytes,
) -> Response {
    let delay = *state.store_delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let digest = format!("{:x}", md5::compute(&body));
    state
        .stored
        .lock()
        .unwrap()
        .insert(part_number, body.to_vec());

    if state.untagged_parts.lock().unwrap().contains(&part_number) {
        return StatusCode::OK.into_response();
    }
    // S3 quotes ETags
    (StatusCode::OK, [(header::ETAG, format!("\"{}\"", digest))]).into_response()
}

async fn complete(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    state.committed.lock().unwrap().push(body.clone());

    if let Some(message) = state.commit_error.lock().unwrap().clone() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": message })),
        )
            .into_response();
    }
    Json(json!({
        "status": "Upload complete, video processing started",
        "objectKey": body["objectKey"],
        "taskId": "fake-task-1",
    }))
    .into_response()
}

async fn abort(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    state.aborted.lock().unwrap().push(body);
    Json(json!({ "status": "aborted" }))
}

async fn task_status(State(state): State<Shared>, Path(task_id): Path<String>) -> Json<Value> {
    let mut queries = state.status_queries.lock().unwrap();
    *queries += 1;
    if *queries == 1 {
        Json(json!({
            "taskId": task_id,
            "state": "PROGRESS",
            "info": { "status": "Transcribing" },
        }))
    } else {
        Json(json!({
            "taskId": task_id,
            "state": "SUCCESS",
            "info": { "status": "Clips generated" },
        }))
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Start the fake control plane on an ephemeral port.
async fn spawn_control_plane() -> (Shared, HttpUploadBackend) {
    spawn_control_plane_with(ControlPlaneConfig {
        timeout_secs: 5,
        ..Default::default()
    })
    .await
}

/// Start the fake control plane, pointing a client built from `config` at it.
async fn spawn_control_plane_with(config: ControlPlaneConfig) -> (Shared, HttpUploadBackend) {
    let state: Shared = Arc::new(FakeControlPlane::default());
    let app = Router::new()
        .route("/upload/initialize", post(initialize))
        .route("/upload/part", post(part_url))
        .route("/store/{part_number}", put(store_part))
        .route("/upload/complete", post(complete))
        .route("/upload/abort", post(abort))
        .route("/upload/status/{task_id}", get(task_status))
        .route("/health", get(health))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    *state.base_url.lock().unwrap() = base_url.clone();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let backend = HttpUploadBackend::new(&ControlPlaneConfig {
        url: base_url,
        ..config
    })
    .unwrap();
    (state, backend)
}

#[tokio::test]
async fn test_upload_and_poll_end_to_end() {
    let (state, backend) = spawn_control_plane().await;
    let backend = Arc::new(backend);
    let orchestrator = UploadOrchestrator::new(fixtures::upload_config(4), backend.clone());

    let receipt = orchestrator
        .upload(&fixtures::video_object(10), &CancellationToken::new())
        .await
        .expect("upload failed");
    assert_eq!(receipt.upload_id, "fake-upload-1");
    assert_eq!(receipt.task_id, "fake-task-1");

    let stored: Vec<u8> = state
        .stored
        .lock()
        .unwrap()
        .values()
        .flatten()
        .copied()
        .collect();
    assert_eq!(stored, fixtures::pattern_bytes(10));

    // Wire format of the commit body, ETags unquoted
    let committed = state.committed.lock().unwrap().clone();
    assert_eq!(committed.len(), 1);
    let parts = committed[0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 3);
    for (i, part) in parts.iter().enumerate() {
        assert_eq!(part["PartNumber"], json!(i + 1));
        let etag = part["ETag"].as_str().unwrap();
        assert_eq!(etag.len(), 32);
        assert!(!etag.contains('"'));
    }
    assert_eq!(committed[0]["uploadId"], "fake-upload-1");

    let poller = JobStatusPoller::new(fixtures::poller_config(), backend);
    let mut details = Vec::new();
    let outcome = poller
        .watch(&receipt.task_id, &CancellationToken::new(), |obs| {
            details.push(obs.detail.clone())
        })
        .await;

    assert_eq!(
        outcome,
        PollOutcome::Succeeded {
            detail: "Clips generated".to_string()
        }
    );
    assert_eq!(details, vec!["Transcribing", "Clips generated"]);
    assert_eq!(*state.status_queries.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_put_without_etag_header_is_rejected() {
    let (state, backend) = spawn_control_plane().await;
    state.untagged_parts.lock().unwrap().push(2);

    let orchestrator = UploadOrchestrator::new(fixtures::upload_config(4), Arc::new(backend));
    let err = orchestrator
        .upload(&fixtures::video_object(12), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::PartTransfer { part_number: 2, .. }));
    assert!(state.committed.lock().unwrap().is_empty());
    let aborted = state.aborted.lock().unwrap().clone();
    assert_eq!(aborted.len(), 1);
    assert_eq!(aborted[0]["uploadId"], "fake-upload-1");
}

#[tokio::test]
async fn test_commit_error_text_is_verbatim() {
    let (state, backend) = spawn_control_plane().await;
    *state.commit_error.lock().unwrap() =
        Some("An error occurred (InvalidPart) when calling CompleteMultipartUpload".into());

    let orchestrator = UploadOrchestrator::new(fixtures::upload_config(4), Arc::new(backend));
    let err = orchestrator
        .upload(&fixtures::video_object(8), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        UploadError::Commit(message) => assert_eq!(
            message,
            "An error occurred (InvalidPart) when calling CompleteMultipartUpload"
        ),
        other => panic!("expected Commit, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_part_put_uses_part_timeout() {
    // API calls get 1 s, part PUTs 10 s; the store takes 1.5 s per part
    let (state, backend) = spawn_control_plane_with(ControlPlaneConfig {
        timeout_secs: 1,
        part_timeout_secs: 10,
        ..Default::default()
    })
    .await;
    *state.store_delay.lock().unwrap() = Some(Duration::from_millis(1500));

    let orchestrator = UploadOrchestrator::new(fixtures::upload_config(8), Arc::new(backend));
    let receipt = orchestrator
        .upload(&fixtures::video_object(8), &CancellationToken::new())
        .await
        .expect("slow part should fit the part timeout");

    assert_eq!(receipt.part_count, 1);
    assert_eq!(state.stored.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_part_put_times_out() {
    let (state, backend) = spawn_control_plane().await;
    *state.store_delay.lock().unwrap() = Some(Duration::from_millis(1500));
    let backend = backend.with_part_timeout(Duration::from_millis(200));

    let url = backend.part_target("key", "fake-upload-1", 1).await.unwrap();
    let err = backend
        .put_part(&url, Bytes::from_static(b"abcd"))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Timeout), "got {:?}", err);
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_status_and_health_endpoints() {
    let (_state, backend) = spawn_control_plane().await;

    backend.health().await.unwrap();

    let status = backend.task_status("task with space").await.unwrap();
    assert_eq!(status.task_id, "task with space");
    assert_eq!(status.state, TaskState::Progress);
    assert_eq!(status.detail.as_deref(), Some("Transcribing"));
}

#[tokio::test]
async fn test_unreachable_control_plane() {
    // Bind then drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = HttpUploadBackend::new(&ControlPlaneConfig {
        url: format!("http://{}", addr),
        timeout_secs: 2,
        ..Default::default()
    })
    .unwrap();

    let err = backend.initialize("key").await.unwrap_err();
    assert!(matches!(err, BackendError::ConnectionFailed(_)), "got {:?}", err);
    assert!(err.is_transient());
}
