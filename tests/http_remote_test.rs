mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::json;

use common::*;
use quicktodo_sync::{HttpRemoteEndpoint, OwnerId, RemoteConfig, RemoteEndpoint, RemoteError, Task};

const OWNER: OwnerId = OwnerId::new(7);

#[derive(Debug, Clone)]
struct Recorded {
    method: &'static str,
    params: HashMap<String, String>,
    authorization: Option<String>,
    body: Vec<Task>,
}

#[derive(Clone, Default)]
struct FakeServer {
    requests: Arc<Mutex<Vec<Recorded>>>,
    tasks: Arc<Vec<Task>>,
}

impl FakeServer {
    fn record(&self, method: &'static str, params: HashMap<String, String>, headers: &HeaderMap, body: Vec<Task>) {
        let authorization = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.requests.lock().unwrap().push(Recorded {
            method,
            params,
            authorization,
            body,
        });
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn pull_handler(
    State(server): State<FakeServer>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<Vec<Task>> {
    server.record("GET", params, &headers, Vec::new());
    Json(server.tasks.as_ref().clone())
}

async fn push_handler(
    State(server): State<FakeServer>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Vec<Task>>,
) -> StatusCode {
    server.record("POST", params, &headers, body);
    StatusCode::OK
}

async fn latest_time_handler() -> Json<DateTime<Utc>> {
    Json(at(42))
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn fake_server(tasks: Vec<Task>) -> (FakeServer, HttpRemoteEndpoint) {
    let server = FakeServer {
        requests: Arc::default(),
        tasks: Arc::new(tasks),
    };
    let app = Router::new()
        .route("/todos/sync", get(pull_handler).post(push_handler))
        .route("/utils/latestTime", get(latest_time_handler))
        .with_state(server.clone());
    let base = spawn(app).await;
    let endpoint = HttpRemoteEndpoint::new(RemoteConfig::new(base)).unwrap();
    (server, endpoint)
}

#[tokio::test]
async fn pull_sends_owner_cursor_and_bearer_token() {
    let mut tombstone = task(OWNER, "gone", at(3));
    tombstone.mark_deleted(at(4));
    let remote_tasks = vec![task(OWNER, "A", at(1)), tombstone];
    let (server, endpoint) = fake_server(remote_tasks.clone()).await;

    let pulled = endpoint.pull(OWNER, &token(), at(0)).await.unwrap();

    assert_eq!(pulled, remote_tasks);
    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.method, "GET");
    assert_eq!(req.params.get("userId").map(String::as_str), Some("7"));
    assert_eq!(
        req.params.get("lastSyncTime").map(String::as_str),
        Some("2025-09-01T08:00:00.000Z")
    );
    assert_eq!(req.authorization.as_deref(), Some("Bearer device-token"));
}

#[tokio::test]
async fn push_posts_changes_as_json() {
    let (server, endpoint) = fake_server(vec![]).await;
    let changes = vec![task(OWNER, "A", at(1)), task(OWNER, "B", at(2))];

    endpoint.push(OWNER, &token(), &changes).await.unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].params.get("userId").map(String::as_str), Some("7"));
    assert_eq!(requests[0].body, changes);
}

#[tokio::test]
async fn latest_time_is_decoded() {
    let (_server, endpoint) = fake_server(vec![]).await;

    let latest = endpoint.latest_time(OWNER, &token()).await.unwrap();

    assert_eq!(latest, at(42));
}

#[tokio::test]
async fn unauthorized_answer_maps_to_unauthorized() {
    let app = Router::new().route(
        "/todos/sync",
        get(|| async { (StatusCode::UNAUTHORIZED, Json(json!({ "message": "token expired" }))) }),
    );
    let endpoint = HttpRemoteEndpoint::new(RemoteConfig::new(spawn(app).await)).unwrap();

    let err = endpoint.pull(OWNER, &token(), at(0)).await.unwrap_err();

    match err {
        RemoteError::Unauthorized(message) => assert_eq!(message, "token expired"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn rejected_push_carries_status_and_server_message() {
    let app = Router::new().route(
        "/todos/sync",
        axum::routing::post(|| async {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": "unknown priority" })),
            )
        }),
    );
    let endpoint = HttpRemoteEndpoint::new(RemoteConfig::new(spawn(app).await)).unwrap();

    let err = endpoint
        .push(OWNER, &token(), &[task(OWNER, "A", at(1))])
        .await
        .unwrap_err();

    match err {
        RemoteError::Rejected { status, message } => {
            assert_eq!(status, 422);
            assert_eq!(message, "unknown priority");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn malformed_pull_body_is_a_decode_error() {
    let app = Router::new().route("/todos/sync", get(|| async { "not json" }));
    let endpoint = HttpRemoteEndpoint::new(RemoteConfig::new(spawn(app).await)).unwrap();

    let err = endpoint.pull(OWNER, &token(), at(0)).await.unwrap_err();

    assert!(matches!(err, RemoteError::Decode(_)));
}

#[tokio::test]
async fn slow_server_times_out() {
    let app = Router::new().route(
        "/todos/sync",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(Vec::<Task>::new())
        }),
    );
    let mut config = RemoteConfig::new(spawn(app).await);
    config.pull_timeout = Duration::from_millis(100);
    let endpoint = HttpRemoteEndpoint::new(config).unwrap();

    let err = endpoint.pull(OWNER, &token(), at(0)).await.unwrap_err();

    assert!(matches!(err, RemoteError::Timeout));
    assert!(err.is_transport());
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let endpoint = HttpRemoteEndpoint::new(RemoteConfig::new(format!("http://{}", addr))).unwrap();

    let err = endpoint.pull(OWNER, &token(), at(0)).await.unwrap_err();

    assert!(err.is_transport());
}
