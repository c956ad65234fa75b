//! Integration tests for the remote collaborators
//!
//! The sheet API store and the vision classifier are pointed at a local
//! axum server that records every request it receives.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Method, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use qit_common::catalog::CartonCatalog;
use qit_common::config::{ClassifierConfig, ClassifierKind};
use qit_common::model::RawRecord;
use qit_common::normalize::{normalize_record, normalize_records};
use qit_common::RecordId;
use qit_server::classifier::{ClassifierError, DefectClassifier, FixedClassifier, VisionClassifier};
use qit_server::store::{RecordKey, RecordStore, SheetApiStore, StoreError};
use qit_server::{build_router, AppState};
use serde_json::{json, Value};
use tower::util::ServiceExt;

/// One request seen by the fake server
#[derive(Debug, Clone)]
struct Call {
    method: Method,
    path: String,
    authorization: Option<String>,
    body: String,
}

#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Recorder {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn last(&self) -> Call {
        self.calls().last().cloned().expect("Should have received a request")
    }
}

fn sheet_record(auto_usn: &str) -> Value {
    json!({
        "ID": RecordId::new().to_string(),
        "Inspection Date": "2025-03-21",
        "Project": "PX1",
        "Stage": "FQC",
        "Line": "L2",
        "Shift": "Day",
        "Carton ID": "C-1",
        "Auto USN": auto_usn,
        "Manual USN": auto_usn,
        "Result": "OK"
    })
}

/// Fake sheet API and chat-completions endpoint, routed by method and path
async fn fake_remote(
    State(recorder): State<Recorder>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let path = uri.path().to_string();
    recorder.calls.lock().unwrap().push(Call {
        method: method.clone(),
        path: path.clone(),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        body,
    });

    match (method, path.as_str()) {
        (Method::GET, "/records") => {
            Json(json!([sheet_record("A1"), sheet_record("A2"), {"Project": "orphan"}]))
                .into_response()
        }
        (Method::GET, "/bad") => Json(json!({ "rows": [] })).into_response(),
        (_, "/records/41") => StatusCode::NOT_FOUND.into_response(),
        (_, "/down") => (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response(),
        (Method::POST, "/v1/chat/completions") => Json(json!({
            "choices": [{
                "message": { "role": "assistant", "content": "There is a deep SCRATCH on the back." }
            }]
        }))
        .into_response(),
        (Method::POST, "/v1/limited") => {
            (StatusCode::TOO_MANY_REQUESTS, "rate limited").into_response()
        }
        (Method::POST, "/v1/empty") => Json(json!({ "choices": [] })).into_response(),
        _ => Json(json!({})).into_response(),
    }
}

/// Start the fake server, returning its base URL
async fn spawn_remote() -> (String, Recorder) {
    let recorder = Recorder::default();
    let app = Router::new()
        .fallback(fake_remote)
        .with_state(recorder.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), recorder)
}

fn sheet_store(base: &str, path: &str) -> SheetApiStore {
    SheetApiStore::new(&format!("{}{}", base, path), Duration::from_secs(5))
        .expect("Should build sheet store")
}

// =============================================================================
// Sheet API store
// =============================================================================

#[tokio::test]
async fn test_sheet_list_returns_raw_records() {
    let (base, recorder) = spawn_remote().await;
    let store = sheet_store(&base, "/records/");

    let records = store.list().await.unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(recorder.last().method, Method::GET);
    assert_eq!(recorder.last().path, "/records");

    let normalized = normalize_records(&records);
    assert_eq!(normalized.rows.len(), 2);
    assert_eq!(normalized.skipped.len(), 1);
    assert_eq!(normalized.skipped[0].0, 2);
}

#[tokio::test]
async fn test_sheet_list_rejects_non_array() {
    let (base, _) = spawn_remote().await;
    let err = sheet_store(&base, "/bad").list().await.unwrap_err();
    assert!(matches!(err, StoreError::Malformed(_)));
}

#[tokio::test]
async fn test_sheet_create_posts_wire_form() {
    let (base, recorder) = spawn_remote().await;
    let store = sheet_store(&base, "/records");
    let record: RawRecord = match sheet_record("A9") {
        Value::Object(map) => map,
        _ => unreachable!(),
    };
    let row = normalize_record(&record).unwrap();

    let id = store.create(&row).await.unwrap();
    assert_eq!(id, row.id);

    let call = recorder.last();
    assert_eq!(call.method, Method::POST);
    assert_eq!(call.path, "/records");
    let sent: Value = serde_json::from_str(&call.body).unwrap();
    assert_eq!(sent["Auto USN"], "A9");
    assert_eq!(sent["ID"], id.to_string());
    assert_eq!(sent["Defect Symptom"], "-");
}

#[tokio::test]
async fn test_sheet_key_addressing() {
    let (base, recorder) = spawn_remote().await;
    let store = sheet_store(&base, "/records");

    store.delete(RecordKey::row(7).unwrap()).await.unwrap();
    let call = recorder.last();
    assert_eq!(call.method, Method::DELETE);
    assert_eq!(call.path, "/records/6");

    let id = RecordId::new();
    let mut fields = RawRecord::new();
    fields.insert("Root Cause".into(), json!("Loose screw"));
    store.update(RecordKey::Id(id), &fields).await.unwrap();
    let call = recorder.last();
    assert_eq!(call.method, Method::PATCH);
    assert_eq!(call.path, format!("/records/id/{}", id));
    let sent: Value = serde_json::from_str(&call.body).unwrap();
    assert_eq!(sent, json!({ "Root Cause": "Loose screw" }));
}

#[tokio::test]
async fn test_sheet_errors() {
    let (base, _) = spawn_remote().await;

    let err = sheet_store(&base, "/records")
        .delete(RecordKey::Row(42))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(key) if key == "row 42"));

    let err = sheet_store(&base, "/down").list().await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Remote { status: 503, ref body } if body == "maintenance"
    ));
}

#[tokio::test]
async fn test_row_delete_through_api_reaches_remote_index() {
    let (base, recorder) = spawn_remote().await;
    let state = AppState::new(
        Arc::new(sheet_store(&base, "/records")),
        Arc::new(FixedClassifier::new("Dent")),
        CartonCatalog::builtin(),
    );
    let app = build_router(state);

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/records/row/3")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(recorder.last().path, "/records/2");
}

// =============================================================================
// Vision classifier
// =============================================================================

fn vision(base: &str, path: &str, api_key: Option<&str>) -> VisionClassifier {
    VisionClassifier::new(&ClassifierConfig {
        kind: ClassifierKind::Vision,
        endpoint: Some(format!("{}{}", base, path)),
        api_key: api_key.map(String::from),
        timeout_secs: 5,
        ..Default::default()
    })
    .expect("Should build classifier")
}

#[tokio::test]
async fn test_vision_matches_keyword_in_reply() {
    let (base, recorder) = spawn_remote().await;
    let classifier = vision(&base, "/v1/chat/completions", Some("test-key"));

    let result = classifier
        .classify("data:image/png;base64,iVBORw0KGgo=")
        .await
        .unwrap();
    assert_eq!(result.label, "Scratch");
    assert!(result.raw_text.contains("SCRATCH"));

    let call = recorder.last();
    assert_eq!(call.authorization.as_deref(), Some("Bearer test-key"));
    let sent: Value = serde_json::from_str(&call.body).unwrap();
    assert_eq!(sent["model"], "gpt-4o-mini");
    assert_eq!(
        sent["messages"][0]["content"][1]["image_url"]["url"],
        "data:image/png;base64,iVBORw0KGgo="
    );
}

#[tokio::test]
async fn test_vision_without_key_sends_no_auth() {
    let (base, recorder) = spawn_remote().await;
    vision(&base, "/v1/chat/completions", None)
        .classify("https://cdn.example.com/unit.jpg")
        .await
        .unwrap();
    assert!(recorder.last().authorization.is_none());
}

#[tokio::test]
async fn test_vision_errors() {
    let (base, _) = spawn_remote().await;

    let err = vision(&base, "/v1/limited", None)
        .classify("https://cdn.example.com/unit.jpg")
        .await
        .unwrap_err();
    assert!(matches!(err, ClassifierError::Api(429, _)));

    let err = vision(&base, "/v1/empty", None)
        .classify("https://cdn.example.com/unit.jpg")
        .await
        .unwrap_err();
    assert!(matches!(err, ClassifierError::Parse(_)));
}
