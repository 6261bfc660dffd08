//! In-process mock of the attendance service.
//!
//! Serves the JSON endpoints the client talks to from shared in-memory
//! state, and records what it receives so tests can assert on payloads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use rollcall::api::ApiClient;
use rollcall::GlobalConfig;

/// Mutable state behind the mock server.
#[derive(Debug, Default)]
pub struct MockState {
    pub sessions: Vec<Value>,
    pub attendance: Vec<Value>,
    pub counts: HashMap<i64, u64>,
    pub failing_counts: Vec<i64>,
    pub face_ok: bool,
    pub speech_ok: bool,
    pub mark_error: Option<(u16, String)>,
    pub mark_html_error: Option<u16>,
    pub fail_sessions: bool,
    pub export: Option<Vec<u8>>,
    pub ip_lookup: Option<Value>,
    pub next_id: i64,
    pub session_requests: usize,
    pub mark_requests: Vec<Value>,
    pub created: Vec<Value>,
    pub updates: Vec<(i64, Value)>,
    pub deleted: Vec<i64>,
    pub speech_queries: Vec<HashMap<String, String>>,
    pub attendance_queries: Vec<HashMap<String, String>>,
    pub csrf_tokens: Vec<Option<String>>,
}

pub type Shared = Arc<Mutex<MockState>>;

/// Running mock server.
pub struct MockServer {
    pub base_url: String,
    pub state: Shared,
    cancel: CancellationToken,
}

impl MockServer {
    /// Configuration pointing at this server, with a student and teacher set.
    pub fn config(&self) -> GlobalConfig {
        let mut config = GlobalConfig::with_base_url(&self.base_url).expect("config");
        config.student.student_id = Some("21BCE1234".into());
        config.teacher.teacher_id = Some(7);
        config.ip_lookup_url = format!("{}/ip", self.base_url);
        config
    }

    /// Client for this server.
    pub fn client(&self) -> ApiClient {
        ApiClient::new(&self.config()).expect("client")
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut guard = self.state.lock().expect("mock state lock");
        f(&mut guard)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Session JSON as the server emits it, relative to now.
pub fn session_json(
    id: i64,
    class_name: &str,
    start_offset_min: i64,
    end_offset_min: i64,
) -> Value {
    let now = Utc::now();
    json!({
        "id": id,
        "teacher_id": 7,
        "class_name": class_name,
        "start_ts": iso(now + Duration::minutes(start_offset_min)),
        "end_ts": iso(now + Duration::minutes(end_offset_min)),
        "lat": null,
        "lng": null,
        "radius_m": null,
    })
}

/// Same as [`session_json`] with a geofence.
pub fn fenced_session_json(
    id: i64,
    class_name: &str,
    start_offset_min: i64,
    end_offset_min: i64,
    (lat, lng, radius_m): (f64, f64, f64),
) -> Value {
    let mut value = session_json(id, class_name, start_offset_min, end_offset_min);
    value["lat"] = json!(lat);
    value["lng"] = json!(lng);
    value["radius_m"] = json!(radius_m);
    value
}

fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

fn error(status: u16, message: &str) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(json!({ "error": message }))).into_response()
}

/// Error page as a framework would render it, not JSON.
fn html_error(status: u16) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [("content-type", "text/html; charset=utf-8")],
        "<!doctype html>\n<html lang=en>\n<title>404 Not Found</title>\n\
         <h1>Not Found</h1>\n<p>The requested URL was not found on the server.</p>\n",
    )
        .into_response()
}

fn record_csrf(state: &mut MockState, headers: &HeaderMap) {
    let token = headers
        .get("X-CSRFToken")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    state.csrf_tokens.push(token);
}

async fn list_sessions(State(state): State<Shared>) -> Response {
    let mut state = state.lock().expect("lock");
    state.session_requests += 1;
    if state.fail_sessions {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    Json(Value::Array(state.sessions.clone())).into_response()
}

async fn create_session(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().expect("lock");
    record_csrf(&mut state, &headers);
    if !matches!(body["class_name"].as_str(), Some(name) if !name.trim().is_empty()) {
        return error(400, "missing field: class_name");
    }
    state.next_id += 1;
    let id = state.next_id + 100;
    let mut stored = body.clone();
    stored["id"] = json!(id);
    state.sessions.push(stored);
    state.created.push(body);
    (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
}

async fn update_session(
    State(state): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().expect("lock");
    record_csrf(&mut state, &headers);
    state.updates.push((id, body.clone()));
    let Some(session) = state
        .sessions
        .iter_mut()
        .find(|s| s["id"].as_i64() == Some(id))
    else {
        return error(404, "Not Found");
    };
    if let (Some(target), Some(fields)) = (session.as_object_mut(), body.as_object()) {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
    Json(json!({ "ok": true })).into_response()
}

async fn delete_session(
    State(state): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().expect("lock");
    record_csrf(&mut state, &headers);
    let before = state.sessions.len();
    state.sessions.retain(|s| s["id"].as_i64() != Some(id));
    if state.sessions.len() == before {
        return error(404, "Not Found");
    }
    state.deleted.push(id);
    Json(json!({ "ok": true })).into_response()
}

async fn attendance_count(State(state): State<Shared>, Path(id): Path<i64>) -> Response {
    let state = state.lock().expect("lock");
    if state.failing_counts.contains(&id) {
        return error(500, "count failed");
    }
    let count = state.counts.get(&id).copied().unwrap_or(0);
    Json(json!({ "count": count })).into_response()
}

async fn list_attendance(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut state = state.lock().expect("lock");
    state.attendance_queries.push(query);
    Json(Value::Array(state.attendance.clone())).into_response()
}

async fn mark_attendance(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut state = state.lock().expect("lock");
    record_csrf(&mut state, &headers);
    state.mark_requests.push(body.clone());
    if let Some((status, message)) = state.mark_error.clone() {
        return error(status, &message);
    }
    if let Some(status) = state.mark_html_error {
        return html_error(status);
    }
    let id = i64::try_from(state.attendance.len()).unwrap_or(0) + 1;
    state.attendance.push(json!({
        "id": id,
        "session_id": body["session_id"],
        "student_id": 2,
        "marked_at": iso(Utc::now()),
        "speech_ok": body["speech_ok"],
        "face_ok": body["face_ok"],
        "geo_ok": true,
    }));
    (
        StatusCode::CREATED,
        Json(json!({ "ok": true, "id": id, "message": "Attendance marked & Excel updated" })),
    )
        .into_response()
}

async fn face_verif(State(state): State<Shared>) -> Response {
    let ok = state.lock().expect("lock").face_ok;
    if ok {
        Json(json!({ "ok": true })).into_response()
    } else {
        Json(json!({ "ok": false, "message": "No matching face" })).into_response()
    }
}

async fn speech_phrase() -> Json<Value> {
    Json(json!({ "phrase": "seven blue rivers" }))
}

async fn speech_verif(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let mut state = state.lock().expect("lock");
    state.speech_queries.push(query);
    Json(json!({ "ok": state.speech_ok }))
}

async fn export(State(state): State<Shared>) -> Response {
    match state.lock().expect("lock").export.clone() {
        Some(bytes) => (StatusCode::OK, bytes).into_response(),
        None => error(404, "No attendance file found"),
    }
}

async fn ip_lookup(State(state): State<Shared>) -> Response {
    match state.lock().expect("lock").ip_lookup.clone() {
        Some(body) => Json(body).into_response(),
        None => Json(json!({ "status": "fail", "message": "private range" })).into_response(),
    }
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/api/sessions", get(list_sessions).post(create_session))
        .route("/api/sessions/{id}", put(update_session).delete(delete_session))
        .route("/api/sessions/{id}/attendance_count", get(attendance_count))
        .route("/api/attendance", get(list_attendance).post(mark_attendance))
        .route("/api/export_attendance", get(export))
        .route("/face_verif", get(face_verif))
        .route("/speech_verif_phrase", get(speech_phrase))
        .route("/speech_verif", post(speech_verif))
        .route("/ip", get(ip_lookup))
        .with_state(state)
}

/// Spawn the mock on an ephemeral port.
pub async fn spawn_mock(initial: MockState) -> MockServer {
    let state: Shared = Arc::new(Mutex::new(initial));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");
    let cancel = CancellationToken::new();

    let app = router(Arc::clone(&state));
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
    });

    MockServer {
        base_url: format!("http://{addr}"),
        state,
        cancel,
    }
}

