//! Mock REST automation driver speaking the `{sessionId, status, value}` envelope.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tether_automation::script::{marker_write_script, MARKER_READ_SCRIPT, MARKER_UNDEFINED};
use wd_adapter::protocol::UNDEFINED_SENTINEL;

use super::{serve, HELPER_CALL, HELPER_SOURCE};

#[derive(Clone, Debug)]
pub struct DriverOptions {
    pub initial_url: String,
    /// `POST /session` fails this many times before succeeding.
    pub create_failures: u32,
    /// `document.readyState` answers `loading` this many times after each navigation.
    pub settle_polls: u32,
    /// The first navigation invalidates the session, as a crashed window would.
    pub expire_on_first_navigation: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            initial_url: "about:blank".into(),
            create_failures: 0,
            settle_polls: 0,
            expire_on_first_navigation: false,
        }
    }
}

#[derive(Default)]
struct DriverState {
    options: Option<DriverOptions>,
    live: Option<String>,
    created: u32,
    create_attempts: u32,
    create_failures: u32,
    deletes: u32,
    navigations: Vec<String>,
    url: String,
    loading_polls: u32,
    helper_injected: bool,
    marker: Option<String>,
    marker_writes: u32,
    capabilities: Vec<Value>,
}

#[derive(Clone)]
pub struct MockDriver {
    state: Arc<Mutex<DriverState>>,
}

type Reply = (StatusCode, Json<Value>);

impl MockDriver {
    pub async fn start(options: DriverOptions) -> (Self, SocketAddr) {
        let state = DriverState {
            url: options.initial_url.clone(),
            create_failures: options.create_failures,
            options: Some(options),
            ..DriverState::default()
        };
        let driver = Self {
            state: Arc::new(Mutex::new(state)),
        };
        let router = Self::router(driver.clone());
        let addr = serve(router).await;
        (driver, addr)
    }

    pub fn router(driver: MockDriver) -> Router {
        Router::new()
            .route("/session", post(create_session))
            .route("/session/:id", delete(delete_session))
            .route("/session/:id/url", post(navigate))
            .route("/session/:id/execute", post(execute))
            .with_state(driver)
    }

    pub fn create_attempts(&self) -> u32 {
        self.state.lock().create_attempts
    }

    pub fn sessions_created(&self) -> u32 {
        self.state.lock().created
    }

    pub fn deletes(&self) -> u32 {
        self.state.lock().deletes
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    pub fn marker_writes(&self) -> u32 {
        self.state.lock().marker_writes
    }

    pub fn live_session(&self) -> Option<String> {
        self.state.lock().live.clone()
    }

    pub fn capabilities(&self) -> Vec<Value> {
        self.state.lock().capabilities.clone()
    }
}

fn ok(session: &str, value: Value) -> Reply {
    (
        StatusCode::OK,
        Json(json!({ "sessionId": session, "status": 0, "value": value })),
    )
}

fn script_error(session: &str, message: &str) -> Reply {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "sessionId": session,
            "status": 17,
            "value": { "message": format!("javascript error: {message}") }
        })),
    )
}

fn unknown_session(id: &str) -> Reply {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "value": {
                "error": "invalid session id",
                "message": format!("session {id} does not exist"),
                "stacktrace": ""
            }
        })),
    )
}

async fn create_session(State(driver): State<MockDriver>, Json(body): Json<Value>) -> Reply {
    let mut state = driver.state.lock();
    state.create_attempts += 1;
    state.capabilities.push(body);
    if state.create_failures > 0 {
        state.create_failures -= 1;
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": 33, "value": { "message": "session not created: driver starting" } })),
        );
    }
    state.created += 1;
    let id = format!("wd-{}", state.created);
    state.live = Some(id.clone());
    state.marker = None;
    (
        StatusCode::OK,
        Json(json!({ "value": { "sessionId": id, "capabilities": { "browserName": "mock" } } })),
    )
}

async fn delete_session(State(driver): State<MockDriver>, Path(id): Path<String>) -> Reply {
    let mut state = driver.state.lock();
    if state.live.as_deref() != Some(id.as_str()) {
        return unknown_session(&id);
    }
    state.live = None;
    state.deletes += 1;
    ok(&id, Value::Null)
}

async fn navigate(
    State(driver): State<MockDriver>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    let mut state = driver.state.lock();
    if state.live.as_deref() != Some(id.as_str()) {
        return unknown_session(&id);
    }
    let url = body.get("url").and_then(Value::as_str).unwrap_or_default().to_string();
    state.navigations.push(url.clone());
    state.url = url;
    let settle_polls = state.options.as_ref().map(|o| o.settle_polls).unwrap_or_default();
    state.loading_polls = settle_polls;
    let expire = state
        .options
        .as_ref()
        .map(|o| o.expire_on_first_navigation)
        .unwrap_or_default();
    if expire && state.navigations.len() == 1 {
        state.live = None;
        return unknown_session(&id);
    }
    ok(&id, Value::Null)
}

async fn execute(
    State(driver): State<MockDriver>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    let mut state = driver.state.lock();
    if state.live.as_deref() != Some(id.as_str()) {
        return unknown_session(&id);
    }
    let script = body.get("script").and_then(Value::as_str).unwrap_or_default();
    if !script.contains("arguments[0]") {
        return script_error(&id, "SyntaxError: unexpected script body");
    }
    let expression = body
        .get("args")
        .and_then(|args| args.get(0))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if expression == MARKER_READ_SCRIPT {
        let stored = state.marker.take().map(Value::String).unwrap_or(Value::Null);
        return ok(&id, stored);
    }
    for (inner, stored) in [
        ("structured", Some(json!({ "rows": [1, 2] }).to_string())),
        ("'plain'", Some(json!("plain").to_string())),
        ("undefined", Some(MARKER_UNDEFINED.to_string())),
        (HELPER_CALL, None),
    ] {
        if expression == marker_write_script(inner) {
            if inner == HELPER_CALL && !state.helper_injected {
                return script_error(&id, "ReferenceError: __toolkit is not defined");
            }
            state.marker_writes += 1;
            state.marker = Some(stored.unwrap_or_else(|| "42".to_string()));
            return ok(&id, json!(true));
        }
    }

    match expression.as_str() {
        "document.readyState" => {
            let ready = if state.loading_polls > 0 {
                state.loading_polls -= 1;
                "loading"
            } else {
                "complete"
            };
            ok(&id, json!(ready))
        }
        "window.location.href" => {
            let url = state.url.clone();
            ok(&id, json!(url))
        }
        HELPER_SOURCE => {
            state.helper_injected = true;
            ok(&id, json!(UNDEFINED_SENTINEL))
        }
        HELPER_CALL if state.helper_injected => ok(&id, json!(42)),
        HELPER_CALL => script_error(&id, "ReferenceError: __toolkit is not defined"),
        "boom()" => script_error(&id, "Error: boom"),
        "undefined" => ok(&id, json!(UNDEFINED_SENTINEL)),
        "null" => ok(&id, Value::Null),
        "'undefined'" => ok(&id, json!("undefined")),
        "1 + 1" => ok(&id, json!(2)),
        "document.title" => ok(&id, json!("Mock Page")),
        _ => ok(&id, json!(UNDEFINED_SENTINEL)),
    }
}
