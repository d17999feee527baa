//! Mock DevTools target: `/json` listing plus one WebSocket per page.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::{serve, HELPER_CALL, HELPER_SOURCE};

#[derive(Clone, Debug)]
pub struct MockOptions {
    pub initial_url: String,
    /// `document.readyState` answers `loading` this many times after each navigation.
    pub settle_polls: u32,
    /// `/json` answers with an empty list this many times first.
    pub empty_polls: u32,
    /// Hold `echo:` replies until this many are pending, then send them in reverse order.
    pub hold_batch: usize,
    /// Navigating to another scheme closes the socket and re-lists the page under a new id.
    pub teardown_on_scheme_change: bool,
    /// After a teardown, list an unrelated page ahead of the navigated one.
    pub decoy_after_teardown: bool,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            initial_url: "https://example.test/".into(),
            settle_polls: 0,
            empty_polls: 0,
            hold_batch: 0,
            teardown_on_scheme_change: false,
            decoy_after_teardown: false,
        }
    }
}

struct Page {
    id: String,
    url: String,
    loading_polls: u32,
}

struct TargetState {
    addr: Option<SocketAddr>,
    options: MockOptions,
    pages: Vec<Page>,
    empty_polls: u32,
    listing_hits: u32,
    generation: u32,
    helper_injected: bool,
    navigations: Vec<String>,
    held: Vec<String>,
}

#[derive(Clone)]
pub struct MockDevtools {
    state: Arc<Mutex<TargetState>>,
}

enum Outbound {
    Text(String),
    Close,
}

impl MockDevtools {
    pub async fn start(options: MockOptions) -> (Self, SocketAddr) {
        let mock = Self {
            state: Arc::new(Mutex::new(TargetState {
                addr: None,
                pages: vec![Page {
                    id: "page-0".into(),
                    url: options.initial_url.clone(),
                    loading_polls: 0,
                }],
                empty_polls: options.empty_polls,
                options,
                listing_hits: 0,
                generation: 0,
                helper_injected: false,
                navigations: Vec::new(),
                held: Vec::new(),
            })),
        };
        let router = Router::new()
            .route("/json", get(listing))
            .route("/devtools/page/:id", get(upgrade))
            .with_state(mock.clone());
        let addr = serve(router).await;
        mock.state.lock().addr = Some(addr);
        (mock, addr)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    pub fn listing_hits(&self) -> u32 {
        self.state.lock().listing_hits
    }

    pub fn generation(&self) -> u32 {
        self.state.lock().generation
    }

    /// Handle one request. Returns `false` once the socket should close.
    fn handle(&self, page_id: &str, request: Value, tx: &mpsc::UnboundedSender<Outbound>) -> bool {
        let id = request.get("id").and_then(Value::as_u64).unwrap_or_default();
        let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
        let params = request.get("params").cloned().unwrap_or(Value::Null);
        let reply = |result: Value| json!({ "id": id, "result": result }).to_string();

        match method {
            "Runtime.evaluate" => {
                let expression = params
                    .get("expression")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.evaluate(page_id, id, &expression, tx)
            }
            "Page.navigate" => {
                let url = params.get("url").and_then(Value::as_str).unwrap_or_default();
                let mut state = self.state.lock();
                state.navigations.push(url.to_string());
                let settle_polls = state.options.settle_polls;
                let teardown = state.options.teardown_on_scheme_change;
                let decoy = state.options.decoy_after_teardown;
                state.generation += 1;
                let generation = state.generation;
                let Some(page) = state.pages.iter_mut().find(|p| p.id == page_id) else {
                    return false;
                };
                let scheme_changed = scheme(&page.url) != scheme(url);
                page.url = url.to_string();
                page.loading_polls = settle_polls;
                let _ = tx.send(Outbound::Text(reply(json!({ "frameId": "F1", "loaderId": format!("L{generation}") }))));
                if teardown && scheme_changed {
                    page.id = format!("page-{generation}");
                    if decoy {
                        state.pages.insert(
                            0,
                            Page {
                                id: "decoy".into(),
                                url: "https://decoy.test/".into(),
                                loading_polls: 0,
                            },
                        );
                    }
                    let _ = tx.send(Outbound::Close);
                    return false;
                }
                true
            }
            _ => {
                let _ = tx.send(Outbound::Text(
                    json!({ "id": id, "error": { "code": -32601, "message": format!("'{method}' wasn't found") } })
                        .to_string(),
                ));
                true
            }
        }
    }

    fn evaluate(
        &self,
        page_id: &str,
        id: u64,
        expression: &str,
        tx: &mpsc::UnboundedSender<Outbound>,
    ) -> bool {
        let value_reply = |value: Value| {
            let kind = match &value {
                Value::String(_) => "string",
                Value::Number(_) => "number",
                Value::Bool(_) => "boolean",
                _ => "object",
            };
            json!({ "id": id, "result": { "result": { "type": kind, "value": value } } }).to_string()
        };
        let undefined_reply =
            json!({ "id": id, "result": { "result": { "type": "undefined" } } }).to_string();
        let exception_reply = |class: &str, description: String| {
            json!({
                "id": id,
                "result": {
                    "result": { "type": "object", "subtype": "error", "className": class },
                    "exceptionDetails": {
                        "exceptionId": 1,
                        "text": "Uncaught",
                        "exception": { "type": "object", "subtype": "error", "className": class, "description": description }
                    }
                }
            })
            .to_string()
        };

        let mut state = self.state.lock();
        match expression {
            "document.readyState" => {
                let ready = match state.pages.iter_mut().find(|p| p.id == page_id) {
                    Some(page) if page.loading_polls > 0 => {
                        page.loading_polls -= 1;
                        "loading"
                    }
                    _ => "complete",
                };
                let _ = tx.send(Outbound::Text(value_reply(json!(ready))));
            }
            "window.location.href" => {
                let url = state
                    .pages
                    .iter()
                    .find(|p| p.id == page_id)
                    .map(|p| p.url.clone())
                    .unwrap_or_default();
                let _ = tx.send(Outbound::Text(value_reply(json!(url))));
            }
            HELPER_SOURCE => {
                state.helper_injected = true;
                let _ = tx.send(Outbound::Text(undefined_reply));
            }
            HELPER_CALL => {
                let text = if state.helper_injected {
                    value_reply(json!(42))
                } else {
                    exception_reply(
                        "ReferenceError",
                        "ReferenceError: __toolkit is not defined\n    at <anonymous>:1:1".into(),
                    )
                };
                let _ = tx.send(Outbound::Text(text));
            }
            "boom()" => {
                let _ = tx.send(Outbound::Text(exception_reply(
                    "Error",
                    "Error: boom\n    at boom (<anonymous>:1:7)".into(),
                )));
            }
            "undefined" => {
                let _ = tx.send(Outbound::Text(undefined_reply));
            }
            "structured" => {
                let _ = tx.send(Outbound::Text(value_reply(json!({ "rows": [1, 2] }))));
            }
            "drop" => {
                let _ = tx.send(Outbound::Close);
                return false;
            }
            "split" => {
                let text = value_reply(json!("split-ok"));
                let third = text.len() / 3;
                let _ = tx.send(Outbound::Text(text[..third].to_string()));
                let _ = tx.send(Outbound::Text(text[third..2 * third].to_string()));
                let _ = tx.send(Outbound::Text(text[2 * third..].to_string()));
            }
            "garbage" => {
                let _ = tx.send(Outbound::Text("{\"id\": ]".into()));
                let _ = tx.send(Outbound::Text(value_reply(json!("garbage-ok"))));
            }
            "event" => {
                let _ = tx.send(Outbound::Text(
                    json!({ "method": "Page.frameNavigated", "params": { "frame": { "id": "F1" } } })
                        .to_string(),
                ));
                let _ = tx.send(Outbound::Text(value_reply(json!("event-ok"))));
            }
            other if other.starts_with("slow:") => {
                let delay = other["slow:".len()..].parse::<u64>().unwrap_or(100);
                let text = value_reply(json!("slow-ok"));
                let tx = tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    let _ = tx.send(Outbound::Text(text));
                });
            }
            other if other.starts_with("echo:") => {
                let text = value_reply(json!(&other["echo:".len()..]));
                let batch = state.options.hold_batch;
                if batch == 0 {
                    let _ = tx.send(Outbound::Text(text));
                } else {
                    state.held.push(text);
                    if state.held.len() >= batch {
                        for held in state.held.drain(..).rev() {
                            let _ = tx.send(Outbound::Text(held));
                        }
                    }
                }
            }
            _ => {
                let _ = tx.send(Outbound::Text(undefined_reply));
            }
        }
        true
    }
}

fn scheme(url: &str) -> &str {
    url.split_once(':').map(|(scheme, _)| scheme).unwrap_or_default()
}

async fn listing(State(mock): State<MockDevtools>) -> Json<Value> {
    let mut state = mock.state.lock();
    state.listing_hits += 1;
    if state.empty_polls > 0 {
        state.empty_polls -= 1;
        return Json(json!([]));
    }
    let Some(addr) = state.addr else {
        return Json(json!([]));
    };
    let mut entries = vec![
        json!({
            "id": "inspector",
            "type": "page",
            "title": "DevTools",
            "url": "devtools://devtools/bundled/inspector.html",
            "webSocketDebuggerUrl": format!("ws://{addr}/devtools/page/inspector"),
        }),
        json!({
            "id": "extension",
            "type": "background_page",
            "title": "Extension",
            "url": "chrome-extension://abcdefghijklmnop/background.html",
            "webSocketDebuggerUrl": format!("ws://{addr}/devtools/page/extension"),
        }),
    ];
    for page in &state.pages {
        entries.push(json!({
            "id": page.id,
            "type": "page",
            "title": "Example",
            "url": page.url,
            "devtoolsFrontendUrl": format!("/devtools/inspector.html?ws={addr}/devtools/page/{}", page.id),
            "webSocketDebuggerUrl": format!("ws://{addr}/devtools/page/{}", page.id),
        }));
    }
    Json(Value::Array(entries))
}

async fn upgrade(
    ws: WebSocketUpgrade,
    Path(page_id): Path<String>,
    State(mock): State<MockDevtools>,
) -> Response {
    let known = mock.state.lock().pages.iter().any(|p| p.id == page_id);
    if !known {
        return StatusCode::NOT_FOUND.into_response();
    }
    ws.on_upgrade(move |socket| session(socket, page_id, mock))
}

async fn session(socket: WebSocket, page_id: String, mock: MockDevtools) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Text(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });
    while let Some(Ok(message)) = stream.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(request) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        if !mock.handle(&page_id, request, &tx) {
            break;
        }
    }
    drop(tx);
    let _ = writer.await;
}
