//! Request/response correlation over one [`SocketConnection`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tether_core_types::{EngineError, EngineErrorKind, Request};
use tether_wait::{wait_until, Deadline};
use tokio::time::Instant;
use tracing::debug;

use crate::metrics;
use crate::transport::SocketConnection;

pub struct RequestCorrelator {
    connection: Arc<SocketConnection>,
    next_id: AtomicU64,
    response_poll: Duration,
}

impl RequestCorrelator {
    pub fn new(connection: Arc<SocketConnection>, response_poll: Duration) -> Self {
        Self {
            connection,
            next_id: AtomicU64::new(1),
            response_poll,
        }
    }

    pub fn connection(&self) -> &Arc<SocketConnection> {
        &self.connection
    }

    /// Ids increase monotonically and are never reused for the lifetime of the connection.
    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send `method` and wait for the response carrying the same id.
    ///
    /// Any number of calls may be outstanding at once. On timeout the pending entry is dropped,
    /// so a response that shows up later is discarded by the receive loop instead of being
    /// handed to another caller.
    pub async fn send_and_await(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, EngineError> {
        let deadline = Deadline::after(timeout);
        let id = self.allocate_id();
        let table = self.connection.table();
        if !table.register(id, method) {
            return Err(EngineError::new(EngineErrorKind::Internal)
                .with_hint(format!("request id {id} already outstanding")));
        }
        metrics::record_command(method);
        let started = Instant::now();
        let request = Request {
            id,
            method: method.to_string(),
            params,
        };
        if let Err(err) = self.connection.send(&request, deadline.remaining()).await {
            table.abandon(id);
            metrics::record_command_failure(method);
            return Err(err);
        }

        let connection = &self.connection;
        wait_until(
            || table.is_ready(id) || !connection.is_open(),
            deadline.remaining(),
            self.response_poll,
        )
        .await;

        if let Some(payload) = table.take(id) {
            let decoded = decode_reply(id, method, payload);
            match &decoded {
                Ok(_) => metrics::record_command_success(method, started.elapsed()),
                Err(_) => metrics::record_command_failure(method),
            }
            return decoded;
        }

        table.abandon(id);
        metrics::record_command_failure(method);
        let detail = json!({ "id": id, "method": method });
        if !self.connection.is_open() {
            return Err(EngineError::disconnected(format!(
                "socket closed while awaiting request {id} ({method})"
            ))
            .with_data(detail));
        }
        debug!(target: "cdp-correlator", id, method, ?timeout, "abandoning request");
        Err(EngineError::new(EngineErrorKind::CorrelationTimeout {
            id,
            method: method.to_string(),
        })
        .with_hint(format!("after {}ms", timeout.as_millis()))
        .retriable(true)
        .with_data(detail))
    }
}

/// Unwrap `{id, result}` or turn `{id, error}` into a remote error.
pub fn decode_reply(id: u64, method: &str, payload: Value) -> Result<Value, EngineError> {
    let Value::Object(mut message) = payload else {
        return Err(EngineError::new(EngineErrorKind::Protocol)
            .with_hint(format!("reply to {method} (id {id}) is not an object")));
    };
    if let Some(error) = message.remove("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let text = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no message")
            .to_string();
        return Err(EngineError::new(EngineErrorKind::Remote { code })
            .with_hint(format!("{method}: {text}"))
            .with_data(error));
    }
    message.remove("result").ok_or_else(|| {
        EngineError::new(EngineErrorKind::Protocol)
            .with_hint(format!("reply to {method} (id {id}) carries neither result nor error"))
    })
}
