//! The transport-agnostic contract every session variant implements.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::SettlePolicy;
use crate::error::EngineError;

/// One outbound remote procedure call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Persistent WebSocket with push-based responses.
    Devtools,
    /// Stateless HTTP request/response.
    Webdriver,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Devtools => "devtools",
            TransportKind::Webdriver => "webdriver",
        }
    }
}

/// `document.readyState` as reported by the remote document.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum DocumentState {
    Loading,
    Interactive,
    Complete,
    Unknown,
}

impl DocumentState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "loading" => DocumentState::Loading,
            "interactive" => DocumentState::Interactive,
            "complete" => DocumentState::Complete,
            _ => DocumentState::Unknown,
        }
    }
}

/// Exception raised by the remote runtime while evaluating an expression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptException {
    pub class_name: Option<String>,
    pub message: String,
}

impl ScriptException {
    /// True for the "symbol not defined" class of failures, e.g. a helper library that has not
    /// been injected yet.
    pub fn is_undefined_symbol(&self) -> bool {
        if self.class_name.as_deref() == Some("ReferenceError") {
            return true;
        }
        let message = self.message.as_str();
        message.starts_with("ReferenceError")
            || message.contains("is not defined")
            || message.contains("Cannot read properties of undefined")
            || (message.contains("Cannot read property") && message.contains("of undefined"))
    }
}

/// Raw evaluation result before normalization.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteValue {
    /// The expression legitimately evaluated to `undefined`.
    Undefined,
    Value(Value),
    /// Values JSON cannot carry (`NaN`, `Infinity`, `-0`, bigints) in their literal form.
    Unserializable(String),
    Exception(ScriptException),
}

/// Logical contract shared by the socket and REST transports.
///
/// Upper layers never branch on the transport kind; readiness in particular is decided by each
/// variant through [`Protocol::is_settled`].
#[async_trait]
pub trait Protocol: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Whether arbitrary structured values survive the return channel. Transports answering
    /// `false` get structured results through the marker-element convention.
    fn supports_structured_results(&self) -> bool;

    fn is_connected(&self) -> bool;

    async fn evaluate(&self, expression: &str, timeout: Duration)
        -> Result<RemoteValue, EngineError>;

    /// Issue the navigate call only; waiting for readiness is the caller's job.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), EngineError>;

    async fn is_settled(&self, policy: SettlePolicy, timeout: Duration)
        -> Result<bool, EngineError>;

    /// Live location of the remote document.
    async fn current_url(&self, timeout: Duration) -> Result<String, EngineError>;

    /// Re-discover and re-establish the session. `target_hint` names the URL the caller expects
    /// the session to be showing.
    async fn reconnect(&self, target_hint: Option<&str>, timeout: Duration)
        -> Result<(), EngineError>;

    /// Idempotent.
    async fn close(&self) -> Result<(), EngineError>;
}
