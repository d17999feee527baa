//! [`Protocol`] implementation over the DevTools socket.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use tether_core_types::{
    DocumentState, EngineConfig, EngineError, EngineErrorKind, Protocol, RemoteValue,
    ScriptException, SessionLog, SettlePolicy, TransportKind,
};
use tether_wait::Deadline;
use tracing::{debug, info};

use crate::config::CdpConfig;
use crate::correlator::RequestCorrelator;
use crate::discovery::{SessionDescriptor, SessionDiscovery};
use crate::transport::SocketConnection;

struct Attachment {
    descriptor: SessionDescriptor,
    correlator: RequestCorrelator,
}

/// A DevTools session that survives socket teardown by re-discovering its target.
pub struct CdpProtocol {
    config: CdpConfig,
    engine: EngineConfig,
    discovery: SessionDiscovery,
    attachment: RwLock<Option<Arc<Attachment>>>,
    log: SessionLog,
}

impl CdpProtocol {
    /// Discover a debuggable session and open its socket.
    pub async fn attach(config: CdpConfig, engine: EngineConfig) -> Result<Self, EngineError> {
        let discovery = SessionDiscovery::new(&config)?;
        let log = SessionLog::new(TransportKind::Devtools, discovery.endpoint().as_str());
        let protocol = Self {
            config,
            engine,
            discovery,
            attachment: RwLock::new(None),
            log,
        };
        let hint = protocol.config.target_hint.clone();
        protocol
            .establish(hint.as_deref(), protocol.engine.timeout())
            .await?;
        Ok(protocol)
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub async fn descriptor(&self) -> Option<SessionDescriptor> {
        self.attachment
            .read()
            .as_ref()
            .map(|attachment| attachment.descriptor.clone())
    }

    async fn establish(&self, hint: Option<&str>, timeout: Duration) -> Result<(), EngineError> {
        let deadline = Deadline::after(timeout);
        let descriptor = self.discovery.discover(hint, deadline.remaining()).await?;
        let endpoint = descriptor
            .websocket_url()
            .ok_or_else(|| {
                EngineError::new(EngineErrorKind::Discovery)
                    .with_hint(format!("session {} has no debugger endpoint", descriptor.id))
            })?
            .to_string();
        let reattaching = self.attachment.read().is_some();
        let log = if reattaching {
            self.log.reattached(&endpoint)
        } else {
            self.log.clone()
        };
        let connection =
            SocketConnection::connect(&endpoint, deadline.remaining(), &self.config, log).await?;
        let correlator = RequestCorrelator::new(Arc::new(connection), self.engine.response_poll());
        let attachment = Arc::new(Attachment {
            descriptor,
            correlator,
        });
        let previous = self.attachment.write().replace(attachment);
        if let Some(previous) = previous {
            previous.correlator.connection().close().await?;
        }
        self.log.span().in_scope(|| {
            info!(target: "cdp-transport", endpoint = %endpoint, reattaching, "session attached");
        });
        Ok(())
    }

    fn current(&self) -> Result<Arc<Attachment>, EngineError> {
        self.attachment
            .read()
            .clone()
            .ok_or_else(|| EngineError::disconnected("session is not attached"))
    }

    /// Raw request/response call on the current socket.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, EngineError> {
        let attachment = self.current()?;
        attachment
            .correlator
            .send_and_await(method, params, timeout)
            .await
    }
}

#[async_trait]
impl Protocol for CdpProtocol {
    fn kind(&self) -> TransportKind {
        TransportKind::Devtools
    }

    fn supports_structured_results(&self) -> bool {
        true
    }

    fn is_connected(&self) -> bool {
        self.attachment
            .read()
            .as_ref()
            .map(|attachment| attachment.correlator.connection().is_open())
            .unwrap_or(false)
    }

    async fn evaluate(
        &self,
        expression: &str,
        timeout: Duration,
    ) -> Result<RemoteValue, EngineError> {
        let reply = self
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
                timeout,
            )
            .await?;
        remote_value_from_evaluate(reply)
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), EngineError> {
        let reply = self
            .call("Page.navigate", json!({ "url": url }), timeout)
            .await?;
        match reply.get("errorText").and_then(Value::as_str) {
            Some(error) if !error.is_empty() => Err(EngineError::new(EngineErrorKind::Navigation)
                .with_hint(format!("{url}: {error}"))),
            _ => Ok(()),
        }
    }

    async fn is_settled(
        &self,
        policy: SettlePolicy,
        timeout: Duration,
    ) -> Result<bool, EngineError> {
        if !self.is_connected() {
            return Ok(false);
        }
        let state = match self.evaluate("document.readyState", timeout).await? {
            RemoteValue::Value(Value::String(raw)) => DocumentState::parse(&raw),
            _ => DocumentState::Unknown,
        };
        debug!(target: "navigation", ?state, "document state");
        Ok(policy.accepts(state) && self.is_connected())
    }

    async fn current_url(&self, timeout: Duration) -> Result<String, EngineError> {
        match self.evaluate("window.location.href", timeout).await? {
            RemoteValue::Value(Value::String(url)) => Ok(url),
            other => Err(EngineError::new(EngineErrorKind::Protocol)
                .with_hint(format!("location query returned {other:?}"))),
        }
    }

    async fn reconnect(
        &self,
        target_hint: Option<&str>,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        self.establish(target_hint, timeout).await
    }

    async fn close(&self) -> Result<(), EngineError> {
        let attachment = self.attachment.write().take();
        match attachment {
            Some(attachment) => attachment.correlator.connection().close().await,
            None => Ok(()),
        }
    }
}

/// Interpret a `Runtime.evaluate` result object.
pub fn remote_value_from_evaluate(reply: Value) -> Result<RemoteValue, EngineError> {
    if let Some(details) = reply.get("exceptionDetails") {
        let exception = details.get("exception");
        let class_name = exception
            .and_then(|e| e.get("className"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let message = exception
            .and_then(|e| e.get("description"))
            .and_then(Value::as_str)
            .or_else(|| details.get("text").and_then(Value::as_str))
            .unwrap_or("Uncaught")
            .to_string();
        return Ok(RemoteValue::Exception(ScriptException {
            class_name,
            message,
        }));
    }
    let Some(result) = reply.get("result") else {
        return Err(EngineError::new(EngineErrorKind::Protocol)
            .with_hint("evaluate reply carries no result object"));
    };
    if let Some(raw) = result.get("unserializableValue").and_then(Value::as_str) {
        return Ok(RemoteValue::Unserializable(raw.to_string()));
    }
    if result.get("type").and_then(Value::as_str) == Some("undefined") {
        return Ok(RemoteValue::Undefined);
    }
    if let Some(value) = result.get("value") {
        return Ok(RemoteValue::Value(value.clone()));
    }
    if result.get("subtype").and_then(Value::as_str) == Some("null") {
        return Ok(RemoteValue::Value(Value::Null));
    }
    match result.get("description").and_then(Value::as_str) {
        Some(description) => Ok(RemoteValue::Value(Value::String(description.to_string()))),
        None => Ok(RemoteValue::Undefined),
    }
}
