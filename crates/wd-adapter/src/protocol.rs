//! [`Protocol`] implementation over the REST session.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tether_core_types::{
    DocumentState, EngineError, EngineErrorKind, Protocol, RemoteValue, SessionLog,
    SettlePolicy, TransportKind,
};
use tether_wait::Deadline;
use tracing::{debug, info};

use crate::config::WebDriverConfig;
use crate::envelope::ReplyOutcome;
use crate::session::RestSession;

/// Returned in place of `undefined`, which the REST channel would otherwise flatten to `null`.
pub const UNDEFINED_SENTINEL: &str = "__tether_undefined__";

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Global-scope evaluation of `arguments[0]`, matching the socket transport's semantics for
/// both expressions and statement lists.
pub fn execute_body(expression: &str) -> Value {
    let script = format!(
        "var value = (0, eval)(arguments[0]); \
         return value === undefined ? \"{UNDEFINED_SENTINEL}\" : value;"
    );
    json!({ "script": script, "args": [expression] })
}

pub struct WebDriverProtocol {
    session: RestSession,
}

impl WebDriverProtocol {
    pub async fn create(config: WebDriverConfig, timeout: Duration) -> Result<Self, EngineError> {
        Ok(Self {
            session: RestSession::create(config, timeout).await?,
        })
    }

    pub fn session(&self) -> &RestSession {
        &self.session
    }

    pub fn log(&self) -> &SessionLog {
        self.session.log()
    }
}

#[async_trait]
impl Protocol for WebDriverProtocol {
    fn kind(&self) -> TransportKind {
        TransportKind::Webdriver
    }

    fn supports_structured_results(&self) -> bool {
        false
    }

    fn is_connected(&self) -> bool {
        self.session.is_open()
    }

    async fn evaluate(
        &self,
        expression: &str,
        timeout: Duration,
    ) -> Result<RemoteValue, EngineError> {
        let outcome = self
            .session
            .command(Method::POST, "execute", Some(execute_body(expression)), timeout)
            .await?;
        Ok(match outcome {
            ReplyOutcome::Success(Value::String(text)) if text == UNDEFINED_SENTINEL => {
                RemoteValue::Undefined
            }
            ReplyOutcome::Success(value) => RemoteValue::Value(value),
            ReplyOutcome::ScriptError(exception) => RemoteValue::Exception(exception),
            other => {
                return Err(EngineError::new(EngineErrorKind::Protocol)
                    .with_hint(format!("unexpected execute reply {other:?}")))
            }
        })
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), EngineError> {
        match self
            .session
            .command(Method::POST, "url", Some(json!({ "url": url })), timeout)
            .await?
        {
            ReplyOutcome::Success(_) => Ok(()),
            other => Err(EngineError::new(EngineErrorKind::Navigation)
                .with_hint(format!("{url}: {other:?}"))),
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
        Ok(policy.accepts(state))
    }

    async fn current_url(&self, timeout: Duration) -> Result<String, EngineError> {
        match self.evaluate("window.location.href", timeout).await? {
            RemoteValue::Value(Value::String(url)) => Ok(url),
            other => Err(EngineError::new(EngineErrorKind::Protocol)
                .with_hint(format!("location query returned {other:?}"))),
        }
    }

    /// Open a fresh remote session, pointing it at `target_hint` when one is given.
    async fn reconnect(
        &self,
        target_hint: Option<&str>,
        timeout: Duration,
    ) -> Result<(), EngineError> {
        let deadline = Deadline::after(timeout);
        if self.session.is_open() {
            if let Err(err) = self.session.delete(deadline.remaining()).await {
                debug!(target: "wd-transport", error = %err, "previous session not deleted");
            }
        }
        self.session.open(deadline.remaining()).await?;
        if let Some(hint) = target_hint {
            self.navigate(hint, deadline.remaining()).await?;
        }
        info!(target: "wd-transport", base = %self.session.base(), "session re-established");
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.session.delete(CLOSE_TIMEOUT).await
    }
}
