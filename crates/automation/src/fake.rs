//! In-memory [`Protocol`] used by the unit tests of this crate.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tether_core_types::{
    DocumentState, EngineError, EngineErrorKind, Protocol, RemoteValue, ScriptException,
    SettlePolicy, TransportKind,
};

use crate::script::{marker_write_script, MARKER_READ_SCRIPT};

struct Helper {
    expression: String,
    value: Value,
}

#[derive(Default)]
struct FakeState {
    url: String,
    connected: bool,
    navigations: Vec<String>,
    reconnects: u32,
    failing_reconnects: u32,
    closes: u32,
    loading_polls: u32,
    settle_after: u32,
    drop_on_navigate: bool,
    values: HashMap<String, Value>,
    helpers: HashMap<String, Helper>,
    injected: HashSet<String>,
    injections: u32,
    marker: Option<String>,
    marker_writes: u32,
}

pub(crate) struct FakeProtocol {
    state: Mutex<FakeState>,
    structured: bool,
}

impl FakeProtocol {
    pub(crate) fn new(url: &str) -> Self {
        Self {
            state: Mutex::new(FakeState {
                url: url.to_string(),
                connected: true,
                ..FakeState::default()
            }),
            structured: true,
        }
    }

    pub(crate) fn without_structured_results(mut self) -> Self {
        self.structured = false;
        self
    }

    /// Readiness polls that report `loading` after each navigation.
    pub(crate) fn settle_after(self, polls: u32) -> Self {
        self.state.lock().settle_after = polls;
        self
    }

    /// Tear the channel down as part of every navigation.
    pub(crate) fn drop_on_navigate(self) -> Self {
        self.state.lock().drop_on_navigate = true;
        self
    }

    pub(crate) fn fail_reconnects(&self, count: u32) {
        self.state.lock().failing_reconnects = count;
    }

    pub(crate) fn set_value(&self, expression: &str, value: Value) {
        self.state.lock().values.insert(expression.to_string(), value);
    }

    pub(crate) fn define_helper(&self, source: &str, expression: &str, value: Value) {
        self.state.lock().helpers.insert(
            source.to_string(),
            Helper {
                expression: expression.to_string(),
                value,
            },
        );
    }

    pub(crate) fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    pub(crate) fn reconnects(&self) -> u32 {
        self.state.lock().reconnects
    }

    pub(crate) fn closes(&self) -> u32 {
        self.state.lock().closes
    }

    pub(crate) fn injections(&self) -> u32 {
        self.state.lock().injections
    }

    pub(crate) fn marker_writes(&self) -> u32 {
        self.state.lock().marker_writes
    }

    fn respond(&self, expression: &str) -> Result<RemoteValue, EngineError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(EngineError::disconnected("fake channel closed"));
        }
        match expression {
            "document.readyState" => {
                let ready = if state.loading_polls > 0 {
                    state.loading_polls -= 1;
                    "loading"
                } else {
                    "complete"
                };
                return Ok(RemoteValue::Value(Value::String(ready.into())));
            }
            "window.location.href" => return Ok(RemoteValue::Value(Value::String(state.url.clone()))),
            _ => {}
        }
        if expression == MARKER_READ_SCRIPT {
            return Ok(RemoteValue::Value(
                state.marker.take().map(Value::String).unwrap_or(Value::Null),
            ));
        }
        if state.helpers.contains_key(expression) {
            state.injected.insert(expression.to_string());
            state.injections += 1;
            return Ok(RemoteValue::Undefined);
        }
        let helper_value = state
            .helpers
            .iter()
            .find(|(_, helper)| helper.expression == expression)
            .map(|(source, helper)| (source.clone(), helper.value.clone()));
        if let Some((source, value)) = helper_value {
            if state.injected.contains(&source) {
                return Ok(RemoteValue::Value(value));
            }
            return Ok(RemoteValue::Exception(ScriptException {
                class_name: Some("ReferenceError".into()),
                message: format!("ReferenceError: {expression} is not defined"),
            }));
        }
        let marked = state
            .values
            .iter()
            .find(|(inner, _)| marker_write_script(inner) == expression)
            .map(|(_, value)| value.to_string());
        if let Some(serialized) = marked {
            state.marker = Some(serialized);
            state.marker_writes += 1;
            return Ok(RemoteValue::Value(Value::Bool(true)));
        }
        Ok(state
            .values
            .get(expression)
            .cloned()
            .map(RemoteValue::Value)
            .unwrap_or(RemoteValue::Undefined))
    }
}

#[async_trait]
impl Protocol for FakeProtocol {
    fn kind(&self) -> TransportKind {
        if self.structured {
            TransportKind::Devtools
        } else {
            TransportKind::Webdriver
        }
    }

    fn supports_structured_results(&self) -> bool {
        self.structured
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn evaluate(
        &self,
        expression: &str,
        _timeout: Duration,
    ) -> Result<RemoteValue, EngineError> {
        self.respond(expression)
    }

    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(EngineError::disconnected("fake channel closed"));
        }
        state.navigations.push(url.to_string());
        state.url = url.to_string();
        state.loading_polls = state.settle_after;
        if state.drop_on_navigate {
            state.connected = false;
            return Err(EngineError::disconnected("torn down by navigation"));
        }
        Ok(())
    }

    async fn is_settled(
        &self,
        policy: SettlePolicy,
        timeout: Duration,
    ) -> Result<bool, EngineError> {
        if !self.is_connected() {
            return Ok(false);
        }
        match self.evaluate("document.readyState", timeout).await? {
            RemoteValue::Value(Value::String(raw)) => Ok(policy.accepts(DocumentState::parse(&raw))),
            _ => Ok(false),
        }
    }

    async fn current_url(&self, _timeout: Duration) -> Result<String, EngineError> {
        let state = self.state.lock();
        if !state.connected {
            return Err(EngineError::disconnected("fake channel closed"));
        }
        Ok(state.url.clone())
    }

    async fn reconnect(
        &self,
        _target_hint: Option<&str>,
        _timeout: Duration,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.reconnects += 1;
        if state.failing_reconnects > 0 {
            state.failing_reconnects -= 1;
            return Err(EngineError::new(EngineErrorKind::Discovery).with_hint("target not listed yet"));
        }
        state.connected = true;
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.closes += 1;
        state.connected = false;
        Ok(())
    }
}
