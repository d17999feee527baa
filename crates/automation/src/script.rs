//! Script evaluation with result normalization.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tether_core_types::{EngineError, EngineErrorKind, Protocol, RemoteValue};
use tracing::{debug, info};

/// Id of the hidden element used to hand structured results back over constrained channels.
pub const MARKER_ELEMENT_ID: &str = "__tether_marker";
/// Attribute of the marker element holding the serialized result.
pub const MARKER_ATTRIBUTE: &str = "data-tether-result";
/// Stored in place of a JSON text when the expression evaluated to `undefined`.
pub const MARKER_UNDEFINED: &str = "__tether_marker_undefined__";

/// Normalized evaluation result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// Literal text of a string, number, boolean or `null` result.
    Scalar(String),
    /// The expression completed and produced `undefined`. Kept apart from `Scalar` so it never
    /// reads the same as the string `"undefined"`.
    Undefined,
    /// Arrays and objects, serialized as JSON.
    Structured(String),
    /// The expression referenced something that does not exist yet, typically a helper library
    /// that still has to be injected. Not an error.
    NotDefined,
}

impl ScriptOutcome {
    pub fn is_not_defined(&self) -> bool {
        matches!(self, ScriptOutcome::NotDefined)
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ScriptOutcome::Scalar(text) | ScriptOutcome::Structured(text) => Some(text),
            ScriptOutcome::Undefined => Some("undefined"),
            ScriptOutcome::NotDefined => None,
        }
    }
}

/// Map a raw remote value onto [`ScriptOutcome`].
///
/// Exceptions of the undefined-symbol class become [`ScriptOutcome::NotDefined`]; any other
/// exception is a [`EngineErrorKind::Script`] error.
pub fn normalize(value: RemoteValue) -> Result<ScriptOutcome, EngineError> {
    match value {
        RemoteValue::Undefined => Ok(ScriptOutcome::Undefined),
        RemoteValue::Unserializable(raw) => Ok(ScriptOutcome::Scalar(raw)),
        RemoteValue::Value(value) => Ok(from_json(value)),
        RemoteValue::Exception(exception) if exception.is_undefined_symbol() => {
            debug!(target: "script-bridge", message = %exception.message, "symbol not defined");
            Ok(ScriptOutcome::NotDefined)
        }
        RemoteValue::Exception(exception) => Err(EngineError::new(EngineErrorKind::Script)
            .with_hint(exception.message.clone())
            .with_data(serde_json::json!({ "class": exception.class_name }))),
    }
}

fn from_json(value: Value) -> ScriptOutcome {
    match value {
        Value::Null => ScriptOutcome::Scalar("null".to_string()),
        Value::String(text) => ScriptOutcome::Scalar(text),
        Value::Bool(flag) => ScriptOutcome::Scalar(flag.to_string()),
        Value::Number(number) => ScriptOutcome::Scalar(number.to_string()),
        structured @ (Value::Array(_) | Value::Object(_)) => {
            ScriptOutcome::Structured(structured.to_string())
        }
    }
}

/// Script that evaluates `expression` and stores its JSON form on the marker element.
pub fn marker_write_script(expression: &str) -> String {
    format!(
        "(function () {{\n\
         var marker = document.getElementById('{MARKER_ELEMENT_ID}');\n\
         if (!marker) {{\n\
         marker = document.createElement('div');\n\
         marker.id = '{MARKER_ELEMENT_ID}';\n\
         marker.style.display = 'none';\n\
         (document.body || document.documentElement).appendChild(marker);\n\
         }}\n\
         var value = ({expression});\n\
         marker.setAttribute('{MARKER_ATTRIBUTE}', value === undefined ? '{MARKER_UNDEFINED}' : JSON.stringify(value));\n\
         return true;\n\
         }})()"
    )
}

/// Script that reads back, and clears, the value stored by [`marker_write_script`].
pub const MARKER_READ_SCRIPT: &str = "(function () {\n\
     var marker = document.getElementById('__tether_marker');\n\
     if (!marker || !marker.hasAttribute('data-tether-result')) { return null; }\n\
     var value = marker.getAttribute('data-tether-result');\n\
     marker.removeAttribute('data-tether-result');\n\
     return value;\n\
     })()";

pub struct ScriptBridge {
    protocol: Arc<dyn Protocol>,
    timeout: Duration,
}

impl ScriptBridge {
    pub fn new(protocol: Arc<dyn Protocol>, timeout: Duration) -> Self {
        Self { protocol, timeout }
    }

    pub async fn evaluate(&self, expression: &str) -> Result<ScriptOutcome, EngineError> {
        let value = self.protocol.evaluate(expression, self.timeout).await?;
        normalize(value)
    }

    /// Evaluate through whichever channel can carry arrays and objects on this transport.
    pub async fn evaluate_structured(&self, expression: &str) -> Result<ScriptOutcome, EngineError> {
        if self.protocol.supports_structured_results() {
            self.evaluate(expression).await
        } else {
            self.evaluate_via_marker(expression).await
        }
    }

    /// Write-then-read: the first call stores the JSON-serialized result on the marker element,
    /// the second reads the attribute back.
    pub async fn evaluate_via_marker(&self, expression: &str) -> Result<ScriptOutcome, EngineError> {
        let written = self.evaluate(&marker_write_script(expression)).await?;
        if written.is_not_defined() {
            return Ok(ScriptOutcome::NotDefined);
        }
        match self.protocol.evaluate(MARKER_READ_SCRIPT, self.timeout).await? {
            RemoteValue::Value(Value::String(raw)) => decode_marker(&raw),
            other => Err(EngineError::new(EngineErrorKind::Protocol)
                .with_hint(format!("marker element held no result: {other:?}"))),
        }
    }

    /// Run `source` for its side effects, e.g. defining a helper library on `window`.
    pub async fn inject_helper(&self, source: &str) -> Result<(), EngineError> {
        match self.protocol.evaluate(source, self.timeout).await? {
            RemoteValue::Exception(exception) => Err(EngineError::new(EngineErrorKind::Script)
                .with_hint(format!("helper injection failed: {}", exception.message))),
            _ => {
                info!(target: "script-bridge", bytes = source.len(), "helper injected");
                Ok(())
            }
        }
    }

    /// Evaluate; if the helper is missing, inject `helper_source` and evaluate once more.
    pub async fn evaluate_with_helper(
        &self,
        expression: &str,
        helper_source: &str,
    ) -> Result<ScriptOutcome, EngineError> {
        let first = self.evaluate(expression).await?;
        if !first.is_not_defined() {
            return Ok(first);
        }
        self.inject_helper(helper_source).await?;
        self.evaluate(expression).await
    }
}

fn decode_marker(raw: &str) -> Result<ScriptOutcome, EngineError> {
    if raw == MARKER_UNDEFINED {
        return Ok(ScriptOutcome::Undefined);
    }
    serde_json::from_str::<Value>(raw).map(from_json).map_err(|err| {
        EngineError::new(EngineErrorKind::Protocol)
            .with_hint(format!("marker attribute is not JSON: {err}"))
    })
}
