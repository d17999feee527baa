//! Reply envelopes: `{sessionId, status, value}` with a numeric status, or the status-less
//! `{value}` form whose failures carry `value.error`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_core_types::ScriptException;

/// Legacy status codes that need distinct handling.
pub const STATUS_SUCCESS: i64 = 0;
pub const STATUS_NO_SUCH_DRIVER: i64 = 6;
pub const STATUS_JAVASCRIPT_ERROR: i64 = 17;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub status: Option<i64>,
    #[serde(default)]
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ReplyOutcome {
    Success(Value),
    ScriptError(ScriptException),
    /// The driver no longer knows the session.
    SessionGone(String),
    Failed { code: i64, message: String },
}

impl Envelope {
    pub fn session_id(&self) -> Option<&str> {
        self.session_id
            .as_deref()
            .or_else(|| self.value.get("sessionId").and_then(Value::as_str))
            .filter(|id| !id.is_empty())
    }

    pub fn outcome(self, http_status: u16) -> ReplyOutcome {
        match self.status {
            Some(STATUS_SUCCESS) => ReplyOutcome::Success(self.value),
            Some(code) => {
                let message = message_of(&self.value);
                match code {
                    STATUS_JAVASCRIPT_ERROR => ReplyOutcome::ScriptError(parse_exception(&message)),
                    STATUS_NO_SUCH_DRIVER => ReplyOutcome::SessionGone(message),
                    _ => ReplyOutcome::Failed { code, message },
                }
            }
            None => match self.value.get("error").and_then(Value::as_str) {
                Some(error) => {
                    let message = message_of(&self.value);
                    match error {
                        "javascript error" => ReplyOutcome::ScriptError(parse_exception(&message)),
                        "invalid session id" | "no such window" => {
                            ReplyOutcome::SessionGone(format!("{error}: {message}"))
                        }
                        _ => ReplyOutcome::Failed {
                            code: i64::from(http_status),
                            message: format!("{error}: {message}"),
                        },
                    }
                }
                None if http_status >= 400 => ReplyOutcome::Failed {
                    code: i64::from(http_status),
                    message: message_of(&self.value),
                },
                None => ReplyOutcome::Success(self.value),
            },
        }
    }
}

fn message_of(value: &Value) -> String {
    match value.get("message").and_then(Value::as_str) {
        Some(message) => message.to_string(),
        None => match value {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        },
    }
}

/// Recover the exception class from messages such as `ReferenceError: x is not defined`.
pub fn parse_exception(message: &str) -> ScriptException {
    let first_line = message.lines().next().unwrap_or_default().trim();
    let body = first_line
        .strip_prefix("javascript error:")
        .map(str::trim)
        .unwrap_or(first_line);
    let class_name = body.split_once(':').and_then(|(prefix, _)| {
        let prefix = prefix.trim();
        let is_class = prefix.ends_with("Error")
            && prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        is_class.then(|| prefix.to_string())
    });
    ScriptException {
        class_name,
        message: body.to_string(),
    }
}
