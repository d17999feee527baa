//! Engine-wide timing configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::protocol::DocumentState;

/// Which document lifecycle states count as "settled" after a navigation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlePolicy {
    #[default]
    InteractiveOrComplete,
    CompleteOnly,
}

impl SettlePolicy {
    pub fn accepts(&self, state: DocumentState) -> bool {
        match self {
            SettlePolicy::InteractiveOrComplete => {
                matches!(state, DocumentState::Interactive | DocumentState::Complete)
            }
            SettlePolicy::CompleteOnly => matches!(state, DocumentState::Complete),
        }
    }
}

/// Timeouts and flags handed to the engine by the owning application.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub response_poll_ms: u64,
    pub auto_close: bool,
    pub settle_policy: SettlePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: resolve_timeout_default(),
            poll_interval_ms: 100,
            response_poll_ms: 5,
            auto_close: resolve_auto_close_default(),
            settle_policy: SettlePolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn response_poll(&self) -> Duration {
        Duration::from_millis(self.response_poll_ms)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }
}

fn resolve_timeout_default() -> u64 {
    env::var("TETHER_TIMEOUT_MS")
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(30_000)
}

fn resolve_auto_close_default() -> bool {
    match env::var("TETHER_AUTO_CLOSE") {
        Ok(value) => {
            let lower = value.to_ascii_lowercase();
            !matches!(lower.as_str(), "0" | "false" | "no" | "off")
        }
        Err(_) => true,
    }
}
