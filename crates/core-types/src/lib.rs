//! Shared primitives for the tether automation engine.
//!
//! Transports, the script bridge and the navigation controller all speak the types defined here,
//! which keeps the upper layers independent of whether a session runs over a DevTools socket or a
//! WebDriver-style REST endpoint.

pub mod config;
pub mod location;
pub mod log;
pub mod protocol;

pub mod ids {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use uuid::Uuid;

    /// Reference id tagging every log line emitted on behalf of one automation session.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
    pub struct SessionId(pub Uuid);

    impl SessionId {
        pub fn new() -> Self {
            Self(Uuid::new_v4())
        }
    }

    impl Default for SessionId {
        fn default() -> Self {
            Self::new()
        }
    }

    impl fmt::Display for SessionId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let simple = self.0.simple().to_string();
            f.write_str(&simple[..8])
        }
    }
}

pub mod error {
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use thiserror::Error;

    /// High-level failure categories surfaced by the engine.
    #[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
    pub enum EngineErrorKind {
        #[error("no debuggable session found")]
        Discovery,
        #[error("transport could not be established")]
        Connect,
        #[error("request {id} ({method}) received no response")]
        CorrelationTimeout { id: u64, method: String },
        #[error("transport disconnected")]
        Disconnected,
        #[error("request could not be sent")]
        Send,
        #[error("remote error {code}")]
        Remote { code: i64 },
        #[error("script raised an exception")]
        Script,
        #[error("navigation failed")]
        Navigation,
        #[error("document did not settle")]
        NavTimeout,
        #[error("unexpected protocol payload")]
        Protocol,
        #[error("invalid url")]
        InvalidUrl,
        #[error("internal error")]
        Internal,
    }

    impl EngineErrorKind {
        /// Name of the phase that failed, used in user-facing messages.
        pub fn phase(&self) -> &'static str {
            match self {
                EngineErrorKind::Discovery => "discovery",
                EngineErrorKind::Connect => "connect",
                EngineErrorKind::Send | EngineErrorKind::Disconnected => "send",
                EngineErrorKind::CorrelationTimeout { .. }
                | EngineErrorKind::Remote { .. }
                | EngineErrorKind::Protocol => "await",
                EngineErrorKind::Script => "evaluate",
                EngineErrorKind::Navigation
                | EngineErrorKind::NavTimeout
                | EngineErrorKind::InvalidUrl => "navigate",
                EngineErrorKind::Internal => "internal",
            }
        }
    }

    /// Enriched error metadata passed back to higher layers.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct EngineError {
        pub kind: EngineErrorKind,
        pub hint: Option<String>,
        pub retriable: bool,
        pub data: Option<serde_json::Value>,
    }

    impl fmt::Display for EngineError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "[{}] {}", self.kind.phase(), self.kind)?;
            if let Some(hint) = &self.hint {
                write!(f, ": {}", hint)?;
            }
            Ok(())
        }
    }

    impl std::error::Error for EngineError {}

    impl EngineError {
        pub fn new(kind: EngineErrorKind) -> Self {
            Self {
                kind,
                hint: None,
                retriable: false,
                data: None,
            }
        }

        pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
            self.hint = Some(hint.into());
            self
        }

        pub fn retriable(mut self, flag: bool) -> Self {
            self.retriable = flag;
            self
        }

        pub fn with_data(mut self, data: serde_json::Value) -> Self {
            self.data = Some(data);
            self
        }

        pub fn disconnected(hint: impl Into<String>) -> Self {
            Self::new(EngineErrorKind::Disconnected)
                .with_hint(hint)
                .retriable(true)
        }

        pub fn phase(&self) -> &'static str {
            self.kind.phase()
        }

        /// True when the caller should re-discover and reconnect rather than retry in place.
        pub fn is_disconnect(&self) -> bool {
            matches!(self.kind, EngineErrorKind::Disconnected)
        }

        pub fn is_timeout(&self) -> bool {
            matches!(
                self.kind,
                EngineErrorKind::CorrelationTimeout { .. } | EngineErrorKind::NavTimeout
            )
        }
    }

    pub type EngineResult<T> = Result<T, EngineError>;
}

pub use config::{EngineConfig, SettlePolicy};
pub use error::{EngineError, EngineErrorKind, EngineResult};
pub use ids::SessionId;
pub use location::{location_key, normalize_url, same_location};
pub use log::SessionLog;
pub use protocol::{DocumentState, Protocol, RemoteValue, Request, ScriptException, TransportKind};
