//! DevTools socket transport.
//!
//! Discovers debuggable sessions through the target's `/json` metadata endpoint, keeps one
//! persistent WebSocket per attached session with a supervised receive loop, and correlates
//! request/response pairs by id through a shared pending-response table. [`CdpProtocol`] exposes
//! all of it behind the transport-agnostic [`tether_core_types::Protocol`] contract.

pub mod config {
    use serde::{Deserialize, Serialize};
    use std::{env, time::Duration};
    use tether_core_types::{EngineError, EngineErrorKind};
    use url::Url;

    /// Where to find the remote target and how to talk to it.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(default)]
    pub struct CdpConfig {
        pub host: String,
        pub port: u16,
        pub metadata_path: String,
        /// Connect straight to this debugger endpoint instead of discovering one.
        pub websocket_url: Option<String>,
        /// Prefer the session currently showing this URL.
        pub target_hint: Option<String>,
        pub max_frame_bytes: usize,
        pub retry_backoff_ms: u64,
    }

    impl Default for CdpConfig {
        fn default() -> Self {
            Self {
                host: resolve_debug_host(),
                port: resolve_debug_port(),
                metadata_path: "/json".to_string(),
                websocket_url: None,
                target_hint: None,
                max_frame_bytes: 16 * 1024 * 1024,
                retry_backoff_ms: 250,
            }
        }
    }

    impl CdpConfig {
        pub fn for_port(host: impl Into<String>, port: u16) -> Self {
            Self {
                host: host.into(),
                port,
                ..Self::default()
            }
        }

        pub fn metadata_endpoint(&self) -> Result<Url, EngineError> {
            let raw = format!("http://{}:{}{}", self.host, self.port, self.metadata_path);
            Url::parse(&raw).map_err(|err| {
                EngineError::new(EngineErrorKind::InvalidUrl)
                    .with_hint(format!("metadata endpoint {raw}: {err}"))
            })
        }

        pub fn retry_backoff(&self) -> Duration {
            Duration::from_millis(self.retry_backoff_ms)
        }
    }

    fn resolve_debug_host() -> String {
        match env::var("TETHER_DEBUG_HOST") {
            Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => "127.0.0.1".to_string(),
        }
    }

    fn resolve_debug_port() -> u16 {
        env::var("TETHER_DEBUG_PORT")
            .ok()
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(9222)
    }
}

pub mod correlator;
pub mod discovery;
pub mod frame;
pub mod metrics;
pub mod protocol;
pub mod table;
pub mod transport;

pub use config::CdpConfig;
pub use correlator::RequestCorrelator;
pub use discovery::{SessionDescriptor, SessionDiscovery};
pub use metrics::AdapterMetricsSnapshot;
pub use protocol::CdpProtocol;
pub use table::{Delivery, PendingResponseTable};
pub use transport::{CloseReason, ConnectionState, SocketConnection};
