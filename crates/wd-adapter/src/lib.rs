//! Stateless REST transport.
//!
//! Every operation is one HTTP exchange against a WebDriver-style endpoint; there is no
//! background task and no correlation table, the pending response is the HTTP body itself.

pub mod config {
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};
    use std::env;
    use tether_core_types::{EngineError, EngineErrorKind};
    use url::Url;

    #[derive(Clone, Debug, Serialize, Deserialize)]
    #[serde(default)]
    pub struct WebDriverConfig {
        pub base_url: String,
        /// Sent verbatim as `desiredCapabilities` and as W3C `capabilities.alwaysMatch`.
        pub capabilities: Value,
        pub retry_backoff_ms: u64,
    }

    impl Default for WebDriverConfig {
        fn default() -> Self {
            Self {
                base_url: resolve_base_url(),
                capabilities: json!({}),
                retry_backoff_ms: 250,
            }
        }
    }

    impl WebDriverConfig {
        pub fn for_base_url(base_url: impl Into<String>) -> Self {
            Self {
                base_url: base_url.into(),
                ..Self::default()
            }
        }

        pub fn base(&self) -> Result<Url, EngineError> {
            let mut raw = self.base_url.trim().to_string();
            if !raw.ends_with('/') {
                raw.push('/');
            }
            Url::parse(&raw).map_err(|err| {
                EngineError::new(EngineErrorKind::InvalidUrl)
                    .with_hint(format!("webdriver base url {}: {err}", self.base_url))
            })
        }

        pub fn retry_backoff(&self) -> std::time::Duration {
            std::time::Duration::from_millis(self.retry_backoff_ms)
        }
    }

    fn resolve_base_url() -> String {
        match env::var("TETHER_WEBDRIVER_URL") {
            Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => "http://127.0.0.1:9515".to_string(),
        }
    }
}

pub mod envelope;
pub mod protocol;
pub mod session;

pub use config::WebDriverConfig;
pub use envelope::{Envelope, ReplyOutcome};
pub use protocol::WebDriverProtocol;
pub use session::RestSession;
