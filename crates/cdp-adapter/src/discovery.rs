//! Session discovery over the target's HTTP metadata endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_core_types::{same_location, EngineError, EngineErrorKind};
use tether_wait::Deadline;
use tracing::{debug, warn};
use url::Url;

use crate::config::CdpConfig;

/// One entry of the `/json` listing.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
    #[serde(default)]
    pub devtools_frontend_url: Option<String>,
}

impl SessionDescriptor {
    /// Descriptor for an explicitly configured debugger endpoint.
    pub fn direct(websocket_url: impl Into<String>) -> Self {
        let websocket_url = websocket_url.into();
        Self {
            id: websocket_url.rsplit('/').next().unwrap_or_default().to_string(),
            web_socket_debugger_url: Some(websocket_url),
            kind: Some("page".to_string()),
            ..Self::default()
        }
    }

    pub fn websocket_url(&self) -> Option<&str> {
        self.web_socket_debugger_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
    }

    /// Ordinary document sessions only: no extension pages, no DevTools front-ends, and nothing
    /// without a debugger endpoint.
    pub fn is_automatable(&self) -> bool {
        if self.websocket_url().is_none() {
            return false;
        }
        if let Some(kind) = self.kind.as_deref() {
            if kind != "page" {
                return false;
            }
        }
        !is_internal_url(&self.url)
    }
}

fn is_internal_url(raw: &str) -> bool {
    if raw.contains("/devtools/inspector.html") {
        return true;
    }
    match Url::parse(raw) {
        Ok(url) => {
            let scheme = url.scheme();
            scheme.ends_with("-extension") || scheme == "devtools" || scheme == "chrome-devtools"
        }
        Err(_) => false,
    }
}

const MIN_REQUEST_TIMEOUT: Duration = Duration::from_millis(1);

/// Pick the session to attach to: the one showing `hint` if any, otherwise the first.
pub fn select<'a>(
    sessions: &'a [SessionDescriptor],
    hint: Option<&str>,
) -> Option<&'a SessionDescriptor> {
    if let Some(hint) = hint {
        if let Some(found) = sessions.iter().find(|s| same_location(&s.url, hint)) {
            return Some(found);
        }
    }
    sessions.first()
}

/// Queries the metadata endpoint, retrying until an automatable session appears.
pub struct SessionDiscovery {
    client: reqwest::Client,
    endpoint: Url,
    backoff: Duration,
    direct: Option<String>,
}

impl SessionDiscovery {
    pub fn new(config: &CdpConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder().build().map_err(|err| {
            EngineError::new(EngineErrorKind::Internal)
                .with_hint(format!("http client unavailable: {err}"))
        })?;
        Ok(Self {
            client,
            endpoint: config.metadata_endpoint()?,
            backoff: config.retry_backoff(),
            direct: config.websocket_url.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Single query, filtered to automatable sessions. An empty list is not an error here.
    ///
    /// `timeout` bounds the whole exchange, body included, so a listener that accepts but never
    /// answers cannot stall the caller.
    pub async fn fetch_once(&self, timeout: Duration) -> Result<Vec<SessionDescriptor>, EngineError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .timeout(timeout.max(MIN_REQUEST_TIMEOUT))
            .send()
            .await
            .map_err(|err| {
                EngineError::new(EngineErrorKind::Discovery)
                    .with_hint(format!("{} unreachable: {err}", self.endpoint))
                    .retriable(true)
            })?;
        if !response.status().is_success() {
            return Err(EngineError::new(EngineErrorKind::Discovery)
                .with_hint(format!("{} answered {}", self.endpoint, response.status()))
                .retriable(true));
        }
        let listing: Vec<SessionDescriptor> = response.json().await.map_err(|err| {
            EngineError::new(EngineErrorKind::Discovery)
                .with_hint(format!("malformed session listing: {err}"))
        })?;
        let total = listing.len();
        let sessions: Vec<_> = listing.into_iter().filter(|s| s.is_automatable()).collect();
        debug!(
            target: "cdp-discovery",
            endpoint = %self.endpoint,
            total,
            automatable = sessions.len(),
            "queried session listing"
        );
        Ok(sessions)
    }

    /// Poll the listing until at least one automatable session is reported.
    ///
    /// With a configured debugger endpoint the listing is skipped entirely.
    pub async fn list_sessions(
        &self,
        timeout: Duration,
    ) -> Result<Vec<SessionDescriptor>, EngineError> {
        if let Some(direct) = &self.direct {
            return Ok(vec![SessionDescriptor::direct(direct.clone())]);
        }
        let deadline = Deadline::after(timeout);
        let deadline = &deadline;
        let result = tether_wait::retry(timeout, self.backoff, || async move {
            let sessions = self.fetch_once(deadline.remaining()).await?;
            if sessions.is_empty() {
                Err(EngineError::new(EngineErrorKind::Discovery)
                    .with_hint(format!("{} lists no debuggable session", self.endpoint))
                    .retriable(true))
            } else {
                Ok(sessions)
            }
        })
        .await;
        if let Err(err) = &result {
            warn!(target: "cdp-discovery", endpoint = %self.endpoint, error = %err, "discovery gave up");
        }
        result
    }

    pub async fn discover(
        &self,
        hint: Option<&str>,
        timeout: Duration,
    ) -> Result<SessionDescriptor, EngineError> {
        let sessions = self.list_sessions(timeout).await?;
        select(&sessions, hint).cloned().ok_or_else(|| {
            EngineError::new(EngineErrorKind::Discovery).with_hint("no debuggable session")
        })
    }
}
