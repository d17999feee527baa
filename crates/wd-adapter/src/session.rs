//! One remote session on a WebDriver-style REST endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tether_core_types::{EngineError, EngineErrorKind, SessionLog, TransportKind};
use tether_wait::Deadline;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::WebDriverConfig;
use crate::envelope::{Envelope, ReplyOutcome};

pub struct RestSession {
    client: reqwest::Client,
    base: Url,
    config: WebDriverConfig,
    session_id: RwLock<Option<String>>,
    next_request: AtomicU64,
    log: SessionLog,
}

impl RestSession {
    /// Create the remote session, retrying while the driver's listener comes up.
    pub async fn create(config: WebDriverConfig, timeout: Duration) -> Result<Self, EngineError> {
        let base = config.base()?;
        let client = reqwest::Client::builder().build().map_err(|err| {
            EngineError::new(EngineErrorKind::Internal)
                .with_hint(format!("http client unavailable: {err}"))
        })?;
        let log = SessionLog::new(TransportKind::Webdriver, base.as_str());
        let session = Self {
            client,
            base,
            config,
            session_id: RwLock::new(None),
            next_request: AtomicU64::new(1),
            log,
        };
        session.open(timeout).await?;
        Ok(session)
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    pub fn is_open(&self) -> bool {
        self.session_id.read().is_some()
    }

    /// `POST /session`. Replaces any session id held before.
    pub async fn open(&self, timeout: Duration) -> Result<String, EngineError> {
        let url = self.join("session")?;
        let capabilities = self.config.capabilities.clone();
        let body = json!({
            "desiredCapabilities": capabilities,
            "capabilities": { "alwaysMatch": capabilities },
        });
        let deadline = Deadline::after(timeout);
        let url = &url;
        let body = &body;
        let deadline = &deadline;
        let created = tether_wait::retry(timeout, self.config.retry_backoff(), || async move {
            let response = self
                .client
                .post(url.clone())
                .json(body)
                .timeout(deadline.remaining().max(Duration::from_millis(1)))
                .send()
                .await
                .map_err(|err| {
                    EngineError::new(EngineErrorKind::Connect)
                        .with_hint(format!("{url}: {err}"))
                        .retriable(true)
                })?;
            let status = response.status();
            let envelope = read_envelope(response).await?;
            let session_id = envelope.session_id().map(str::to_string);
            match (envelope.outcome(status.as_u16()), session_id) {
                (ReplyOutcome::Success(_), Some(id)) => Ok(id),
                (ReplyOutcome::Success(_), None) => Err(EngineError::new(EngineErrorKind::Protocol)
                    .with_hint("session reply carries no session id")),
                (outcome, _) => Err(EngineError::new(EngineErrorKind::Connect)
                    .with_hint(format!("session not created: {outcome:?}"))
                    .retriable(true)),
            }
        })
        .await;
        match created {
            Ok(id) => {
                self.log.span().in_scope(|| {
                    info!(target: "wd-transport", session = %id, "remote session created");
                });
                *self.session_id.write() = Some(id.clone());
                Ok(id)
            }
            Err(err) => {
                warn!(target: "wd-transport", base = %self.base, error = %err, "session creation gave up");
                Err(err)
            }
        }
    }

    /// One HTTP exchange on the current session, e.g. `POST session/{id}/execute`.
    pub async fn command(
        &self,
        method: Method,
        suffix: &str,
        body: Option<Value>,
        timeout: Duration,
    ) -> Result<ReplyOutcome, EngineError> {
        let session_id = self
            .session_id()
            .ok_or_else(|| EngineError::disconnected("remote session has ended"))?;
        let path = format!("session/{session_id}/{suffix}");
        let url = self.join(&path)?;
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let label = format!("{method} {path}");
        let mut request = self
            .client
            .request(method, url)
            .timeout(timeout.max(Duration::from_millis(1)));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                EngineError::new(EngineErrorKind::CorrelationTimeout {
                    id: request_id,
                    method: label.clone(),
                })
                .with_hint(format!("after {}ms", timeout.as_millis()))
                .retriable(true)
            } else if err.is_connect() {
                EngineError::disconnected(format!("{label}: {err}"))
            } else {
                EngineError::new(EngineErrorKind::Send)
                    .with_hint(format!("{label}: {err}"))
                    .retriable(true)
            }
        })?;
        let status = response.status();
        let envelope = read_envelope(response).await?;
        let outcome = envelope.outcome(status.as_u16());
        debug!(target: "wd-transport", request = request_id, %label, %status, "reply received");
        match outcome {
            ReplyOutcome::SessionGone(message) => {
                self.session_id.write().take();
                Err(EngineError::disconnected(format!("{label}: {message}")))
            }
            ReplyOutcome::Failed { code, message } => {
                Err(EngineError::new(EngineErrorKind::Remote { code })
                    .with_hint(format!("{label}: {message}")))
            }
            outcome => Ok(outcome),
        }
    }

    /// `DELETE /session/{id}`. Idempotent; a session the driver already forgot counts as ended.
    pub async fn delete(&self, timeout: Duration) -> Result<(), EngineError> {
        let Some(session_id) = self.session_id() else {
            return Ok(());
        };
        let result = self.command(Method::DELETE, "", None, timeout).await;
        self.session_id.write().take();
        match result {
            Ok(_) => {
                self.log.span().in_scope(|| {
                    info!(target: "wd-transport", session = %session_id, "remote session deleted");
                });
                Ok(())
            }
            Err(err) if err.is_disconnect() => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn join(&self, path: &str) -> Result<Url, EngineError> {
        let path = path.trim_end_matches('/');
        self.base.join(path).map_err(|err| {
            EngineError::new(EngineErrorKind::InvalidUrl).with_hint(format!("{path}: {err}"))
        })
    }
}

async fn read_envelope(response: reqwest::Response) -> Result<Envelope, EngineError> {
    let status = response.status();
    let text = response.text().await.map_err(|err| {
        EngineError::new(EngineErrorKind::Protocol).with_hint(format!("reply body unreadable: {err}"))
    })?;
    if text.trim().is_empty() {
        if status == StatusCode::NOT_FOUND {
            return Ok(Envelope {
                value: json!({"error": "invalid session id", "message": "not found"}),
                ..Envelope::default()
            });
        }
        return Ok(Envelope::default());
    }
    serde_json::from_str(&text).map_err(|err| {
        EngineError::new(EngineErrorKind::Protocol)
            .with_hint(format!("reply is not an envelope ({status}): {err}"))
    })
}
