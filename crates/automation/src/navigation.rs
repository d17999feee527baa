//! Navigation with readiness waiting and reconnect-on-teardown.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tether_core_types::{
    normalize_url, same_location, EngineConfig, EngineError, EngineErrorKind, Protocol,
    SessionLog,
};
use tether_wait::{wait_until_async_with, Deadline};
use tracing::{debug, info, warn, Instrument};

pub struct NavigationController {
    protocol: Arc<dyn Protocol>,
    config: EngineConfig,
    log: SessionLog,
}

/// State shared by the readiness polls of one navigation.
struct SettleAttempt<'a> {
    protocol: &'a dyn Protocol,
    target: String,
    config: &'a EngineConfig,
    deadline: Deadline,
    reconnects: AtomicU32,
    last_error: Mutex<Option<EngineError>>,
}

impl SettleAttempt<'_> {
    fn call_budget(&self) -> Duration {
        self.deadline.remaining().max(self.config.poll_interval())
    }

    fn record(&self, err: EngineError) {
        debug!(target: "navigation", error = %err, "readiness poll failed");
        *self.last_error.lock() = Some(err);
    }

    async fn poll(&self) -> bool {
        if !self.protocol.is_connected() {
            match self
                .protocol
                .reconnect(Some(&self.target), self.deadline.remaining())
                .await
            {
                Ok(()) => {
                    let count = self.reconnects.fetch_add(1, Ordering::Relaxed) + 1;
                    info!(target: "navigation", target_url = %self.target, count, "reconnected after teardown");
                }
                Err(err) => {
                    self.record(err);
                    return false;
                }
            }
        }
        match self
            .protocol
            .is_settled(self.config.settle_policy, self.call_budget())
            .await
        {
            Ok(settled) => settled,
            Err(err) => {
                self.record(err);
                false
            }
        }
    }
}

impl NavigationController {
    pub fn new(protocol: Arc<dyn Protocol>, config: EngineConfig, log: SessionLog) -> Self {
        Self {
            protocol,
            config,
            log,
        }
    }

    /// Navigate and wait until the document settles. Returns the live URL afterwards, which
    /// differs from `uri` when the target redirected.
    ///
    /// Navigating to the location the document already shows only waits for readiness. A
    /// teardown of the channel during navigation is repaired by re-discovering the session, all
    /// within the configured timeout.
    pub async fn navigate_to(&self, uri: &str) -> Result<String, EngineError> {
        self.run(uri)
            .instrument(self.log.span().clone())
            .await
    }

    async fn run(&self, uri: &str) -> Result<String, EngineError> {
        let timeout = self.config.timeout();
        let deadline = Deadline::after(timeout);
        let target = normalize_url(uri)?.to_string();
        let protocol = self.protocol.as_ref();

        // 1. Skip the navigate call when already there
        let already_there = if protocol.is_connected() {
            match protocol.current_url(deadline.remaining()).await {
                Ok(current) => same_location(&current, &target),
                Err(err) => {
                    debug!(target: "navigation", error = %err, "current location unknown");
                    false
                }
            }
        } else {
            false
        };

        // 2. Issue the navigation
        if already_there {
            info!(target: "navigation", url = %target, "already at location, settling only");
        } else {
            info!(target: "navigation", url = %target, "navigating");
            match protocol.navigate(&target, deadline.remaining()).await {
                Ok(()) => {}
                Err(err) if err.is_disconnect() => {
                    debug!(target: "navigation", error = %err, "channel torn down by navigation");
                }
                Err(err) => return Err(err),
            }
        }

        // 3. Wait for a settled document, reconnecting if the channel went away
        let attempt = SettleAttempt {
            protocol,
            target: target.clone(),
            config: &self.config,
            deadline,
            reconnects: AtomicU32::new(0),
            last_error: Mutex::new(None),
        };
        let settled = wait_until_async_with(
            &attempt,
            |attempt| attempt.poll(),
            deadline.remaining(),
            self.config.poll_interval(),
        )
        .await;
        let reconnects = attempt.reconnects.load(Ordering::Relaxed);
        if !settled {
            let last = attempt.last_error.lock().take();
            warn!(
                target: "navigation",
                url = %target,
                reconnects,
                last_error = ?last.as_ref().map(|err| err.to_string()),
                "document did not settle"
            );
            let mut err = EngineError::new(EngineErrorKind::NavTimeout)
                .with_hint(format!("{target} not settled within {timeout:?}"))
                .retriable(true);
            if let Some(last) = last {
                err = err.with_data(json!({
                    "last_error": last.to_string(),
                    "phase": last.phase(),
                    "reconnects": reconnects,
                }));
            }
            return Err(err);
        }

        // 4. Read the live location back
        let final_url = protocol
            .current_url(deadline.remaining().max(self.config.poll_interval()))
            .await?;
        info!(target: "navigation", url = %final_url, reconnects, "navigation settled");
        Ok(final_url)
    }
}
