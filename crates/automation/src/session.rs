//! Automation session facade.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cdp_adapter::{CdpConfig, CdpProtocol};
use tether_core_types::{EngineConfig, EngineError, Protocol, SessionLog, TransportKind};
use tracing::{debug, info, warn};
use wd_adapter::{WebDriverConfig, WebDriverProtocol};

use crate::navigation::NavigationController;
use crate::script::{ScriptBridge, ScriptOutcome};

/// One attached automation session.
///
/// Owns the transport and its logging context. With `auto_close` set, dropping a session that
/// was not closed explicitly schedules [`close`](Self::close) on the ambient tokio runtime.
pub struct AutomationSession {
    protocol: Arc<dyn Protocol>,
    config: EngineConfig,
    log: SessionLog,
    scripts: ScriptBridge,
    navigation: NavigationController,
    closed: AtomicBool,
}

impl AutomationSession {
    pub async fn attach_devtools(
        cdp: CdpConfig,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let protocol = CdpProtocol::attach(cdp, config.clone()).await?;
        let log = protocol.log().clone();
        Ok(Self::from_protocol(Arc::new(protocol), config, log))
    }

    pub async fn create_webdriver(
        webdriver: WebDriverConfig,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let protocol = WebDriverProtocol::create(webdriver, config.timeout()).await?;
        let log = protocol.log().clone();
        Ok(Self::from_protocol(Arc::new(protocol), config, log))
    }

    pub fn from_protocol(protocol: Arc<dyn Protocol>, config: EngineConfig, log: SessionLog) -> Self {
        let scripts = ScriptBridge::new(Arc::clone(&protocol), config.timeout());
        let navigation =
            NavigationController::new(Arc::clone(&protocol), config.clone(), log.clone());
        log.span().in_scope(|| {
            info!(transport = protocol.kind().as_str(), "automation session ready");
        });
        Self {
            protocol,
            config,
            log,
            scripts,
            navigation,
            closed: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> TransportKind {
        self.protocol.kind()
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn protocol(&self) -> &Arc<dyn Protocol> {
        &self.protocol
    }

    pub fn scripts(&self) -> &ScriptBridge {
        &self.scripts
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn navigate_to(&self, uri: &str) -> Result<String, EngineError> {
        self.ensure_open()?;
        self.navigation.navigate_to(uri).await
    }

    pub async fn execute_script(&self, expression: &str) -> Result<ScriptOutcome, EngineError> {
        self.ensure_open()?;
        self.scripts.evaluate(expression).await
    }

    /// Live location of the remote document.
    pub async fn current_url(&self) -> Result<String, EngineError> {
        self.ensure_open()?;
        self.protocol.current_url(self.config.timeout()).await
    }

    /// Idempotent.
    pub async fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.protocol.close().await;
        self.log.span().in_scope(|| match &result {
            Ok(()) => info!("automation session closed"),
            Err(err) => warn!(error = %err, "automation session close failed"),
        });
        result
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.is_closed() {
            return Err(EngineError::disconnected(format!(
                "session {} was closed",
                self.log.reference()
            )));
        }
        Ok(())
    }
}

impl Drop for AutomationSession {
    fn drop(&mut self) {
        if !self.config.auto_close || self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let protocol = Arc::clone(&self.protocol);
        let reference = self.log.reference();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = protocol.close().await {
                        warn!(session = %reference, error = %err, "auto-close failed");
                    }
                });
            }
            Err(_) => {
                debug!(session = %reference, "no runtime available, auto-close skipped");
            }
        }
    }
}
