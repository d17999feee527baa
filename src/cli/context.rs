use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tether_automation::AutomationSession;
use tether_core_types::EngineConfig;

use super::env::CliArgs;
use super::output::OutputFormat;
use crate::config::{Config, TransportChoice};

pub struct CliContext {
    config: Config,
    config_path: PathBuf,
    output: OutputFormat,
}

impl CliContext {
    /// Fold command line overrides into the loaded configuration.
    pub fn new(mut config: Config, config_path: PathBuf, cli: &CliArgs) -> Self {
        if let Some(transport) = cli.transport {
            config.transport = transport;
        }
        if let Some(timeout) = cli.timeout {
            config.engine = config.engine.with_timeout(timeout.into());
        }
        Self {
            config,
            config_path,
            output: cli.output,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.config.engine
    }

    pub fn transport(&self) -> TransportChoice {
        self.config.transport
    }

    pub async fn open_session(&self) -> Result<AutomationSession> {
        let engine = self.config.engine.clone();
        match self.config.transport {
            TransportChoice::Devtools => {
                AutomationSession::attach_devtools(self.config.devtools.clone(), engine)
                    .await
                    .with_context(|| {
                        format!(
                            "Failed to attach to {}:{}",
                            self.config.devtools.host, self.config.devtools.port
                        )
                    })
            }
            TransportChoice::Webdriver => {
                AutomationSession::create_webdriver(self.config.webdriver.clone(), engine)
                    .await
                    .with_context(|| {
                        format!("Failed to create session at {}", self.config.webdriver.base_url)
                    })
            }
        }
    }

    /// Close `session` when the configuration asks for it; otherwise leave the remote session up.
    pub async fn finish(&self, session: AutomationSession) -> Result<()> {
        if self.config.engine.auto_close {
            session.close().await.context("Failed to close session")?;
        }
        Ok(())
    }
}
