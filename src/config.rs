//! File-backed configuration for the `tether` binary.

use cdp_adapter::CdpConfig;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tether_core_types::{EngineConfig, TransportKind};
use wd_adapter::WebDriverConfig;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TransportChoice {
    #[default]
    Devtools,
    Webdriver,
}

impl From<TransportChoice> for TransportKind {
    fn from(choice: TransportChoice) -> Self {
        match choice {
            TransportChoice::Devtools => TransportKind::Devtools,
            TransportChoice::Webdriver => TransportKind::Webdriver,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transport: TransportChoice,
    pub engine: EngineConfig,
    pub devtools: CdpConfig,
    pub webdriver: WebDriverConfig,
}
