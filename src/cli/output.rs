use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

/// Print `value` in the requested format; `human` renders through the supplied closure.
pub fn emit<T, F>(format: OutputFormat, value: &T, human: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    let rendered = match format {
        OutputFormat::Human => human(value),
        OutputFormat::Json => {
            serde_json::to_string_pretty(value).context("Failed to encode JSON output")?
        }
        OutputFormat::Yaml => serde_yaml::to_string(value).context("Failed to encode YAML output")?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}
