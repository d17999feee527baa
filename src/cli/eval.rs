use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use tether_automation::ScriptOutcome;

use super::context::CliContext;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct EvalArgs {
    /// Expression to evaluate in the remote document
    pub expression: String,

    /// Navigate here first
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// Return arrays and objects even on transports with a scalar-only return channel
    #[arg(long)]
    pub structured: bool,

    /// Helper script injected when the expression references an undefined symbol
    #[arg(long, value_name = "FILE")]
    pub helper: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct EvalReport {
    expression: String,
    kind: &'static str,
    value: String,
}

pub async fn cmd_eval(args: EvalArgs, ctx: &CliContext) -> Result<()> {
    let helper = match &args.helper {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read helper {}", path.display()))?,
        ),
        None => None,
    };

    let session = ctx.open_session().await?;
    if let Some(url) = &args.url {
        session
            .navigate_to(url)
            .await
            .with_context(|| format!("Failed to navigate to {url}"))?;
    }
    let scripts = session.scripts();
    let outcome = match (&helper, args.structured) {
        (Some(source), _) => scripts.evaluate_with_helper(&args.expression, source).await,
        (None, true) => scripts.evaluate_structured(&args.expression).await,
        (None, false) => session.execute_script(&args.expression).await,
    }
    .context("Evaluation failed")?;
    ctx.finish(session).await?;

    let (kind, value) = match outcome {
        ScriptOutcome::Scalar(text) => ("scalar", text),
        ScriptOutcome::Structured(text) => ("structured", text),
        ScriptOutcome::Undefined => ("undefined", "undefined".to_string()),
        ScriptOutcome::NotDefined => {
            bail!("Expression references a symbol that is not defined in the page")
        }
    };
    let report = EvalReport {
        expression: args.expression,
        kind,
        value,
    };
    emit(ctx.output(), &report, |report| report.value.clone())
}
