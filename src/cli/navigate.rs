use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use super::context::CliContext;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct NavigateArgs {
    /// Destination URL
    pub url: String,
}

#[derive(Debug, Serialize)]
struct NavigateReport {
    requested: String,
    url: String,
    transport: &'static str,
}

pub async fn cmd_navigate(args: NavigateArgs, ctx: &CliContext) -> Result<()> {
    let session = ctx.open_session().await?;
    let url = session
        .navigate_to(&args.url)
        .await
        .with_context(|| format!("Failed to navigate to {}", args.url))?;
    let transport = session.kind().as_str();
    ctx.finish(session).await?;

    let report = NavigateReport {
        requested: args.url,
        url,
        transport,
    };
    emit(ctx.output(), &report, |report| {
        format!("Navigated to {} via {}", report.url, report.transport)
    })
}
