use super::env::CliArgs;
use super::eval::cmd_eval;
use super::info::cmd_info;
use super::navigate::cmd_navigate;
use super::sessions::cmd_sessions;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Sessions => cmd_sessions(ctx).await,
        Commands::Eval(args) => cmd_eval(args, ctx).await,
        Commands::Navigate(args) => cmd_navigate(args, ctx).await,
        Commands::Info(args) => cmd_info(args, ctx),
    }
}
