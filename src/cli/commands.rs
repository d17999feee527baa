use clap::Subcommand;

use super::eval::EvalArgs;
use super::info::InfoArgs;
use super::navigate::NavigateArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// List automatable sessions exposed by the debug endpoint
    Sessions,

    /// Evaluate an expression in the attached session
    Eval(EvalArgs),

    /// Navigate the attached session and wait for the document to settle
    Navigate(NavigateArgs),

    /// Show version, effective configuration and transport counters
    Info(InfoArgs),
}
