use anyhow::{Context, Result};
use cdp_adapter::metrics;
use clap::Args;
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;

use super::context::CliContext;
use super::output::emit;

#[derive(Args, Clone, Debug)]
pub struct InfoArgs {
    /// Print transport counters in Prometheus text exposition format
    #[arg(long)]
    pub prometheus: bool,
}

#[derive(Debug, Serialize)]
struct InfoReport {
    version: &'static str,
    build_date: &'static str,
    git_commit: &'static str,
    config_path: String,
    transport: &'static str,
    timeout_ms: u64,
    poll_interval_ms: u64,
    auto_close: bool,
    devtools_endpoint: String,
    webdriver_url: String,
    metrics: MetricsReport,
}

#[derive(Debug, Serialize)]
struct MetricsReport {
    commands: u64,
    command_success: u64,
    command_failures: u64,
    command_latency_total_us: u64,
    events_ignored: u64,
    stale_responses: u64,
    malformed_frames: u64,
    disconnects: u64,
}

pub fn cmd_info(args: InfoArgs, ctx: &CliContext) -> Result<()> {
    if args.prometheus {
        let registry = Registry::new();
        metrics::register_metrics(&registry);
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        print!("{}", String::from_utf8_lossy(&buffer));
        return Ok(());
    }

    let config = ctx.config();
    let snapshot = metrics::snapshot();
    let devtools_endpoint = match &config.devtools.websocket_url {
        Some(url) => url.clone(),
        None => format!(
            "http://{}:{}{}",
            config.devtools.host, config.devtools.port, config.devtools.metadata_path
        ),
    };
    let report = InfoReport {
        version: env!("CARGO_PKG_VERSION"),
        build_date: env!("BUILD_DATE"),
        git_commit: env!("GIT_HASH"),
        config_path: ctx.config_path().display().to_string(),
        transport: tether_core_types::TransportKind::from(ctx.transport()).as_str(),
        timeout_ms: config.engine.timeout_ms,
        poll_interval_ms: config.engine.poll_interval_ms,
        auto_close: config.engine.auto_close,
        devtools_endpoint,
        webdriver_url: config.webdriver.base_url.clone(),
        metrics: MetricsReport {
            commands: snapshot.commands,
            command_success: snapshot.command_success,
            command_failures: snapshot.command_failures,
            command_latency_total_us: snapshot.command_latency_total_us,
            events_ignored: snapshot.events_ignored,
            stale_responses: snapshot.stale_responses,
            malformed_frames: snapshot.malformed_frames,
            disconnects: snapshot.disconnects,
        },
    };
    emit(ctx.output(), &report, render_info)
}

fn render_info(report: &InfoReport) -> String {
    let mut out = String::new();
    out.push_str("Tether System Information\n");
    out.push_str("=========================\n");
    out.push_str(&format!("Version: {}\n", report.version));
    out.push_str(&format!("Build Date: {}\n", report.build_date));
    out.push_str(&format!("Git Commit: {}\n\n", report.git_commit));
    out.push_str("Configuration:\n");
    out.push_str(&format!("- Config File: {}\n", report.config_path));
    out.push_str(&format!("- Transport: {}\n", report.transport));
    out.push_str(&format!("- Timeout: {}ms\n", report.timeout_ms));
    out.push_str(&format!("- Poll Interval: {}ms\n", report.poll_interval_ms));
    out.push_str(&format!("- Auto Close: {}\n", report.auto_close));
    out.push_str(&format!("- DevTools Endpoint: {}\n", report.devtools_endpoint));
    out.push_str(&format!("- WebDriver URL: {}\n\n", report.webdriver_url));
    let m = &report.metrics;
    out.push_str("Transport Counters:\n");
    out.push_str(&format!("- Commands: {} ({} ok, {} failed)\n", m.commands, m.command_success, m.command_failures));
    out.push_str(&format!("- Latency Total: {}us\n", m.command_latency_total_us));
    out.push_str(&format!("- Events Ignored: {}\n", m.events_ignored));
    out.push_str(&format!("- Stale Responses: {}\n", m.stale_responses));
    out.push_str(&format!("- Malformed Frames: {}\n", m.malformed_frames));
    out.push_str(&format!("- Disconnects: {}\n", m.disconnects));
    out
}
