use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{
    core::Collector, histogram_opts, HistogramVec, IntCounter, IntCounterVec, Registry,
};
use tracing::error;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdapterMetricsSnapshot {
    pub commands: u64,
    pub command_success: u64,
    pub command_failures: u64,
    pub command_latency_total_us: u64,
    pub events_ignored: u64,
    pub stale_responses: u64,
    pub malformed_frames: u64,
    pub disconnects: u64,
}

static COMMANDS: AtomicU64 = AtomicU64::new(0);
static COMMAND_SUCCESS: AtomicU64 = AtomicU64::new(0);
static COMMAND_FAILURES: AtomicU64 = AtomicU64::new(0);
static COMMAND_LATENCY_TOTAL_US: AtomicU64 = AtomicU64::new(0);
static EVENTS_IGNORED: AtomicU64 = AtomicU64::new(0);
static STALE_RESPONSES: AtomicU64 = AtomicU64::new(0);
static MALFORMED_FRAMES: AtomicU64 = AtomicU64::new(0);
static DISCONNECTS: AtomicU64 = AtomicU64::new(0);

lazy_static! {
    static ref CDP_COMMANDS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("tether_cdp_commands_total", "Total DevTools requests sent"),
        &["method"]
    )
    .unwrap();
    static ref CDP_COMMAND_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "tether_cdp_command_failures_total",
            "Total DevTools requests that failed or timed out"
        ),
        &["method"]
    )
    .unwrap();
    static ref CDP_COMMAND_DURATION: HistogramVec = HistogramVec::new(
        histogram_opts!(
            "tether_cdp_command_duration_seconds",
            "DevTools request round-trip latency",
            vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]
        ),
        &["method"]
    )
    .unwrap();
    static ref CDP_EVENTS_IGNORED_TOTAL: IntCounter = IntCounter::new(
        "tether_cdp_events_ignored_total",
        "Unsolicited notifications dropped by the receive loop"
    )
    .unwrap();
    static ref CDP_STALE_RESPONSES_TOTAL: IntCounter = IntCounter::new(
        "tether_cdp_stale_responses_total",
        "Responses that arrived after their request was abandoned"
    )
    .unwrap();
    static ref CDP_MALFORMED_FRAMES_TOTAL: IntCounter = IntCounter::new(
        "tether_cdp_malformed_frames_total",
        "Inbound frames that could not be decoded"
    )
    .unwrap();
    static ref CDP_DISCONNECTS_TOTAL: IntCounter = IntCounter::new(
        "tether_cdp_disconnects_total",
        "Sockets that terminated without a local close"
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register cdp metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, CDP_COMMANDS_TOTAL.clone());
    register(registry, CDP_COMMAND_FAILURES_TOTAL.clone());
    register(registry, CDP_COMMAND_DURATION.clone());
    register(registry, CDP_EVENTS_IGNORED_TOTAL.clone());
    register(registry, CDP_STALE_RESPONSES_TOTAL.clone());
    register(registry, CDP_MALFORMED_FRAMES_TOTAL.clone());
    register(registry, CDP_DISCONNECTS_TOTAL.clone());
}

pub fn record_command(method: &str) {
    COMMANDS.fetch_add(1, Ordering::Relaxed);
    CDP_COMMANDS_TOTAL.with_label_values(&[method]).inc();
}

pub fn record_command_success(method: &str, duration: Duration) {
    COMMAND_SUCCESS.fetch_add(1, Ordering::Relaxed);
    let micros = duration.as_micros().min(u64::MAX as u128) as u64;
    COMMAND_LATENCY_TOTAL_US.fetch_add(micros, Ordering::Relaxed);
    CDP_COMMAND_DURATION
        .with_label_values(&[method])
        .observe(duration.as_secs_f64());
}

pub fn record_command_failure(method: &str) {
    COMMAND_FAILURES.fetch_add(1, Ordering::Relaxed);
    CDP_COMMAND_FAILURES_TOTAL
        .with_label_values(&[method])
        .inc();
}

pub fn record_event_ignored() {
    EVENTS_IGNORED.fetch_add(1, Ordering::Relaxed);
    CDP_EVENTS_IGNORED_TOTAL.inc();
}

pub fn record_stale_response() {
    STALE_RESPONSES.fetch_add(1, Ordering::Relaxed);
    CDP_STALE_RESPONSES_TOTAL.inc();
}

pub fn record_malformed_frame() {
    MALFORMED_FRAMES.fetch_add(1, Ordering::Relaxed);
    CDP_MALFORMED_FRAMES_TOTAL.inc();
}

pub fn record_disconnect() {
    DISCONNECTS.fetch_add(1, Ordering::Relaxed);
    CDP_DISCONNECTS_TOTAL.inc();
}

pub fn snapshot() -> AdapterMetricsSnapshot {
    AdapterMetricsSnapshot {
        commands: COMMANDS.load(Ordering::Relaxed),
        command_success: COMMAND_SUCCESS.load(Ordering::Relaxed),
        command_failures: COMMAND_FAILURES.load(Ordering::Relaxed),
        command_latency_total_us: COMMAND_LATENCY_TOTAL_US.load(Ordering::Relaxed),
        events_ignored: EVENTS_IGNORED.load(Ordering::Relaxed),
        stale_responses: STALE_RESPONSES.load(Ordering::Relaxed),
        malformed_frames: MALFORMED_FRAMES.load(Ordering::Relaxed),
        disconnects: DISCONNECTS.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    COMMANDS.store(0, Ordering::Relaxed);
    COMMAND_SUCCESS.store(0, Ordering::Relaxed);
    COMMAND_FAILURES.store(0, Ordering::Relaxed);
    COMMAND_LATENCY_TOTAL_US.store(0, Ordering::Relaxed);
    EVENTS_IGNORED.store(0, Ordering::Relaxed);
    STALE_RESPONSES.store(0, Ordering::Relaxed);
    MALFORMED_FRAMES.store(0, Ordering::Relaxed);
    DISCONNECTS.store(0, Ordering::Relaxed);
}
