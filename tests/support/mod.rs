#![allow(dead_code)]

pub mod devtools;
pub mod webdriver;

use std::net::SocketAddr;
use std::time::Duration;

use tether_core_types::EngineConfig;

/// Defines `window.__toolkit` in both mock targets.
pub const HELPER_SOURCE: &str = "window.__toolkit = { answer: function () { return 42; } };";
pub const HELPER_CALL: &str = "__toolkit.answer()";

pub fn engine(timeout_ms: u64) -> EngineConfig {
    EngineConfig {
        timeout_ms,
        poll_interval_ms: 20,
        response_poll_ms: 2,
        auto_close: true,
        ..EngineConfig::default()
    }
}

pub async fn serve(router: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock listener");
    let addr = listener.local_addr().expect("mock address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// A loopback port with nothing listening on it at the time of the call.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("probe port");
    listener.local_addr().expect("probe address").port()
}

pub async fn serve_later(router: axum::Router, port: u16, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .expect("bind delayed listener");
        let _ = axum::serve(listener, router).await;
    });
}
