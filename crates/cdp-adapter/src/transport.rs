//! Persistent WebSocket connection with a supervised receive loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use tether_core_types::{EngineError, EngineErrorKind, Request, SessionLog};
use tether_wait::Deadline;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn, Instrument};

use crate::config::CdpConfig;
use crate::frame::{response_id, Assembled, FrameAssembler};
use crate::metrics;
use crate::table::{Delivery, PendingResponseTable};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

const CLOSE_GRACE: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called on this side.
    Local,
    /// The remote end sent a close frame or ended the stream.
    Remote,
    /// The socket failed with an I/O or protocol error.
    Aborted(String),
    /// The receive loop ended without reporting why (panic or cancellation).
    Faulted(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed(CloseReason),
}

/// One attached DevTools socket.
///
/// Exactly one receive loop runs per connection. It decodes frames and stores responses in the
/// [`PendingResponseTable`]; it never calls back into caller code. Its termination, clean or
/// not, is published through the connection state so senders and waiters observe it.
pub struct SocketConnection {
    endpoint: String,
    sink: Mutex<WsSink>,
    table: Arc<PendingResponseTable>,
    state: Arc<watch::Sender<ConnectionState>>,
    receiver: SyncMutex<Option<JoinHandle<()>>>,
    closing: Arc<AtomicBool>,
    log: SessionLog,
}

impl SocketConnection {
    pub async fn connect(
        endpoint: &str,
        timeout: Duration,
        config: &CdpConfig,
        log: SessionLog,
    ) -> Result<Self, EngineError> {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let attempt = tether_wait::retry(timeout, config.retry_backoff(), || async move {
            connect_async(endpoint).await.map_err(|err| {
                EngineError::new(EngineErrorKind::Connect)
                    .with_hint(format!("{endpoint}: {err}"))
                    .retriable(true)
            })
        });
        let (stream, _) = match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(EngineError::new(EngineErrorKind::Connect)
                    .with_hint(format!("{endpoint}: handshake did not finish within {timeout:?}"))
                    .retriable(true))
            }
        };
        let (sink, stream) = stream.split();
        let table = Arc::new(PendingResponseTable::new());
        let state = Arc::new(state);
        let closing = Arc::new(AtomicBool::new(false));
        state.send_replace(ConnectionState::Open);

        let task = tokio::spawn(
            receive_loop(
                stream,
                Arc::clone(&table),
                Arc::clone(&state),
                Arc::clone(&closing),
                config.max_frame_bytes,
            )
            .instrument(log.span().clone()),
        );
        log.span().in_scope(|| {
            info!(target: "cdp-transport", endpoint, "socket connected");
        });

        Ok(Self {
            endpoint: endpoint.to_string(),
            sink: Mutex::new(sink),
            table,
            state,
            receiver: SyncMutex::new(Some(task)),
            closing,
            log,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn table(&self) -> &Arc<PendingResponseTable> {
        &self.table
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state.borrow(), ConnectionState::Open)
    }

    /// Resolves once the connection has closed for any reason.
    pub async fn closed(&self) -> CloseReason {
        let mut rx = self.state.subscribe();
        let result = rx
            .wait_for(|state| matches!(state, ConnectionState::Closed(_)))
            .await
            .map(|state| state.clone());
        match result {
            Ok(ConnectionState::Closed(reason)) => reason,
            _ => CloseReason::Faulted("connection state dropped".to_string()),
        }
    }

    /// Write one request frame. Fails with a disconnect error when the socket is already closed.
    pub async fn send(&self, request: &Request, timeout: Duration) -> Result<(), EngineError> {
        if !self.is_open() {
            return Err(EngineError::disconnected(format!(
                "{} is closed ({:?})",
                self.endpoint,
                self.state()
            )));
        }
        let text = serde_json::to_string(request).map_err(|err| {
            EngineError::new(EngineErrorKind::Send).with_hint(format!("encode {}: {err}", request.method))
        })?;
        let deadline = Deadline::after(timeout);
        let mut sink = tokio::time::timeout(deadline.remaining(), self.sink.lock())
            .await
            .map_err(|_| self.send_timeout(request, timeout))?;
        let written = tokio::time::timeout(deadline.remaining(), sink.send(Message::Text(text)))
            .await
            .map_err(|_| self.send_timeout(request, timeout))?;
        match written {
            Ok(()) => {
                trace!(target: "cdp-transport", id = request.id, method = %request.method, "request written");
                Ok(())
            }
            Err(err) if is_closed_error(&err) => {
                mark_closed(&self.state, CloseReason::Aborted(err.to_string()));
                Err(EngineError::disconnected(format!(
                    "{} closed while sending {}: {err}",
                    self.endpoint, request.method
                )))
            }
            Err(err) => Err(EngineError::new(EngineErrorKind::Send)
                .with_hint(format!("{}: {err}", request.method))
                .retriable(true)),
        }
    }

    fn send_timeout(&self, request: &Request, timeout: Duration) -> EngineError {
        EngineError::new(EngineErrorKind::Send)
            .with_hint(format!(
                "{} (id {}) not written within {timeout:?}",
                request.method, request.id
            ))
            .retriable(true)
    }

    /// Idempotent; safe after the receive loop has already exited.
    pub async fn close(&self) -> Result<(), EngineError> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.is_open() {
            if let Ok(mut sink) = tokio::time::timeout(CLOSE_GRACE, self.sink.lock()).await {
                let _ = tokio::time::timeout(CLOSE_GRACE, sink.send(Message::Close(None))).await;
            }
        }
        let handle = self.receiver.lock().take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(CLOSE_GRACE, &mut handle).await.is_err() {
                handle.abort();
            }
        }
        mark_closed(&self.state, CloseReason::Local);
        let abandoned = self.table.len();
        self.log.span().in_scope(|| {
            debug!(target: "cdp-transport", endpoint = %self.endpoint, abandoned, "socket closed");
        });
        Ok(())
    }
}

impl Drop for SocketConnection {
    fn drop(&mut self) {
        if let Some(handle) = self.receiver.lock().take() {
            handle.abort();
        }
    }
}

fn is_closed_error(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Io(_)
    )
}

/// Publish a terminal state. An earlier terminal state is never overwritten.
fn mark_closed(state: &watch::Sender<ConnectionState>, reason: CloseReason) {
    state.send_if_modified(|current| {
        if matches!(current, ConnectionState::Closed(_)) {
            false
        } else {
            *current = ConnectionState::Closed(reason);
            true
        }
    });
}

struct ReceiveGuard {
    state: Arc<watch::Sender<ConnectionState>>,
    finished: bool,
}

impl Drop for ReceiveGuard {
    fn drop(&mut self) {
        if !self.finished {
            mark_closed(
                &self.state,
                CloseReason::Faulted("receive loop stopped unexpectedly".to_string()),
            );
        }
    }
}

async fn receive_loop(
    mut stream: SplitStream<WsStream>,
    table: Arc<PendingResponseTable>,
    state: Arc<watch::Sender<ConnectionState>>,
    closing: Arc<AtomicBool>,
    max_frame_bytes: usize,
) {
    let mut guard = ReceiveGuard {
        state: Arc::clone(&state),
        finished: false,
    };
    let mut assembler = FrameAssembler::new(max_frame_bytes);
    let local = || closing.load(Ordering::SeqCst);
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => dispatch(&mut assembler, &table, &text),
            Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                Ok(text) => dispatch(&mut assembler, &table, text),
                Err(err) => {
                    metrics::record_malformed_frame();
                    warn!(target: "cdp-transport", %err, "dropping non-utf8 binary frame");
                }
            },
            Some(Ok(Message::Close(frame))) => {
                debug!(target: "cdp-transport", ?frame, "close frame received");
                break if local() { CloseReason::Local } else { CloseReason::Remote };
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                break if local() {
                    CloseReason::Local
                } else {
                    CloseReason::Aborted(err.to_string())
                };
            }
            None => break if local() { CloseReason::Local } else { CloseReason::Remote },
        }
    };
    if reason != CloseReason::Local {
        metrics::record_disconnect();
        warn!(
            target: "cdp-transport",
            ?reason,
            outstanding = table.len(),
            "socket terminated by remote"
        );
    }
    mark_closed(&state, reason);
    guard.finished = true;
}

fn dispatch(assembler: &mut FrameAssembler, table: &PendingResponseTable, chunk: &str) {
    match assembler.push(chunk) {
        Assembled::Partial => {
            trace!(target: "cdp-transport", pending = assembler.pending_bytes(), "partial frame buffered");
        }
        Assembled::Malformed(reason) => {
            metrics::record_malformed_frame();
            warn!(target: "cdp-transport", %reason, "dropping malformed frame");
        }
        Assembled::Resynced { message, discarded } => {
            metrics::record_malformed_frame();
            warn!(target: "cdp-transport", discarded, "dropping incomplete frame superseded by a new message");
            route(table, message);
        }
        Assembled::Complete(message) => route(table, message),
    }
}

fn route(table: &PendingResponseTable, message: Value) {
    match response_id(&message) {
        Some(id) => match table.deliver(id, message) {
            Delivery::Stored => trace!(target: "cdp-transport", id, "response stored"),
            Delivery::Stale => {
                metrics::record_stale_response();
                debug!(target: "cdp-transport", id, "dropping response for abandoned request");
            }
            Delivery::Duplicate => {
                warn!(target: "cdp-transport", id, "dropping duplicate response");
            }
        },
        None => {
            metrics::record_event_ignored();
            trace!(
                target: "cdp-transport",
                method = message.get("method").and_then(|m| m.as_str()).unwrap_or_default(),
                "ignoring unsolicited event"
            );
        }
    }
}
