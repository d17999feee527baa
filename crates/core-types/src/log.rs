//! Per-session logging context.

use tracing::Span;

use crate::ids::SessionId;
use crate::protocol::TransportKind;

/// Logging context created when a session attaches and dropped with it.
///
/// Components that log on behalf of a session receive one of these explicitly instead of
/// reaching for process-wide state; every record they emit carries the session reference id.
#[derive(Clone, Debug)]
pub struct SessionLog {
    session: SessionId,
    transport: TransportKind,
    span: Span,
}

impl SessionLog {
    pub fn new(transport: TransportKind, endpoint: &str) -> Self {
        let session = SessionId::new();
        let span = tracing::info_span!(
            "session",
            reference = %session,
            transport = transport.as_str(),
            endpoint = %endpoint,
        );
        Self {
            session,
            transport,
            span,
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Short reference id suitable for log fields and error hints.
    pub fn reference(&self) -> String {
        self.session.to_string()
    }

    /// Child context for a re-established connection of the same session.
    pub fn reattached(&self, endpoint: &str) -> Self {
        let span = tracing::info_span!(
            parent: &self.span,
            "reattach",
            endpoint = %endpoint,
        );
        Self {
            session: self.session,
            transport: self.transport,
            span,
        }
    }
}
