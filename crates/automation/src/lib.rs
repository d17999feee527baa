//! Session-level automation on top of a [`tether_core_types::Protocol`].
//!
//! Nothing here knows which transport is underneath: navigation readiness is delegated to
//! `Protocol::is_settled`, and structured results fall back to the marker-element convention when
//! the transport cannot return them directly.

pub mod navigation;
pub mod script;
pub mod session;

#[cfg(test)]
mod fake;

pub use navigation::NavigationController;
pub use script::{ScriptBridge, ScriptOutcome};
pub use session::AutomationSession;
