use anyhow::{bail, Context, Result};
use cdp_adapter::{SessionDescriptor, SessionDiscovery};

use super::context::CliContext;
use super::output::emit;
use crate::config::TransportChoice;

pub async fn cmd_sessions(ctx: &CliContext) -> Result<()> {
    if ctx.transport() != TransportChoice::Devtools {
        bail!("Session listing requires the devtools transport");
    }
    let discovery =
        SessionDiscovery::new(&ctx.config().devtools).context("Invalid devtools configuration")?;
    let sessions = discovery
        .list_sessions(ctx.engine().timeout())
        .await
        .with_context(|| format!("Failed to list sessions at {}", discovery.endpoint()))?;
    emit(ctx.output(), &sessions, render_sessions)
}

fn render_sessions(sessions: &Vec<SessionDescriptor>) -> String {
    let mut lines = Vec::with_capacity(sessions.len() + 1);
    lines.push(format!("{} automatable session(s)", sessions.len()));
    for session in sessions {
        let title = if session.title.is_empty() {
            "(untitled)"
        } else {
            session.title.as_str()
        };
        lines.push(format!("- {}  {}  {}", session.id, title, session.url));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_one_line_per_session() {
        let sessions = vec![SessionDescriptor {
            id: "A1".into(),
            url: "https://example.test/".into(),
            ..SessionDescriptor::default()
        }];
        let text = render_sessions(&sessions);
        assert_eq!(text, "1 automatable session(s)\n- A1  (untitled)  https://example.test/");
    }
}
