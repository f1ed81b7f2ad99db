use super::event::Event;
use super::line::Line;

/// Keepalive rule: answers every `PING` with a `PONG` echoing its parameters.
///
/// Stateless. Servers drop clients that miss a ping, so callers should apply
/// this before any slower handling of the same event.
pub fn respond(event: &Event) -> Option<Line> {
    let line = event.as_line()?;
    if line.command != "PING" {
        return None;
    }

    Some(Line {
        prefix: None,
        command: "PONG".to_string(),
        arguments: line.arguments.clone(),
        suffix: line.suffix.clone(),
    })
}
