use thiserror::Error;
use tokio::sync::mpsc;

use super::line::Line;

/// Sending on a connection period that has already ended.
#[derive(Debug, Error)]
#[error("connection closed; line not sent: {0}")]
pub struct TransmitError(pub Line);

/// Inbound events produced by the connection manager.
///
/// Only [`Line`]s ever travel outbound: the lifecycle variants have no path
/// onto the wire, and the [`Transmitter`] for a connection period arrives
/// with the `Connect` that opens it.
#[derive(Debug)]
pub enum Event {
    /// A connection period started. Lines sent through the transmitter are
    /// written to this connection until the matching `Disconnect`.
    Connect(Transmitter),
    /// The connection period ended; its transmitter is now closed.
    Disconnect,
    /// A parsed line from the server, in wire arrival order.
    Line(Line),
}

impl Event {
    pub fn as_line(&self) -> Option<&Line> {
        match self {
            Event::Line(line) => Some(line),
            _ => None,
        }
    }
}

/// Handle onto the outbound channel of one connection period.
///
/// Cheap to clone. Once the period ends the writer closes the channel, so
/// every clone fails fast instead of queueing into a dead socket.
#[derive(Debug, Clone)]
pub struct Transmitter {
    tx: mpsc::Sender<Line>,
}

impl Transmitter {
    pub(crate) fn new(tx: mpsc::Sender<Line>) -> Self {
        Self { tx }
    }

    /// Queues a line for the writer task, waiting for channel capacity.
    pub async fn send(&self, line: Line) -> Result<(), TransmitError> {
        self.tx.send(line).await.map_err(|e| TransmitError(e.0))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
