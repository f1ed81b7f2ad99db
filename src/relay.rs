//! Routes between the IRC connection and the feed pollers.
//!
//! The relay registers on every new connection period, joins the configured
//! channels once the server welcomes it, answers keepalive pings, and
//! announces each new feed item in every channel.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::feed::FeedItem;
use crate::irc::{ping, Event, Line, Transmitter};
use crate::util::{strip_control_chars, truncate_to_bytes};

/// Protocol line limit, CRLF included.
const MAX_LINE_BYTES: usize = 512;

/// Room left for the `:nick!user@host ` prefix the server prepends when it
/// forwards our message to channel members.
const PREFIX_RESERVE: usize = 100;

/// Numeric reply sent once registration completes.
const RPL_WELCOME: &str = "001";

/// Identity sent with `NICK` and `USER` at the start of each connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub nick: String,
    pub user: String,
    pub realname: String,
}

impl Registration {
    fn lines(&self) -> [Line; 2] {
        [
            Line::new("NICK").with_arguments([self.nick.as_str()]),
            Line::new("USER")
                .with_arguments([self.user.as_str(), "0", "*"])
                .with_suffix(self.realname.as_str()),
        ]
    }
}

pub struct Relay {
    registration: Registration,
    channels: Vec<String>,
    transmitter: Option<Transmitter>,
    welcomed: bool,
}

impl Relay {
    pub fn new(registration: Registration, channels: Vec<String>) -> Self {
        Self {
            registration,
            channels,
            transmitter: None,
            welcomed: false,
        }
    }

    /// True between a `Connect` and the following `Disconnect`.
    pub fn is_connected(&self) -> bool {
        self.transmitter.is_some()
    }

    pub fn spawn(
        self,
        events: mpsc::Receiver<Event>,
        items: mpsc::Receiver<FeedItem>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(events, items))
    }

    /// Runs until the connection manager stops producing events.
    ///
    /// Connection events are polled first so a keepalive ping is never stuck
    /// behind a burst of announcements.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<Event>,
        mut items: mpsc::Receiver<FeedItem>,
    ) {
        let mut items_open = true;

        loop {
            tokio::select! {
                biased;

                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                item = items.recv(), if items_open => match item {
                    Some(item) => self.handle_item(&item).await,
                    None => {
                        tracing::info!("All feed pollers stopped");
                        items_open = false;
                    }
                },
            }
        }

        tracing::info!("Connection events ended, relay stopping");
    }

    pub async fn handle_event(&mut self, event: Event) {
        if let Some(pong) = ping::respond(&event) {
            tracing::debug!("Answering keepalive ping");
            self.transmit(pong).await;
            return;
        }

        match event {
            Event::Connect(transmitter) => {
                tracing::info!(nick = %self.registration.nick, "Connected, registering");
                self.transmitter = Some(transmitter);
                self.welcomed = false;
                for line in self.registration.lines() {
                    self.transmit(line).await;
                }
            }
            Event::Disconnect => {
                tracing::info!("Disconnected");
                self.transmitter = None;
                self.welcomed = false;
            }
            Event::Line(line) if line.command == RPL_WELCOME => {
                self.welcomed = true;
                for channel in &self.channels {
                    tracing::info!(channel = %channel, "Joining");
                    self.transmit(Line::new("JOIN").with_arguments([channel.as_str()]))
                        .await;
                }
            }
            Event::Line(line) => {
                tracing::debug!(line = %line, "Ignoring line");
            }
        }
    }

    /// Announces an item in every channel. Dropped when the bridge is not
    /// registered on a live connection.
    pub async fn handle_item(&mut self, item: &FeedItem) {
        if !self.welcomed || self.transmitter.is_none() {
            tracing::warn!(item = %item.identity(), "Not connected, dropping feed item");
            return;
        }

        let text = announcement(item);
        if text.is_empty() {
            tracing::debug!(item = %item.identity(), "Item has no printable text, skipping");
            return;
        }

        for channel in &self.channels {
            let message = truncate_to_bytes(&text, text_budget(channel)).into_owned();
            self.transmit(Line::privmsg(channel.as_str(), message)).await;
        }
    }

    async fn transmit(&self, line: Line) {
        let Some(transmitter) = &self.transmitter else {
            tracing::warn!(line = %line, "No connection, line not sent");
            return;
        };

        if let Err(e) = transmitter.send(line).await {
            tracing::warn!(error = %e, "Send failed");
        }
    }
}

/// Spawns one forwarder per poller so the relay reads a single stream.
/// The merged receiver closes after every poller has stopped.
pub fn merge_items(receivers: Vec<mpsc::Receiver<FeedItem>>) -> mpsc::Receiver<FeedItem> {
    let (tx, rx) = mpsc::channel(1);
    for mut receiver in receivers {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(item) = receiver.recv().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
    }
    rx
}

fn announcement(item: &FeedItem) -> String {
    let title = strip_control_chars(&item.title);
    let link = strip_control_chars(&item.link);
    match (title.is_empty(), link.is_empty()) {
        (false, false) => format!("{} {}", title, link),
        (false, true) => title.into_owned(),
        (true, _) => link.into_owned(),
    }
}

/// Bytes available for message text in `PRIVMSG <target> :<text>\r\n`.
fn text_budget(target: &str) -> usize {
    let overhead = "PRIVMSG ".len() + target.len() + " :".len() + "\r\n".len();
    MAX_LINE_BYTES.saturating_sub(PREFIX_RESERVE + overhead)
}
