//! Connection manager: dials the server, frames the byte stream into lines
//! and recovers from dropped connections.
//!
//! Each successful dial opens a *connection period*. For its duration the
//! manager runs the read loop in its own task and spawns a writer task that
//! drains the period's outbound channel. When the server closes the stream the
//! outbound channel is closed, a [`Event::Disconnect`] is emitted and the
//! manager dials again. Dial failures are retried forever.

use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::event::{Event, Transmitter};
use super::line::Line;

/// Wait between dial attempts under the default policy.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);
/// Inactivity deadline applied to every read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Inbound events are handed over one at a time so a slow consumer pushes
/// back on the read loop.
const EVENT_CHANNEL_CAPACITY: usize = 1;
const OUTBOUND_CHANNEL_CAPACITY: usize = 1;

/// Longest inbound line kept for parsing. Protocol lines are at most 512
/// bytes; longer input is dropped up to the next newline.
const MAX_INBOUND_LINE: usize = 8 * 1024;

// ============================================================================
// Dialing
// ============================================================================

/// Opens the byte stream for a new connection period.
pub trait Dialer: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    fn dial(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// Human-readable target, used in logs.
    fn target(&self) -> &str;
}

/// Plain TCP to a `host:port` address.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    addr: String,
}

impl TcpDialer {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl Dialer for TcpDialer {
    type Stream = TcpStream;

    fn dial(&self) -> impl Future<Output = io::Result<TcpStream>> + Send {
        let addr = self.addr.clone();
        async move { TcpStream::connect(addr).await }
    }

    fn target(&self) -> &str {
        &self.addr
    }
}

// ============================================================================
// Policies
// ============================================================================

/// How long to wait after a failed dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Same delay after every failure.
    Fixed(Duration),
    /// Doubles from `initial` after each consecutive failure, capped at `max`.
    /// The count resets once a dial succeeds.
    Exponential { initial: Duration, max: Duration },
}

impl RetryPolicy {
    /// Delay before the next dial, given how many dials have failed in a row
    /// before this one (0 for the first failure).
    pub fn delay(&self, failures: u32) -> Duration {
        match *self {
            RetryPolicy::Fixed(delay) => delay,
            RetryPolicy::Exponential { initial, max } => initial
                .saturating_mul(2u32.saturating_pow(failures))
                .min(max),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Fixed(DEFAULT_RETRY_DELAY)
    }
}

/// What a read that hits the inactivity deadline does to the connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadTimeoutPolicy {
    /// Log and keep reading from the same socket.
    #[default]
    Continue,
    /// Treat the socket as dead and start a new connection period.
    Reconnect,
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub retry: RetryPolicy,
    pub read_timeout: Duration,
    pub on_read_timeout: ReadTimeoutPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            on_read_timeout: ReadTimeoutPolicy::default(),
        }
    }
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// The inbound receiver was dropped; nobody is left to serve.
struct ConsumerGone;

enum ReadOutcome {
    EndOfStream,
    ConsumerGone,
}

// ============================================================================
// Manager
// ============================================================================

pub struct ConnectionManager<D: Dialer = TcpDialer> {
    dialer: D,
    config: ConnectionConfig,
    inbound: mpsc::Sender<Event>,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionManager<TcpDialer> {
    /// Manager for a plain TCP server at `addr` (`host:port`).
    ///
    /// Returns the manager together with the inbound event receiver.
    pub fn new(addr: impl Into<String>, config: ConnectionConfig) -> (Self, mpsc::Receiver<Event>) {
        Self::with_dialer(TcpDialer::new(addr), config)
    }
}

impl<D: Dialer> ConnectionManager<D> {
    pub fn with_dialer(dialer: D, config: ConnectionConfig) -> (Self, mpsc::Receiver<Event>) {
        let (inbound, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let manager = Self {
            dialer,
            config,
            inbound,
            state,
        };
        (manager, events)
    }

    /// Read-only view of the connection state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs connection periods back to back until the inbound receiver is
    /// dropped.
    pub async fn run(self) {
        let mut failures: u32 = 0;

        loop {
            if self.inbound.is_closed() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            tracing::info!(server = %self.dialer.target(), "Dialing");

            let stream = match self.dialer.dial().await {
                Ok(stream) => stream,
                Err(e) => {
                    let delay = self.config.retry.delay(failures);
                    failures = failures.saturating_add(1);
                    tracing::warn!(
                        server = %self.dialer.target(),
                        error = %e,
                        failures = failures,
                        retry_in_secs = delay.as_secs(),
                        "Could not connect, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };
            failures = 0;

            if self.serve(stream).await.is_err() {
                break;
            }
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::info!(
            server = %self.dialer.target(),
            "Event receiver dropped, connection manager stopping"
        );
    }

    /// One connection period: writer up, Connect out, read until the stream
    /// ends, writer down, Disconnect out.
    async fn serve(&self, stream: D::Stream) -> Result<(), ConsumerGone> {
        let (reader, writer) = tokio::io::split(stream);
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let (stop_writer, stop_rx) = oneshot::channel();
        tokio::spawn(write_loop(writer, outbound_rx, stop_rx));

        self.set_state(ConnectionState::Connected);
        tracing::info!(server = %self.dialer.target(), "Connected");

        let outcome = match self
            .inbound
            .send(Event::Connect(Transmitter::new(outbound)))
            .await
        {
            Ok(()) => self.read_loop(reader).await,
            Err(_) => ReadOutcome::ConsumerGone,
        };

        // Closes the outbound channel; every Transmitter for this period now
        // fails fast.
        let _ = stop_writer.send(());
        self.set_state(ConnectionState::Disconnected);

        match outcome {
            ReadOutcome::EndOfStream => {
                tracing::info!(server = %self.dialer.target(), "Disconnected");
                self.inbound
                    .send(Event::Disconnect)
                    .await
                    .map_err(|_| ConsumerGone)
            }
            ReadOutcome::ConsumerGone => Err(ConsumerGone),
        }
    }

    async fn read_loop(&self, reader: ReadHalf<D::Stream>) -> ReadOutcome {
        let mut reader = BufReader::new(reader);
        // Bytes of a partial line survive a read timeout: `read_until` keeps
        // whatever it consumed in `buf`.
        let mut buf = Vec::new();
        let mut discarding = false;

        loop {
            // `buf` is cleared before it reaches the cap, so the limit is never 0.
            let limit = MAX_INBOUND_LINE.saturating_sub(buf.len()) as u64;
            let read = tokio::time::timeout(
                self.config.read_timeout,
                (&mut reader).take(limit).read_until(b'\n', &mut buf),
            )
            .await;

            match read {
                Err(_) => match self.config.on_read_timeout {
                    ReadTimeoutPolicy::Continue => {
                        tracing::warn!(
                            timeout_secs = self.config.read_timeout.as_secs(),
                            "Read deadline passed with no data, still waiting"
                        );
                    }
                    ReadTimeoutPolicy::Reconnect => {
                        tracing::warn!(
                            timeout_secs = self.config.read_timeout.as_secs(),
                            "Read deadline passed with no data, reconnecting"
                        );
                        return ReadOutcome::EndOfStream;
                    }
                },
                Ok(Ok(0)) => {
                    tracing::info!("Server closed the connection");
                    return ReadOutcome::EndOfStream;
                }
                Ok(Ok(_)) => {
                    let complete = buf.ends_with(b"\n");
                    if !complete && buf.len() >= MAX_INBOUND_LINE {
                        if !discarding {
                            tracing::warn!(limit = MAX_INBOUND_LINE, "Dropping overlong line");
                        }
                        discarding = true;
                        buf.clear();
                        continue;
                    }
                    if discarding {
                        // Tail of an overlong line.
                        discarding = !complete;
                        buf.clear();
                        continue;
                    }

                    let parsed = {
                        let raw = String::from_utf8_lossy(&buf);
                        Line::parse(&raw).map_err(|e| (e, raw.trim_end().to_string()))
                    };
                    buf.clear();

                    match parsed {
                        Ok(line) => {
                            tracing::debug!(line = %line, "Received");
                            if self.inbound.send(Event::Line(line)).await.is_err() {
                                return ReadOutcome::ConsumerGone;
                            }
                        }
                        Err((e, raw)) => {
                            tracing::warn!(error = %e, raw = %raw, "Dropping unparseable line");
                        }
                    }
                }
                Ok(Err(e)) if is_end_of_stream(&e) => {
                    tracing::info!(error = %e, "Connection lost while reading");
                    return ReadOutcome::EndOfStream;
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Read error");
                }
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Connection state changed");
        }
    }
}

/// Drains one period's outbound channel onto the socket.
async fn write_loop<W>(mut writer: W, mut outbound: mpsc::Receiver<Line>, mut stop: oneshot::Receiver<()>)
where
    W: AsyncWrite + Unpin,
{
    loop {
        let line = tokio::select! {
            biased;
            _ = &mut stop => break,
            line = outbound.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        match send_line(&mut writer, &line).await {
            Ok(()) => {}
            Err(e) if is_end_of_stream(&e) => {
                tracing::info!(error = %e, "Connection lost while writing, writer stopping");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, line = %line, "Failed to send line");
            }
        }
    }

    outbound.close();
    tracing::debug!("Writer stopped");
}

async fn send_line<W>(writer: &mut W, line: &Line) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    tracing::debug!(line = %line, "Sending");
    writer.write_all(line.format().as_bytes()).await?;
    writer.flush().await
}

fn is_end_of_stream(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}
