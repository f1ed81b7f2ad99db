//! IRC client plumbing: line codec, connection manager and keepalive.
//!
//! - [`line`] - parse and format wire lines
//! - [`event`] - inbound events and the per-connection [`Transmitter`]
//! - [`connection`] - dial, read, write and reconnect
//! - [`ping`] - answer server keepalive pings

mod connection;
mod event;
mod line;
pub mod ping;

pub use connection::{
    ConnectionConfig, ConnectionManager, ConnectionState, Dialer, ReadTimeoutPolicy, RetryPolicy,
    TcpDialer, DEFAULT_READ_TIMEOUT, DEFAULT_RETRY_DELAY,
};
pub use event::{Event, TransmitError, Transmitter};
pub use line::{Line, LineError};
