//! Announce new RSS/RDF/Atom feed items in IRC channels.
//!
//! - [`irc`] - line codec, reconnecting connection manager, keepalive
//! - [`feed`] - fetch, decode and dedup feed items
//! - [`relay`] - route events and items between the two
//! - [`config`] - TOML configuration

pub mod config;
pub mod feed;
pub mod irc;
pub mod relay;
pub mod util;
