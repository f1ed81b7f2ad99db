//! Text helpers for putting feed content on the wire.
//!
//! - **Sanitizing**: strip control characters that would break a protocol line
//! - **Truncation**: fit text into the protocol's line budget

mod text;

pub use text::{strip_control_chars, truncate_to_bytes};
