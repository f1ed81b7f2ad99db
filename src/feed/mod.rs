//! Feed polling: fetch syndication documents and surface items not seen before.
//!
//! - [`parser`] - RSS/RDF decoding on `quick-xml`, Atom through `feed-rs`
//! - [`fetcher`] - `file://` and HTTP(S) retrieval
//! - [`cache`] - pluggable seen-item stores
//! - [`poller`] - the per-feed worker tying them together
//!
//! # Example
//!
//! ```ignore
//! use feedbridge::feed::{FeedPoller, FeedSource};
//!
//! let source = FeedSource::parse("https://example.com/rss")?;
//! let (poller, mut items) = FeedPoller::new(source, client, Duration::from_secs(600));
//! poller.spawn();
//! while let Some(item) = items.recv().await {
//!     println!("{}", item.title);
//! }
//! ```

mod cache;
mod fetcher;
mod parser;
mod poller;

pub use cache::{CacheError, DedupCache, LruDedupCache, MemoryCache};
pub use fetcher::{FeedSource, FetchError, SourceError};
pub use parser::{parse_feed, Feed, FeedItem, ParseError};
pub use poller::{FeedPoller, PollError};
