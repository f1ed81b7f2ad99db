//! Per-feed polling worker.
//!
//! A [`FeedPoller`] fetches its feed, decodes it, and emits every item whose
//! identity its [`DedupCache`] has not seen before. The first successful
//! cycle only seeds the cache, so a freshly started bridge does not replay a
//! feed's whole backlog.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::cache::{DedupCache, MemoryCache};
use super::fetcher::{FeedSource, FetchError};
use super::parser::{parse_feed, FeedItem, ParseError};

/// New items are handed over one at a time; a slow consumer holds the worker
/// back rather than letting items pile up.
const ITEM_CHANNEL_CAPACITY: usize = 1;

/// Outcome of a failed poll cycle.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The item receiver was dropped.
    #[error("Item receiver closed")]
    Closed,
}

pub struct FeedPoller<C: DedupCache = MemoryCache> {
    source: FeedSource,
    client: reqwest::Client,
    cache: C,
    interval: Duration,
    primed: bool,
    items: mpsc::Sender<FeedItem>,
}

impl FeedPoller<MemoryCache> {
    /// Poller with a private in-memory cache.
    pub fn new(
        source: FeedSource,
        client: reqwest::Client,
        interval: Duration,
    ) -> (Self, mpsc::Receiver<FeedItem>) {
        Self::with_cache(source, client, MemoryCache::new(), interval)
    }
}

impl<C: DedupCache> FeedPoller<C> {
    pub fn with_cache(
        source: FeedSource,
        client: reqwest::Client,
        cache: C,
        interval: Duration,
    ) -> (Self, mpsc::Receiver<FeedItem>) {
        let (items, rx) = mpsc::channel(ITEM_CHANNEL_CAPACITY);
        let poller = Self {
            source,
            client,
            cache,
            interval,
            primed: false,
            items,
        };
        (poller, rx)
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Polls forever at the fixed interval. Stops only when the item
    /// receiver is dropped.
    pub async fn run(mut self) {
        loop {
            match self.poll_once().await {
                Ok(emitted) => {
                    tracing::debug!(feed = %self.source, emitted = emitted, "Poll cycle complete");
                }
                Err(PollError::Closed) => {
                    tracing::info!(feed = %self.source, "Item receiver dropped, poller stopping");
                    return;
                }
                Err(e) => {
                    tracing::warn!(feed = %self.source, error = %e, "Poll cycle failed");
                }
            }

            tokio::time::sleep(self.interval).await;
            tracing::debug!(
                feed = %self.source,
                interval_secs = self.interval.as_secs(),
                "Interval elapsed, refetching"
            );
        }
    }

    /// One fetch, decode and dedup cycle. Returns how many items were emitted.
    ///
    /// A failed fetch or decode leaves the cache untouched and does not count
    /// as the first cycle.
    pub async fn poll_once(&mut self) -> Result<usize, PollError> {
        tracing::debug!(feed = %self.source, "Fetching");
        let bytes = self.source.fetch(&self.client).await?;
        let feed = parse_feed(&bytes)?;

        let mut emitted = 0;
        for item in feed.items {
            let id = item.identity();
            let new = !self.cache.seen(id);

            // Seen identities are re-added so bounded caches keep them fresh.
            if let Err(e) = self.cache.add(id) {
                tracing::warn!(feed = %self.source, id = %id, error = %e, "Failed to record item");
            }
            if !new {
                continue;
            }

            tracing::debug!(feed = %self.source, id = %id, "New item");
            if self.primed {
                self.items.send(item).await.map_err(|_| PollError::Closed)?;
                emitted += 1;
            }
        }

        if !self.primed {
            tracing::info!(
                feed = %self.source,
                seeded = self.cache.len(),
                "Initial fetch seeded cache, nothing announced"
            );
            self.primed = true;
        }

        Ok(emitted)
    }
}
