use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::mpsc;

use feedbridge::config::Config;
use feedbridge::feed::{FeedItem, FeedPoller, FeedSource, LruDedupCache};
use feedbridge::irc::ConnectionManager;
use feedbridge::relay::{merge_items, Registration, Relay};

#[derive(Parser, Debug)]
#[command(name = "feedbridge", about = "Announce new feed items in IRC channels")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, value_name = "FILE", default_value = "feedbridge.toml")]
    config: PathBuf,

    /// Override the server address (host:port)
    #[arg(long, value_name = "ADDR")]
    server: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    if let Some(server) = args.server {
        config.server = server;
    }
    config.validate().context("Invalid configuration")?;

    let sources = config.feed_sources()?;
    if sources.is_empty() {
        tracing::warn!("No feeds configured, nothing will be announced");
    }
    if config.channels.is_empty() {
        tracing::warn!("No channels configured, nothing will be announced");
    }

    let client = reqwest::Client::builder()
        .user_agent(concat!("feedbridge/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let mut item_receivers = Vec::with_capacity(sources.len());
    for source in sources {
        tracing::info!(
            feed = %source,
            interval_secs = config.refetch_interval().as_secs(),
            "Starting poller"
        );
        item_receivers.push(spawn_poller(source, client.clone(), &config));
    }

    let (manager, events) = ConnectionManager::new(config.server.clone(), config.connection());
    let manager = manager.spawn();

    let relay = Relay::new(
        Registration {
            nick: config.nick.clone(),
            user: config.user.clone(),
            realname: config.realname.clone(),
        },
        config.channels.clone(),
    );
    let relay = relay.spawn(events, merge_items(item_receivers));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutting down");
        }
        _ = relay => tracing::warn!("Relay stopped"),
    }

    manager.abort();
    Ok(())
}

fn spawn_poller(
    source: FeedSource,
    client: reqwest::Client,
    config: &Config,
) -> mpsc::Receiver<FeedItem> {
    let interval = config.refetch_interval();
    match config.dedup_capacity() {
        Some(capacity) => {
            let cache = LruDedupCache::new(capacity);
            let (poller, items) = FeedPoller::with_cache(source, client, cache, interval);
            poller.spawn();
            items
        }
        None => {
            let (poller, items) = FeedPoller::new(source, client, interval);
            poller.spawn();
            items
        }
    }
}
