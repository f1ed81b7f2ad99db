//! End-to-end tests: a fake IRC server on a local socket, a feed on disk,
//! and the real connection manager, poller and relay between them.
//!
//! Each test uses its own listener port and temp directory for isolation.

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

use feedbridge::feed::{FeedPoller, FeedSource};
use feedbridge::irc::{ConnectionConfig, ConnectionManager, ConnectionState, RetryPolicy};
use feedbridge::relay::{merge_items, Registration, Relay};

const WAIT: Duration = Duration::from_secs(10);

fn rss(items: &[(&str, &str)]) -> String {
    let mut body = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\"><channel><title>Test</title>",
    );
    for (title, guid) in items {
        body.push_str(&format!(
            "<item><title>{}</title><link>https://example.com/{}</link><guid>{}</guid></item>",
            title, guid, guid
        ));
    }
    body.push_str("</channel></rss>");
    body
}

fn feed_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("feedbridge_bridge_{}", name));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn registration() -> Registration {
    Registration {
        nick: "bridge".to_string(),
        user: "bridge".to_string(),
        realname: "Feed Bridge".to_string(),
    }
}

fn fast_retry() -> ConnectionConfig {
    ConnectionConfig {
        retry: RetryPolicy::Fixed(Duration::from_millis(50)),
        ..ConnectionConfig::default()
    }
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl Client {
    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
            .await
            .expect("bridge should dial")
            .unwrap();
        Self::from_stream(stream)
    }

    fn from_stream(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn expect(&mut self) -> String {
        tokio::time::timeout(WAIT, self.lines.next_line())
            .await
            .expect("bridge should send a line")
            .unwrap()
            .expect("connection closed early")
    }

    async fn send(&mut self, raw: &str) {
        self.writer.write_all(raw.as_bytes()).await.unwrap();
    }

    /// Reads registration and answers it with a welcome.
    async fn register(&mut self) {
        assert_eq!(self.expect().await.trim_end(), "NICK bridge");
        assert_eq!(self.expect().await, "USER bridge 0 * :Feed Bridge");
        self.send(":irc.test 001 bridge :Welcome\r\n").await;
    }
}

#[tokio::test]
async fn test_new_feed_item_announced_in_channel() {
    let dir = feed_dir("announce");
    let feed_path = dir.join("feed.xml");
    std::fs::write(&feed_path, rss(&[("Old post", "old")])).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let (mut poller, items) = FeedPoller::new(
        FeedSource::File(feed_path.clone()),
        reqwest::Client::new(),
        Duration::from_millis(100),
    );
    // Seed the cache before the worker starts so the old post stays quiet.
    assert_eq!(poller.poll_once().await.unwrap(), 0);
    let poller = poller.spawn();

    let (manager, events) = ConnectionManager::new(addr, fast_retry());
    let manager = manager.spawn();
    let relay = Relay::new(registration(), vec!["#news".to_string()])
        .spawn(events, merge_items(vec![items]));

    let mut server = Client::accept(&listener).await;
    server.register().await;
    assert_eq!(server.expect().await.trim_end(), "JOIN #news");

    server.send("PING :keepalive\r\n").await;
    assert_eq!(server.expect().await, "PONG :keepalive");

    std::fs::write(&feed_path, rss(&[("New post", "new"), ("Old post", "old")])).unwrap();
    assert_eq!(
        server.expect().await,
        "PRIVMSG #news :New post https://example.com/new"
    );

    manager.abort();
    poller.abort();
    relay.abort();
    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_bridge_reregisters_after_server_drops_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let (manager, events) = ConnectionManager::new(addr, fast_retry());
    let manager = manager.spawn();
    let (_feed_tx, items) = tokio::sync::mpsc::channel(1);
    let relay = Relay::new(registration(), vec!["#a".to_string(), "#b".to_string()])
        .spawn(events, items);

    let mut first = Client::accept(&listener).await;
    first.register().await;
    assert_eq!(first.expect().await.trim_end(), "JOIN #a");
    assert_eq!(first.expect().await.trim_end(), "JOIN #b");
    drop(first);

    let mut second = Client::accept(&listener).await;
    second.register().await;
    assert_eq!(second.expect().await.trim_end(), "JOIN #a");
    assert_eq!(second.expect().await.trim_end(), "JOIN #b");

    manager.abort();
    relay.abort();
}

#[tokio::test]
async fn test_bridge_keeps_dialing_until_server_appears() {
    // Reserve a port, then free it so the first dials are refused.
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let (manager, events) = ConnectionManager::new(addr.to_string(), fast_retry());
    let mut state = manager.state();
    let manager = manager.spawn();
    let (_feed_tx, items) = tokio::sync::mpsc::channel(1);
    let relay = Relay::new(registration(), Vec::new()).spawn(events, items);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let listener = TcpListener::bind(addr).await.unwrap();

    let mut server = Client::accept(&listener).await;
    server.register().await;

    tokio::time::timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .expect("state should reach connected")
        .unwrap();

    manager.abort();
    relay.abort();
}
