use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const FILE_SCHEME: &str = "file://";

/// Errors that can occur while retrieving a feed document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Local file could not be read
    #[error("Failed to read feed file: {0}")]
    Io(#[from] std::io::Error),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the 30-second timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

/// A feed address that cannot be polled.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Invalid feed URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported scheme '{0}' (expected http, https or file)")]
    UnsupportedScheme(String),
}

/// Where a feed document comes from.
///
/// `file://` followed by a path reads the local filesystem; everything else
/// must be an HTTP(S) URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    File(PathBuf),
    Http(Url),
}

impl FeedSource {
    pub fn parse(url: &str) -> Result<Self, SourceError> {
        if let Some(path) = url.strip_prefix(FILE_SCHEME) {
            if path.is_empty() {
                return Err(SourceError::InvalidUrl {
                    url: url.to_string(),
                    reason: "empty file path".to_string(),
                });
            }
            return Ok(FeedSource::File(PathBuf::from(path)));
        }

        let parsed = Url::parse(url).map_err(|e| SourceError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        match parsed.scheme() {
            "http" | "https" => Ok(FeedSource::Http(parsed)),
            other => Err(SourceError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Reads the whole document.
    pub async fn fetch(&self, client: &reqwest::Client) -> Result<Vec<u8>, FetchError> {
        match self {
            FeedSource::File(path) => Ok(tokio::fs::read(path).await?),
            FeedSource::Http(url) => fetch_http(client, url).await,
        }
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedSource::File(path) => write!(f, "{}{}", FILE_SCHEME, path.display()),
            FeedSource::Http(url) => write!(f, "{}", url),
        }
    }
}

async fn fetch_http(client: &reqwest::Client, url: &Url) -> Result<Vec<u8>, FetchError> {
    let response = tokio::time::timeout(FETCH_TIMEOUT, client.get(url.clone()).send())
        .await
        .map_err(|_| FetchError::Timeout)??;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    tokio::time::timeout(FETCH_TIMEOUT, read_limited_bytes(response, MAX_FEED_SIZE))
        .await
        .map_err(|_| FetchError::Timeout)?
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_source_file_prefix() {
        let source = FeedSource::parse("file:///tmp/feed.xml").unwrap();
        assert_eq!(source, FeedSource::File(PathBuf::from("/tmp/feed.xml")));
        assert_eq!(source.to_string(), "file:///tmp/feed.xml");
    }

    #[test]
    fn test_source_relative_file_path() {
        let source = FeedSource::parse("file://feeds/local.xml").unwrap();
        assert_eq!(source, FeedSource::File(PathBuf::from("feeds/local.xml")));
    }

    #[test]
    fn test_source_http() {
        let source = FeedSource::parse("https://example.com/rss").unwrap();
        assert!(matches!(source, FeedSource::Http(ref url) if url.host_str() == Some("example.com")));
    }

    #[test]
    fn test_source_rejects_garbage() {
        assert!(matches!(
            FeedSource::parse("not a url"),
            Err(SourceError::InvalidUrl { .. })
        ));
        assert!(matches!(
            FeedSource::parse("file://"),
            Err(SourceError::InvalidUrl { .. })
        ));
        assert!(matches!(
            FeedSource::parse("ftp://example.com/feed"),
            Err(SourceError::UnsupportedScheme(s)) if s == "ftp"
        ));
    }

    #[tokio::test]
    async fn test_fetch_http_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<rss/>"))
            .mount(&mock_server)
            .await;

        let source = FeedSource::parse(&format!("{}/feed", mock_server.uri())).unwrap();
        let body = source.fetch(&reqwest::Client::new()).await.unwrap();
        assert_eq!(body, b"<rss/>");
    }

    #[tokio::test]
    async fn test_fetch_http_404() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let source = FeedSource::parse(&format!("{}/feed", mock_server.uri())).unwrap();
        match source.fetch(&reqwest::Client::new()).await {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_http_too_large() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; MAX_FEED_SIZE + 1]))
            .mount(&mock_server)
            .await;

        let source = FeedSource::parse(&format!("{}/feed", mock_server.uri())).unwrap();
        assert!(matches!(
            source.fetch(&reqwest::Client::new()).await,
            Err(FetchError::ResponseTooLarge)
        ));
    }

    #[tokio::test]
    async fn test_fetch_file() {
        let dir = std::env::temp_dir().join("feedbridge_fetch_test_file");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("feed.xml");
        std::fs::write(&file, "<rss/>").unwrap();

        let source = FeedSource::parse(&format!("file://{}", file.display())).unwrap();
        let body = source.fetch(&reqwest::Client::new()).await.unwrap();
        assert_eq!(body, b"<rss/>");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let source = FeedSource::parse("file:///nonexistent/feedbridge/feed.xml").unwrap();
        assert!(matches!(
            source.fetch(&reqwest::Client::new()).await,
            Err(FetchError::Io(_))
        ));
    }
}
