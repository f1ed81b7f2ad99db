use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Errors that can occur while decoding a feed document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not well-formed XML.
    #[error("XML parse error: {0}")]
    Xml(String),

    /// Well-formed XML, but not an RSS or Atom document.
    #[error("Unrecognized feed document (root element: {0})")]
    UnrecognizedDocument(String),

    /// The Atom decoder rejected the document.
    #[error("Atom parse error: {0}")]
    Atom(String),
}

impl From<quick_xml::Error> for ParseError {
    fn from(e: quick_xml::Error) -> Self {
        ParseError::Xml(e.to_string())
    }
}

/// One entry of a feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub description: String,
    pub link: String,
    pub guid: Option<String>,
}

impl FeedItem {
    /// Dedup key: the guid when it has content, the title otherwise.
    ///
    /// Titles are a weak key; two distinct items with the same title and no
    /// guid collapse into one.
    pub fn identity(&self) -> &str {
        match self.guid.as_deref().map(str::trim) {
            Some(guid) if !guid.is_empty() => guid,
            _ => &self.title,
        }
    }
}

/// A decoded feed document: channel metadata plus items in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: String,
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    ChannelTitle,
    ChannelLink,
    ChannelDescription,
    ChannelLanguage,
    ItemTitle,
    ItemLink,
    ItemDescription,
    ItemGuid,
}

/// Decodes an RSS 2.0, RSS 1.0 (RDF) or Atom document.
///
/// The reader understands XML declarations natively, so a leading
/// `<?xml ... ?>` line in any encoding label is skipped rather than
/// stripped by hand. Content is read as UTF-8.
///
/// RSS is read straight off the `quick-xml` event stream so that missing
/// guids stay missing (identity then falls back to the title). Atom
/// documents are handed to `feed-rs`.
pub fn parse_feed(bytes: &[u8]) -> Result<Feed, ParseError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut state = RssState::default();
    let mut buf = Vec::new();
    let mut root_seen = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                state.depth += 1;
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

                if !root_seen {
                    root_seen = true;
                    match name.as_str() {
                        "rss" | "RDF" => {}
                        "feed" => return parse_atom(bytes),
                        _ => return Err(ParseError::UnrecognizedDocument(name)),
                    }
                } else if e.name().prefix().is_none() {
                    // Prefixed extension elements (atom:link, dc:creator, ...)
                    // are skipped.
                    state.start(&e, &name);
                }
            }
            Event::Empty(e) => {
                if root_seen
                    && e.name().prefix().is_none()
                    && e.local_name().as_ref() == b"item"
                {
                    state.empty_item(&e);
                }
            }
            Event::Text(e) => {
                if state.field.is_some() {
                    state.text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if state.field.is_some() {
                    state.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::End(_) => state.end(),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !root_seen {
        return Err(ParseError::UnrecognizedDocument("none".to_string()));
    }
    if state.depth != 0 {
        return Err(ParseError::Xml("unexpected end of document".to_string()));
    }

    Ok(state.feed)
}

/// Position of the RSS decoder inside the element tree.
#[derive(Default)]
struct RssState {
    feed: Feed,
    depth: usize,
    channel_depth: Option<usize>,
    item_depth: Option<usize>,
    item: Option<FeedItem>,
    field: Option<(Field, usize)>,
    text: String,
}

impl RssState {
    fn start(&mut self, e: &BytesStart<'_>, name: &str) {
        match name {
            "channel" if self.channel_depth.is_none() && self.item_depth.is_none() => {
                self.channel_depth = Some(self.depth);
            }
            "item" if self.item_depth.is_none() => {
                self.item_depth = Some(self.depth);
                self.item = Some(FeedItem {
                    guid: rdf_about(e),
                    ..FeedItem::default()
                });
            }
            _ if self.field.is_none() => {
                // Only direct children count; <image><title> is not the
                // channel title.
                let parent = Some(self.depth - 1);
                let target = if self.item_depth == parent {
                    item_field(name)
                } else if self.channel_depth == parent {
                    channel_field(name)
                } else {
                    None
                };
                if let Some(target) = target {
                    self.field = Some((target, self.depth));
                    self.text.clear();
                }
            }
            _ => {}
        }
    }

    fn empty_item(&mut self, e: &BytesStart<'_>) {
        if self.item_depth.is_none() {
            self.feed.items.push(FeedItem {
                guid: rdf_about(e),
                ..FeedItem::default()
            });
        }
    }

    fn end(&mut self) {
        if let Some((target, at)) = self.field {
            if at == self.depth {
                let value = std::mem::take(&mut self.text);
                self.store(target, value);
                self.field = None;
            }
        }

        if self.item_depth == Some(self.depth) {
            self.item_depth = None;
            if let Some(done) = self.item.take() {
                self.feed.items.push(done);
            }
        } else if self.channel_depth == Some(self.depth) {
            self.channel_depth = None;
        }

        self.depth = self.depth.saturating_sub(1);
    }

    fn store(&mut self, target: Field, value: String) {
        let feed = &mut self.feed;
        match (target, self.item.as_mut()) {
            (Field::ChannelTitle, _) => feed.title = value,
            (Field::ChannelLink, _) => feed.link = value,
            (Field::ChannelDescription, _) => feed.description = value,
            (Field::ChannelLanguage, _) => feed.language = value,
            (Field::ItemTitle, Some(item)) => item.title = value,
            (Field::ItemLink, Some(item)) => item.link = value,
            (Field::ItemDescription, Some(item)) => item.description = value,
            (Field::ItemGuid, Some(item)) => item.guid = Some(value),
            (_, None) => {}
        }
    }
}

fn channel_field(name: &str) -> Option<Field> {
    match name {
        "title" => Some(Field::ChannelTitle),
        "link" => Some(Field::ChannelLink),
        "description" => Some(Field::ChannelDescription),
        "language" => Some(Field::ChannelLanguage),
        _ => None,
    }
}

fn item_field(name: &str) -> Option<Field> {
    match name {
        "title" => Some(Field::ItemTitle),
        "link" => Some(Field::ItemLink),
        "description" => Some(Field::ItemDescription),
        "guid" => Some(Field::ItemGuid),
        _ => None,
    }
}

/// RSS 1.0 items carry their identifier as `rdf:about`.
fn rdf_about(e: &BytesStart<'_>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == b"about")
        .and_then(|attr| attr.unescape_value().ok())
        .map(|value| value.into_owned())
        .filter(|value| !value.is_empty())
}

fn parse_atom(bytes: &[u8]) -> Result<Feed, ParseError> {
    let parsed = feed_rs::parser::parse(bytes).map_err(|e| ParseError::Atom(e.to_string()))?;

    let items = parsed
        .entries
        .into_iter()
        .map(|entry| FeedItem {
            title: entry.title.map(|t| t.content).unwrap_or_default(),
            description: entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default(),
            link: entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default(),
            guid: Some(entry.id).filter(|id| !id.trim().is_empty()),
        })
        .collect();

    Ok(Feed {
        title: parsed.title.map(|t| t.content).unwrap_or_default(),
        link: parsed
            .links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_default(),
        description: parsed.description.map(|t| t.content).unwrap_or_default(),
        language: parsed.language.unwrap_or_default(),
        items,
    })
}
