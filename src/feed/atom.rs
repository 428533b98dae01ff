// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};
use quick_xml::NsReader;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::name::{Namespace, ResolveResult};
use url::Url;

use crate::error::{EntryError, FeedParseError, ParseCause};

use super::detect::{ATOM_NAMESPACE, FeedFormat, FeedParser, root_element};
use super::ident::{item_id, source_id};
use super::model::{
    DEFAULT_AUTHOR, DEFAULT_DESCRIPTION, DEFAULT_FEED_TITLE, DEFAULT_ITEM_TITLE, Item, ParsedFeed,
    Source, non_empty,
};
use super::{log_skipped_entry, resolve_media_url};

/// Atom 1.0 parser walking `quick_xml` reader events.
///
/// Elements from other namespaces (`itunes:`, `media:`, ...) are skipped, and
/// when an element repeats the first occurrence wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct AtomParser;

impl FeedParser for AtomParser {
    fn format(&self) -> FeedFormat {
        FeedFormat::Atom
    }

    fn validate(&self, raw: &str) -> bool {
        root_element(raw).as_deref() == Some("feed")
    }

    fn parse(&self, raw: &str, source_url: &str) -> Result<ParsedFeed, FeedParseError> {
        let root = root_element(raw);
        if root.as_deref() != Some("feed") {
            return Err(FeedParseError::new(
                source_url,
                ParseCause::WrongRoot {
                    expected: "feed",
                    found: root,
                },
            ));
        }

        let raw = raw.trim_start_matches('\u{feff}');
        let feed = read_feed(raw).map_err(|e| FeedParseError::new(source_url, e))?;
        Ok(convert_feed(&feed, source_url))
    }
}

#[derive(Debug, Default)]
struct RawFeed {
    title: Option<String>,
    subtitle: Option<String>,
    author: Option<String>,
    logo: Option<String>,
    icon: Option<String>,
    lang: Option<String>,
    links: Vec<RawLink>,
    categories: Vec<String>,
    entries: Vec<RawEntry>,
}

#[derive(Debug, Default)]
struct RawEntry {
    id: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    content: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    links: Vec<RawLink>,
}

#[derive(Debug, Default)]
struct RawLink {
    href: Option<String>,
    rel: Option<String>,
    media_type: Option<String>,
    length: Option<String>,
}

impl RawLink {
    fn from_element(e: &BytesStart<'_>) -> Self {
        Self {
            href: attribute(e, b"href"),
            rel: attribute(e, b"rel"),
            media_type: attribute(e, b"type"),
            length: attribute(e, b"length"),
        }
    }

    fn has_rel(&self, rel: &str) -> bool {
        self.rel.as_deref().map(str::trim) == Some(rel)
    }

    fn is_alternate(&self) -> bool {
        self.rel.is_none() || self.has_rel("alternate")
    }

    fn href(&self) -> Option<&str> {
        non_empty(self.href.as_deref())
    }
}

/// Text-bearing element currently being collected
#[derive(Debug, Clone, Copy)]
enum Field {
    FeedTitle,
    Subtitle,
    AuthorName,
    Logo,
    Icon,
    EntryId,
    EntryTitle,
    Summary,
    Content,
    Published,
    Updated,
}

#[derive(Debug)]
struct Capture {
    field: Field,
    depth: usize,
    text: String,
}

/// Element nesting inside the document being read
#[derive(Debug, Default)]
struct Cursor {
    depth: usize,
    in_author: bool,
    entry: Option<RawEntry>,
}

impl Cursor {
    /// Handle an opening tag at the current depth; returns the field whose
    /// text should be collected, if any.
    fn open(&mut self, e: &BytesStart<'_>, feed: &mut RawFeed) -> Option<Field> {
        let local = e.local_name();
        match (self.depth, local.as_ref()) {
            (1, _) => {
                feed.lang = attribute(e, b"xml:lang");
                None
            }
            (2, b"entry") => {
                self.entry = Some(RawEntry::default());
                None
            }
            (2, b"author") => {
                self.in_author = true;
                None
            }
            (2, b"title") => Some(Field::FeedTitle),
            (2, b"subtitle") => Some(Field::Subtitle),
            (2, b"logo") => Some(Field::Logo),
            (2, b"icon") => Some(Field::Icon),
            (2, _) => {
                self.leaf(e, feed);
                None
            }
            (3, b"name") if self.in_author => Some(Field::AuthorName),
            (3, name) if self.entry.is_some() => match name {
                b"id" => Some(Field::EntryId),
                b"title" => Some(Field::EntryTitle),
                b"summary" => Some(Field::Summary),
                b"content" => Some(Field::Content),
                b"published" => Some(Field::Published),
                b"updated" => Some(Field::Updated),
                _ => {
                    self.leaf(e, feed);
                    None
                }
            },
            _ => None,
        }
    }

    /// Elements whose data lives in attributes (`link`, `category`)
    fn leaf(&mut self, e: &BytesStart<'_>, feed: &mut RawFeed) {
        let local = e.local_name();
        match (self.depth, local.as_ref(), self.entry.as_mut()) {
            (2, b"link", None) => feed.links.push(RawLink::from_element(e)),
            (2, b"category", None) => {
                if let Some(term) = attribute(e, b"term") {
                    feed.categories.push(term);
                }
            }
            (3, b"link", Some(entry)) => entry.links.push(RawLink::from_element(e)),
            _ => {}
        }
    }

    fn close(&mut self, local: &[u8], feed: &mut RawFeed) {
        match (self.depth, local) {
            (2, b"entry") => {
                if let Some(entry) = self.entry.take() {
                    feed.entries.push(entry);
                }
            }
            (2, b"author") => self.in_author = false,
            _ => {}
        }
    }

    fn store(&mut self, field: Field, text: String, feed: &mut RawFeed) {
        let slot = match field {
            Field::FeedTitle => &mut feed.title,
            Field::Subtitle => &mut feed.subtitle,
            Field::AuthorName => &mut feed.author,
            Field::Logo => &mut feed.logo,
            Field::Icon => &mut feed.icon,
            entry_field => {
                let Some(entry) = self.entry.as_mut() else {
                    return;
                };
                match entry_field {
                    Field::EntryId => &mut entry.id,
                    Field::EntryTitle => &mut entry.title,
                    Field::Summary => &mut entry.summary,
                    Field::Content => &mut entry.content,
                    Field::Published => &mut entry.published,
                    _ => &mut entry.updated,
                }
            }
        };
        if slot.is_none() && non_empty(Some(text.as_str())).is_some() {
            *slot = Some(text);
        }
    }
}

/// Walk the document once, collecting the Atom elements we map.
///
/// Text constructs gather the text of every descendant, so `type="xhtml"`
/// bodies read as their visible text.
fn read_feed(raw: &str) -> Result<RawFeed, quick_xml::Error> {
    let mut reader = NsReader::from_str(raw);
    let mut feed = RawFeed::default();
    let mut cursor = Cursor::default();
    let mut capture: Option<Capture> = None;

    loop {
        let (ns, event) = reader.read_resolved_event()?;
        let atom = is_atom(&ns);

        match event {
            Event::Start(e) => {
                cursor.depth += 1;
                if capture.is_some() {
                    continue;
                }
                if cursor.depth > 1 && !atom {
                    reader.read_to_end(e.name())?;
                    cursor.depth -= 1;
                    continue;
                }
                if let Some(field) = cursor.open(&e, &mut feed) {
                    capture = Some(Capture {
                        field,
                        depth: cursor.depth,
                        text: String::new(),
                    });
                }
            }
            Event::Empty(e) => {
                if capture.is_none() && atom {
                    cursor.depth += 1;
                    cursor.leaf(&e, &mut feed);
                    cursor.depth -= 1;
                }
            }
            Event::Text(t) => {
                if let Some(c) = capture.as_mut() {
                    c.text.push_str(&unescape(&t));
                }
            }
            Event::CData(t) => {
                if let Some(c) = capture.as_mut() {
                    c.text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::End(e) => {
                match capture.take() {
                    Some(c) if c.depth == cursor.depth => cursor.store(c.field, c.text, &mut feed),
                    Some(c) => capture = Some(c),
                    None => cursor.close(e.local_name().as_ref(), &mut feed),
                }
                cursor.depth = cursor.depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(feed)
}

/// Unprefixed elements in a document without a default namespace count as Atom
fn is_atom(ns: &ResolveResult<'_>) -> bool {
    match ns {
        ResolveResult::Bound(Namespace(ns)) => *ns == ATOM_NAMESPACE.as_bytes(),
        ResolveResult::Unbound => true,
        ResolveResult::Unknown(_) => false,
    }
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .map(|a| match a.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
        })
}

// Unknown entities are kept verbatim
fn unescape(t: &BytesText<'_>) -> String {
    match t.unescape() {
        Ok(text) => text.into_owned(),
        Err(_) => String::from_utf8_lossy(t).into_owned(),
    }
}

fn convert_feed(feed: &RawFeed, feed_url: &str) -> ParsedFeed {
    let id = source_id(feed_url);
    let base = Url::parse(feed_url).ok();

    let items = feed
        .entries
        .iter()
        .filter_map(|entry| match convert_entry(entry, &id, base.as_ref()) {
            Ok(item) => Some(item),
            Err(e) => {
                log_skipped_entry(feed_url, &e);
                None
            }
        })
        .collect();

    let site_url = feed
        .links
        .iter()
        .find(|l| l.is_alternate())
        .and_then(RawLink::href)
        .and_then(|href| resolve(href, base.as_ref()));

    let artwork_url = non_empty(feed.logo.as_deref())
        .or_else(|| non_empty(feed.icon.as_deref()))
        .and_then(|href| resolve(href, base.as_ref()));

    let mut categories: Vec<String> = Vec::new();
    for term in feed.categories.iter().filter_map(|c| non_empty(Some(c.as_str()))) {
        if !categories.iter().any(|c| c == term) {
            categories.push(term.to_string());
        }
    }

    let source = Source {
        id,
        title: non_empty(feed.title.as_deref())
            .unwrap_or(DEFAULT_FEED_TITLE)
            .to_string(),
        author: non_empty(feed.author.as_deref())
            .unwrap_or(DEFAULT_AUTHOR)
            .to_string(),
        description: non_empty(feed.subtitle.as_deref())
            .unwrap_or(DEFAULT_DESCRIPTION)
            .to_string(),
        feed_url: feed_url.to_string(),
        artwork_url,
        site_url,
        categories,
        language: non_empty(feed.lang.as_deref()).map(String::from),
        subscribed_at: None,
        last_fetched_at: None,
        item_ids: Vec::new(),
    };

    ParsedFeed::assemble(source, items)
}

fn convert_entry(entry: &RawEntry, source_id: &str, base: Option<&Url>) -> Result<Item, EntryError> {
    let title = non_empty(entry.title.as_deref())
        .unwrap_or(DEFAULT_ITEM_TITLE)
        .to_string();

    let Some((enclosure, href)) = entry
        .links
        .iter()
        .filter(|l| l.has_rel("enclosure"))
        .find_map(|l| l.href().map(|href| (l, href)))
    else {
        return Err(EntryError::MissingMedia { title });
    };
    let media_url = resolve_media_url(&title, href, base)?;

    let guid = non_empty(entry.id.as_deref()).map(String::from);
    let id = item_id(guid.as_deref().unwrap_or(media_url.as_str()));

    let description = non_empty(entry.content.as_deref())
        .or_else(|| non_empty(entry.summary.as_deref()))
        .unwrap_or(DEFAULT_DESCRIPTION)
        .to_string();

    let published = non_empty(entry.published.as_deref())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .or_else(|| {
            non_empty(entry.updated.as_deref()).and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        })
        .map(|dt| dt.with_timezone(&Utc));

    let link = entry
        .links
        .iter()
        .find(|l| l.is_alternate())
        .and_then(RawLink::href)
        .and_then(|href| resolve(href, base));

    Ok(Item {
        id,
        source_id: source_id.to_string(),
        title,
        description,
        media_url,
        duration_secs: 0,
        published,
        file_size: non_empty(enclosure.length.as_deref())
            .and_then(|len| len.parse::<u64>().ok())
            .filter(|len| *len > 0),
        mime_type: non_empty(enclosure.media_type.as_deref()).map(String::from),
        episode_number: None,
        season_number: None,
        guid,
        link,
        artwork_url: None,
    })
}

fn resolve(href: &str, base: Option<&Url>) -> Option<Url> {
    match base {
        Some(base) => base.join(href).ok(),
        None => Url::parse(href).ok(),
    }
}
