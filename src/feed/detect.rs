// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{FeedParseError, ParseCause};

use super::atom::AtomParser;
use super::model::ParsedFeed;
use super::rss::RssParser;

pub const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

/// Wire format of a feed document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedFormat {
    Rss,
    Atom,
    Unknown,
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FeedFormat::Rss => "RSS",
            FeedFormat::Atom => "Atom",
            FeedFormat::Unknown => "unknown",
        })
    }
}

/// A stateless translator from one XML dialect to the normalized model
pub trait FeedParser: Send + Sync {
    fn format(&self) -> FeedFormat;

    /// Cheap structural check; never a full parse, never fails
    fn validate(&self, raw: &str) -> bool;

    /// Parse the whole document. Broken entries are skipped; only a document
    /// that cannot be read at all is an error.
    fn parse(&self, raw: &str, source_url: &str) -> Result<ParsedFeed, FeedParseError>;
}

/// Parsers in the order they are consulted when the format is not obvious
pub static PARSERS: [&dyn FeedParser; 2] = [&RssParser, &AtomParser];

/// Parser registered for a concrete format
pub fn parser_for(format: FeedFormat) -> Option<&'static dyn FeedParser> {
    PARSERS.iter().copied().find(|p| p.format() == format)
}

/// Classify raw text as RSS, Atom or unknown
pub fn detect_format(raw: &str) -> FeedFormat {
    let lower = raw.to_ascii_lowercase();

    if lower.contains("<rss") {
        return FeedFormat::Rss;
    }
    if lower.contains("<feed") && lower.contains(&ATOM_NAMESPACE.to_ascii_lowercase()) {
        return FeedFormat::Atom;
    }

    PARSERS
        .iter()
        .find(|p| p.validate(raw))
        .map(|p| p.format())
        .unwrap_or(FeedFormat::Unknown)
}

/// Parse with the detected format's parser, or walk [`PARSERS`] in order
/// when the format is unknown and keep the first success.
pub fn parse_any(raw: &str, source_url: &str) -> Result<(FeedFormat, ParsedFeed), FeedParseError> {
    let format = detect_format(raw);
    tracing::debug!(feed = %source_url, %format, "Detected feed format");

    if let Some(parser) = parser_for(format) {
        return parser.parse(raw, source_url).map(|parsed| (format, parsed));
    }

    let mut last_error = None;
    for parser in PARSERS.iter() {
        match parser.parse(raw, source_url) {
            Ok(parsed) => return Ok((parser.format(), parsed)),
            Err(e) => {
                tracing::debug!(
                    feed = %source_url,
                    format = %parser.format(),
                    error = %e,
                    "Fallback parser rejected document"
                );
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| FeedParseError::new(source_url, ParseCause::Unrecognized)))
}

/// Lowercased local name of the document's root element.
///
/// Reads events only up to the first start tag.
pub(crate) fn root_element(raw: &str) -> Option<String> {
    let raw = raw.trim_start_matches('\u{feff}').trim_start();
    if !raw.starts_with('<') {
        return None;
    }

    let mut reader = Reader::from_str(raw);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let local = e.local_name();
                return Some(String::from_utf8_lossy(local.as_ref()).to_ascii_lowercase());
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(Event::Text(t)) if !t.iter().all(u8::is_ascii_whitespace) => return None,
            Ok(_) => continue,
        }
    }
}
