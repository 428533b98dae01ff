mod atom;
mod detect;
mod duration;
mod ident;
mod model;
mod rss;

pub use atom::AtomParser;
pub use detect::{ATOM_NAMESPACE, FeedFormat, FeedParser, PARSERS, detect_format, parse_any, parser_for};
pub use duration::parse_duration_secs;
pub use ident::{item_id, source_id};
pub use model::{
    DEFAULT_AUTHOR, DEFAULT_DESCRIPTION, DEFAULT_FEED_TITLE, DEFAULT_ITEM_TITLE, Item, ParsedFeed,
    Source,
};
pub use self::rss::RssParser;

#[cfg(test)]
pub(crate) use model::fixtures;

use url::Url;

use crate::error::EntryError;

/// Resolve an enclosure reference against the feed URL and make sure it is
/// something a player can fetch.
fn resolve_media_url(title: &str, raw: &str, base: Option<&Url>) -> Result<Url, EntryError> {
    let raw = raw.trim();
    let resolved = match base {
        Some(base) => base.join(raw),
        None => Url::parse(raw),
    };

    let url = resolved.map_err(|source| EntryError::InvalidMediaUrl {
        title: title.to_string(),
        url: raw.to_string(),
        source,
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(EntryError::UnsupportedScheme {
            title: title.to_string(),
            scheme: scheme.to_string(),
        }),
    }
}

/// Entries without media are not content; everything else is worth a warning
fn log_skipped_entry(feed_url: &str, error: &EntryError) {
    match error {
        EntryError::MissingMedia { .. } => {
            tracing::debug!(feed = %feed_url, reason = %error, "Skipping entry without media");
        }
        _ => {
            tracing::warn!(feed = %feed_url, error = %error, "Skipping malformed entry");
        }
    }
}
