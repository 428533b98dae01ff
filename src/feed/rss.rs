// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset, Utc};
use url::Url;

use crate::error::{EntryError, FeedParseError};

use super::detect::{FeedFormat, FeedParser, root_element};
use super::duration::parse_duration_secs;
use super::ident::{item_id, source_id};
use super::model::{
    DEFAULT_AUTHOR, DEFAULT_DESCRIPTION, DEFAULT_FEED_TITLE, DEFAULT_ITEM_TITLE, Item, ParsedFeed,
    Source, non_empty,
};
use super::{log_skipped_entry, resolve_media_url};

/// RSS 2.0 (and RSS 1.0/RDF) parser backed by the `rss` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct RssParser;

impl FeedParser for RssParser {
    fn format(&self) -> FeedFormat {
        FeedFormat::Rss
    }

    fn validate(&self, raw: &str) -> bool {
        matches!(root_element(raw).as_deref(), Some("rss") | Some("rdf"))
    }

    fn parse(&self, raw: &str, source_url: &str) -> Result<ParsedFeed, FeedParseError> {
        let channel = rss::Channel::read_from(raw.as_bytes())
            .map_err(|e| FeedParseError::new(source_url, e))?;
        Ok(parse_channel(&channel, source_url))
    }
}

fn parse_channel(channel: &rss::Channel, feed_url: &str) -> ParsedFeed {
    let id = source_id(feed_url);
    let base = Url::parse(feed_url).ok();
    let itunes = channel.itunes_ext();

    let items = channel
        .items()
        .iter()
        .filter_map(|item| match parse_item(item, &id, base.as_ref()) {
            Ok(item) => Some(item),
            Err(e) => {
                log_skipped_entry(feed_url, &e);
                None
            }
        })
        .collect();

    let artwork_url = channel
        .image()
        .and_then(|img| Url::parse(img.url()).ok())
        .or_else(|| {
            itunes
                .and_then(|ext| ext.image())
                .and_then(|url| Url::parse(url).ok())
        });

    let author = non_empty(itunes.and_then(|ext| ext.author()))
        .or_else(|| non_empty(channel.managing_editor()))
        .unwrap_or(DEFAULT_AUTHOR);

    let description = non_empty(Some(channel.description()))
        .or_else(|| non_empty(itunes.and_then(|ext| ext.summary())))
        .unwrap_or(DEFAULT_DESCRIPTION);

    let mut categories: Vec<String> = Vec::new();
    let names = channel
        .categories()
        .iter()
        .map(|c| c.name())
        .chain(itunes.into_iter().flat_map(|ext| {
            ext.categories().iter().flat_map(|c| {
                std::iter::once(c.text()).chain(c.subcategory().map(|sub| sub.text()))
            })
        }));
    for name in names {
        let name = name.trim();
        if !name.is_empty() && !categories.iter().any(|c| c == name) {
            categories.push(name.to_string());
        }
    }

    let source = Source {
        id,
        title: non_empty(Some(channel.title()))
            .unwrap_or(DEFAULT_FEED_TITLE)
            .to_string(),
        author: author.to_string(),
        description: description.to_string(),
        feed_url: feed_url.to_string(),
        artwork_url,
        site_url: Url::parse(channel.link()).ok(),
        categories,
        language: non_empty(channel.language()).map(String::from),
        subscribed_at: None,
        last_fetched_at: None,
        item_ids: Vec::new(),
    };

    ParsedFeed::assemble(source, items)
}

fn parse_item(item: &rss::Item, source_id: &str, base: Option<&Url>) -> Result<Item, EntryError> {
    let title = non_empty(item.title())
        .unwrap_or(DEFAULT_ITEM_TITLE)
        .to_string();

    let enclosure = match item.enclosure() {
        Some(enclosure) if !enclosure.url().trim().is_empty() => enclosure,
        _ => return Err(EntryError::MissingMedia { title }),
    };
    let media_url = resolve_media_url(&title, enclosure.url(), base)?;

    let guid = non_empty(item.guid().map(|g| g.value())).map(String::from);
    let id = item_id(guid.as_deref().unwrap_or(media_url.as_str()));

    let itunes = item.itunes_ext();

    let description = non_empty(item.content())
        .or_else(|| non_empty(item.description()))
        .or_else(|| non_empty(itunes.and_then(|ext| ext.summary())))
        .unwrap_or(DEFAULT_DESCRIPTION)
        .to_string();

    let published = item
        .pub_date()
        .and_then(parse_pub_date)
        .map(|dt| dt.with_timezone(&Utc));

    Ok(Item {
        id,
        source_id: source_id.to_string(),
        title,
        description,
        media_url,
        duration_secs: itunes
            .and_then(|ext| ext.duration())
            .and_then(parse_duration_secs)
            .unwrap_or(0),
        published,
        file_size: enclosure.length().trim().parse::<u64>().ok().filter(|len| *len > 0),
        mime_type: non_empty(Some(enclosure.mime_type())).map(String::from),
        episode_number: itunes.and_then(|ext| ext.episode().and_then(|e| e.trim().parse().ok())),
        season_number: itunes.and_then(|ext| ext.season().and_then(|s| s.trim().parse().ok())),
        guid,
        link: item.link().and_then(|l| Url::parse(l.trim()).ok()),
        artwork_url: itunes
            .and_then(|ext| ext.image())
            .and_then(|url| Url::parse(url).ok()),
    })
}

/// RFC 2822 first, then the formats feeds commonly use instead
fn parse_pub_date(date_str: &str) -> Option<DateTime<FixedOffset>> {
    let date_str = date_str.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(date_str) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        return Some(dt);
    }

    const FORMATS: [&str; 4] = [
        "%a, %d %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S %z",
    ];
    FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(date_str, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED_URL: &str = "https://example.com/feed.xml";

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd"
     xmlns:content="http://purl.org/rss/1.0/modules/content/">
  <channel>
    <title>Test Podcast</title>
    <description>A test podcast for unit testing</description>
    <link>https://example.com</link>
    <language>en-us</language>
    <category>Technology</category>
    <itunes:author>Test Author</itunes:author>
    <itunes:image href="https://example.com/image.jpg"/>
    <itunes:category text="Technology"><itunes:category text="Podcasting"/></itunes:category>
    <item>
      <title>Episode 1</title>
      <description>First episode</description>
      <content:encoded><![CDATA[<p>First episode, in full</p>]]></content:encoded>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
      <guid>ep1-guid</guid>
      <enclosure url="https://example.com/ep1.mp3" length="1234567" type="audio/mpeg"/>
      <itunes:duration>30:00</itunes:duration>
      <itunes:episode>1</itunes:episode>
      <itunes:season>1</itunes:season>
    </item>
    <item>
      <title>Episode 2</title>
      <enclosure url="/media/ep2.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    fn parse(raw: &str) -> ParsedFeed {
        RssParser.parse(raw, FEED_URL).unwrap()
    }

    #[test]
    fn extracts_source_metadata() {
        let parsed = parse(SAMPLE_FEED);
        let source = &parsed.source;

        assert_eq!(source.id, source_id(FEED_URL));
        assert_eq!(source.title, "Test Podcast");
        assert_eq!(source.description, "A test podcast for unit testing");
        assert_eq!(source.author, "Test Author");
        assert_eq!(source.feed_url, FEED_URL);
        assert_eq!(
            source.artwork_url.as_ref().map(Url::as_str),
            Some("https://example.com/image.jpg")
        );
        assert_eq!(source.language.as_deref(), Some("en-us"));
        assert_eq!(source.categories, vec!["Technology", "Podcasting"]);
        assert_eq!(source.item_ids.len(), 2);
    }

    #[test]
    fn extracts_items() {
        let parsed = parse(SAMPLE_FEED);
        assert_eq!(parsed.items.len(), 2);

        let ep1 = &parsed.items[0];
        assert_eq!(ep1.title, "Episode 1");
        assert_eq!(ep1.id, item_id("ep1-guid"));
        assert_eq!(ep1.source_id, parsed.source.id);
        assert_eq!(ep1.guid.as_deref(), Some("ep1-guid"));
        assert_eq!(ep1.description, "<p>First episode, in full</p>");
        assert_eq!(ep1.duration_secs, 1800);
        assert_eq!(ep1.episode_number, Some(1));
        assert_eq!(ep1.season_number, Some(1));
        assert_eq!(ep1.file_size, Some(1234567));
        assert_eq!(ep1.mime_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(
            ep1.published.map(|dt| dt.to_rfc3339()),
            Some("2024-01-01T12:00:00+00:00".to_string())
        );
    }

    #[test]
    fn missing_optional_fields_fall_back_to_defaults() {
        let parsed = parse(SAMPLE_FEED);
        let ep2 = &parsed.items[1];

        // Relative enclosure resolved against the feed URL, id from media URL
        assert_eq!(ep2.media_url.as_str(), "https://example.com/media/ep2.mp3");
        assert_eq!(ep2.id, item_id("https://example.com/media/ep2.mp3"));
        assert_eq!(ep2.description, DEFAULT_DESCRIPTION);
        assert!(ep2.published.is_none());
        assert_eq!(ep2.duration_secs, 0);
        assert!(ep2.episode_number.is_none());
        assert!(ep2.guid.is_none());
    }

    #[test]
    fn minimal_single_episode_document() {
        let raw = r#"<rss version="2.0"><channel><title>T</title><description></description>
            <item><title>Episode 1</title><guid>abc</guid>
            <enclosure url="https://example.com/e1.mp3" length="0" type="audio/mpeg"/></item>
            </channel></rss>"#;
        let parsed = parse(raw);

        assert_eq!(parsed.items.len(), 1);
        let item = &parsed.items[0];
        assert_eq!(item.media_url.as_str(), "https://example.com/e1.mp3");
        assert!(!item.id.is_empty());
        assert_eq!(item.id, parse(raw).items[0].id);
        assert_eq!(item.duration_secs, 0);
        assert_eq!(item.file_size, None);
        assert_eq!(parsed.source.author, DEFAULT_AUTHOR);
        assert_eq!(parsed.source.description, DEFAULT_DESCRIPTION);
    }

    #[test]
    fn skips_items_without_enclosure() {
        let raw = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Test</title>
    <description>Test</description>
    <item>
      <title>No Audio</title>
      <guid>has-everything-else</guid>
      <description>Lots of fields</description>
      <pubDate>Mon, 01 Jan 2024 12:00:00 +0000</pubDate>
    </item>
    <item>
      <title>Empty URL</title>
      <enclosure url="  " type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;
        assert!(parse(raw).items.is_empty());
    }

    #[test]
    fn malformed_entry_does_not_sink_the_feed() {
        let raw = r#"<rss version="2.0"><channel><title>T</title><description>D</description>
            <item><title>One</title><enclosure url="https://example.com/1.mp3" type="audio/mpeg"/></item>
            <item><title>Broken</title><enclosure url="http://[::1" type="audio/mpeg"/></item>
            <item><title>Two</title><enclosure url="https://example.com/2.mp3" type="audio/mpeg"/></item>
            <item><title>Script</title><enclosure url="javascript:alert(1)" type="audio/mpeg"/></item>
            </channel></rss>"#;
        let parsed = parse(raw);

        let titles: Vec<_> = parsed.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Two"]);
    }

    #[test]
    fn validate_is_structural_only() {
        assert!(RssParser.validate(SAMPLE_FEED));
        assert!(RssParser.validate("<rdf:RDF xmlns:rdf=\"x\"><channel/></rdf:RDF>"));
        assert!(!RssParser.validate(""));
        assert!(!RssParser.validate("not xml at all"));
        assert!(!RssParser.validate(
            r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>x</title></feed>"#
        ));
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let err = RssParser.parse("<rss><channel><title>", FEED_URL).unwrap_err();
        assert_eq!(err.url, FEED_URL);
    }

    #[test]
    fn relaxed_dates() {
        assert!(parse_pub_date("Mon, 01 Jan 2024 12:00:00 +0000").is_some());
        assert!(parse_pub_date("2024-01-01T12:00:00+02:00").is_some());
        assert!(parse_pub_date("2024-01-01 12:00:00 +0000").is_some());
        assert!(parse_pub_date("sometime last week").is_none());
    }
}
