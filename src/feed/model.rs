// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_FEED_TITLE: &str = "Untitled Feed";
pub const DEFAULT_ITEM_TITLE: &str = "Untitled Episode";
pub const DEFAULT_AUTHOR: &str = "Unknown Author";
pub const DEFAULT_DESCRIPTION: &str = "No description available";

/// A subscribed feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Derived from `feed_url` alone, see [`source_id`](super::source_id)
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub feed_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artwork_url: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_url: Option<Url>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fetched_at: Option<DateTime<Utc>>,
    /// Identifiers of every item known for this source, without duplicates
    #[serde(default)]
    pub item_ids: Vec<String>,
}

impl Source {
    /// Set of known item identifiers, for diffing
    pub fn known_item_ids(&self) -> HashSet<&str> {
        self.item_ids.iter().map(String::as_str).collect()
    }
}

/// A single playable entry within a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub source_id: String,
    pub title: String,
    pub description: String,
    pub media_url: Url,
    /// Zero when the feed does not carry a duration
    pub duration_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artwork_url: Option<Url>,
}

/// Output of a format-specific parser
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedFeed {
    pub source: Source,
    pub items: Vec<Item>,
}

impl ParsedFeed {
    /// Assemble a parse result, dropping items whose id was already seen
    /// and recording the surviving ids on the source.
    pub(crate) fn assemble(mut source: Source, items: Vec<Item>) -> Self {
        let mut seen = HashSet::with_capacity(items.len());
        let items: Vec<Item> = items
            .into_iter()
            .filter(|item| {
                let fresh = seen.insert(item.id.clone());
                if !fresh {
                    tracing::debug!(
                        feed = %source.feed_url,
                        item_id = %item.id,
                        title = %item.title,
                        "Dropping duplicate entry"
                    );
                }
                fresh
            })
            .collect();

        source.item_ids = items.iter().map(|item| item.id.clone()).collect();
        Self { source, items }
    }
}

/// Returns `Some(trimmed)` when the string has visible content
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
