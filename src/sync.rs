// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;

use crate::cache::{CacheEntry, CacheMetadata, CacheStore};
use crate::error::{CacheError, FetchError, NetworkError, SyncError};
use crate::feed::{FeedFormat, Item, ParsedFeed, Source, parse_any};
use crate::fetch::{DEFAULT_USER_AGENT, FetchClient, FetchOptions, FetchedFeed};
use crate::http::HttpClient;
use crate::progress::{NoopReporter, ProgressEvent, SharedProgressReporter};
use crate::repository::SubscriptionRepository;

pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Options for a single feed synchronization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedOptions {
    /// Serve fresh cached payloads without touching the network
    pub use_cache: bool,
    /// How long a fetched payload stays fresh
    pub cache_ttl: Duration,
    /// Per-attempt network timeout
    pub timeout: Duration,
    pub user_agent: String,
    /// Revalidation hints; when both are unset the cached entry's are used
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            cache_ttl: Duration::from_secs(60 * 60),
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            etag: None,
            last_modified: None,
        }
    }
}

impl FeedOptions {
    fn fetch_options(&self, stored: CacheMetadata) -> FetchOptions {
        let hints = if self.etag.is_some() || self.last_modified.is_some() {
            CacheMetadata {
                etag: self.etag.clone(),
                last_modified: self.last_modified.clone(),
            }
        } else {
            stored
        };

        FetchOptions {
            timeout: self.timeout,
            user_agent: self.user_agent.clone(),
            etag: hints.etag,
            last_modified: hints.last_modified,
        }
    }
}

/// Where the content of a [`FeedSnapshot`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrigin {
    /// Fresh cache entry; no request was made
    CacheHit,
    /// Full document downloaded
    Fetched,
    /// Server answered 304 and the cached document was reused
    Revalidated,
}

/// Parsed state of a feed at one point in time
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot {
    pub source: Source,
    pub items: Vec<Item>,
    pub format: FeedFormat,
    pub origin: FetchOrigin,
}

/// Result of refreshing a known source
#[derive(Debug, Clone, PartialEq)]
pub struct FeedUpdate {
    /// The source with refreshed fields and the union of known item ids
    pub source: Source,
    /// Every item currently in the feed, in feed order
    pub items: Vec<Item>,
    /// Items not previously known, in feed order
    pub new_items: Vec<Item>,
    pub origin: FetchOrigin,
}

/// Items whose id is not among `known.item_ids`, preserving order
pub fn diff_new_items(known: &Source, items: &[Item]) -> Vec<Item> {
    let known = known.known_item_ids();
    items
        .iter()
        .filter(|item| !known.contains(item.id.as_str()))
        .cloned()
        .collect()
}

/// Carry identity forward from `previous` into a freshly parsed source
fn merge_source(previous: &Source, mut fresh: Source) -> Source {
    fresh.subscribed_at = previous.subscribed_at.or(fresh.subscribed_at);

    let mut seen: HashSet<String> = previous.item_ids.iter().cloned().collect();
    let mut ids = previous.item_ids.clone();
    for id in fresh.item_ids.drain(..) {
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }
    fresh.item_ids = ids;
    fresh
}

/// Final state of one source in a bulk sync
#[derive(Debug)]
pub enum SyncOutcome {
    Updated(FeedUpdate),
    Failed(SyncError),
    /// Shutdown arrived before this source finished
    Cancelled,
}

#[derive(Debug)]
pub struct SourceOutcome {
    pub feed_url: String,
    pub outcome: SyncOutcome,
}

/// Per-source results of a bulk sync, in input order
#[derive(Debug, Default)]
pub struct BulkSyncReport {
    pub outcomes: Vec<SourceOutcome>,
}

impl BulkSyncReport {
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Updated(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Failed(_)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, SyncOutcome::Cancelled))
    }

    fn count(&self, pred: impl Fn(&SyncOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }
}

/// Result of [`SyncCoordinator::subscribe`]
#[derive(Debug, Clone, PartialEq)]
pub enum SubscribeOutcome {
    Created(FeedSnapshot),
    Updated(FeedUpdate),
}

impl SubscribeOutcome {
    pub fn source(&self) -> &Source {
        match self {
            SubscribeOutcome::Created(snapshot) => &snapshot.source,
            SubscribeOutcome::Updated(update) => &update.source,
        }
    }
}

/// Orchestrates fetching, caching and parsing of feeds.
///
/// Holds no locks of its own; calls for distinct feeds may run concurrently.
pub struct SyncCoordinator<C, S> {
    fetcher: FetchClient<C>,
    cache: S,
    reporter: SharedProgressReporter,
    max_concurrent: usize,
}

impl<C: HttpClient, S: CacheStore> SyncCoordinator<C, S> {
    pub fn new(fetcher: FetchClient<C>, cache: S) -> Self {
        Self {
            fetcher,
            cache,
            reporter: NoopReporter::shared(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }

    pub fn with_reporter(mut self, reporter: SharedProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Bound on concurrently synced sources in bulk operations
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn cache(&self) -> &S {
        &self.cache
    }

    /// Retrieve and parse a feed, serving a fresh cached copy when allowed
    pub async fn fetch_feed(&self, url: &str, options: &FeedOptions) -> Result<FeedSnapshot, SyncError> {
        let url = url.trim();

        if options.use_cache {
            if let Some(snapshot) = self.cached_snapshot(url).await {
                return Ok(snapshot);
            }
        }

        self.fetch_and_store(url, options).await
    }

    /// Force a fresh fetch of `source` and report the items it did not know
    pub async fn update_feed(&self, source: &Source, options: &FeedOptions) -> Result<FeedUpdate, SyncError> {
        let forced = FeedOptions {
            use_cache: false,
            ..options.clone()
        };
        let snapshot = self.fetch_feed(&source.feed_url, &forced).await?;

        let new_items = diff_new_items(source, &snapshot.items);
        let merged = merge_source(source, snapshot.source);

        tracing::info!(
            feed = %merged.feed_url,
            total = snapshot.items.len(),
            new = new_items.len(),
            "Feed updated"
        );
        self.reporter.report(ProgressEvent::FeedUpdated {
            url: merged.feed_url.clone(),
            title: merged.title.clone(),
            new_items: new_items.len(),
        });

        Ok(FeedUpdate {
            source: merged,
            items: snapshot.items,
            new_items,
            origin: snapshot.origin,
        })
    }

    /// Drop the cached payload for one feed, or everything
    pub async fn clear_cache(&self, url: Option<&str>) -> Result<(), CacheError> {
        match url {
            Some(url) => {
                let removed = self.cache.remove(url.trim()).await?;
                tracing::debug!(feed = %url, removed, "Cleared cache entry");
            }
            None => {
                self.cache.clear().await?;
                tracing::debug!("Cleared feed cache");
            }
        }
        Ok(())
    }

    /// Update many sources concurrently until done or until `shutdown` resolves
    pub async fn sync_all<F>(&self, sources: &[Source], options: &FeedOptions, shutdown: F) -> BulkSyncReport
    where
        F: Future<Output = ()>,
    {
        let report = self.run_bulk(sources, options, shutdown).await;
        self.report_bulk_completed(&report);
        report
    }

    /// Fetch a feed and store it as a subscription, or refresh the existing one
    pub async fn subscribe<R>(&self, repo: &R, url: &str, options: &FeedOptions) -> Result<SubscribeOutcome, SyncError>
    where
        R: SubscriptionRepository + ?Sized,
    {
        let url = url.trim();

        if let Some(existing) = repo.get_by_url(url).await? {
            let update = self.update_feed(&existing, options).await?;
            repo.update(update.source.clone()).await?;
            return Ok(SubscribeOutcome::Updated(update));
        }

        let mut snapshot = self.fetch_feed(url, options).await?;
        snapshot.source.subscribed_at = Some(Utc::now());
        repo.add(snapshot.source.clone()).await?;
        tracing::info!(feed = %url, title = %snapshot.source.title, "Subscribed");

        Ok(SubscribeOutcome::Created(snapshot))
    }

    /// Bulk-update every subscription and persist the successful results
    pub async fn refresh_subscriptions<R, F>(
        &self,
        repo: &R,
        options: &FeedOptions,
        shutdown: F,
    ) -> Result<BulkSyncReport, SyncError>
    where
        R: SubscriptionRepository + ?Sized,
        F: Future<Output = ()>,
    {
        let sources = repo.list().await?;
        let mut report = self.run_bulk(&sources, options, shutdown).await;

        for entry in &mut report.outcomes {
            let write_result = match &entry.outcome {
                SyncOutcome::Updated(update) => repo.update(update.source.clone()).await,
                _ => continue,
            };
            if let Err(e) = write_result {
                tracing::warn!(feed = %entry.feed_url, error = %e, "Failed to store refreshed subscription");
                self.reporter.report(ProgressEvent::FeedFailed {
                    url: entry.feed_url.clone(),
                    error: e.to_string(),
                });
                entry.outcome = SyncOutcome::Failed(e.into());
            }
        }

        self.report_bulk_completed(&report);
        Ok(report)
    }

    async fn run_bulk<F>(&self, sources: &[Source], options: &FeedOptions, shutdown: F) -> BulkSyncReport
    where
        F: Future<Output = ()>,
    {
        self.reporter.report(ProgressEvent::BulkSyncStarted {
            total_sources: sources.len(),
        });

        let mut results: Vec<Option<Result<FeedUpdate, SyncError>>> =
            sources.iter().map(|_| None).collect();

        let mut pending = futures::stream::iter(sources.iter().enumerate())
            .map(move |(index, source)| async move { (index, self.update_feed(source, options).await) })
            .buffer_unordered(self.max_concurrent);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, cancelling remaining feed syncs");
                    break;
                }
                next = pending.next() => match next {
                    Some((index, result)) => results[index] = Some(result),
                    None => break,
                },
            }
        }
        // Dropping the stream cancels whatever is still in flight
        drop(pending);

        let outcomes = sources
            .iter()
            .zip(results)
            .map(|(source, result)| SourceOutcome {
                feed_url: source.feed_url.clone(),
                outcome: match result {
                    Some(Ok(update)) => SyncOutcome::Updated(update),
                    Some(Err(e)) => SyncOutcome::Failed(e),
                    None => SyncOutcome::Cancelled,
                },
            })
            .collect();

        BulkSyncReport { outcomes }
    }

    fn report_bulk_completed(&self, report: &BulkSyncReport) {
        tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            cancelled = report.cancelled(),
            "Bulk sync finished"
        );
        self.reporter.report(ProgressEvent::BulkSyncCompleted {
            succeeded: report.succeeded(),
            failed: report.failed(),
            cancelled: report.cancelled(),
        });
    }

    /// A snapshot from a fresh cache entry, if there is one that still parses
    async fn cached_snapshot(&self, url: &str) -> Option<FeedSnapshot> {
        let entry = match self.cache.get(url).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(feed = %url, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match parse_any(&entry.payload, url) {
            Ok((format, parsed)) => {
                tracing::debug!(feed = %url, "Serving feed from cache");
                self.reporter.report(ProgressEvent::CacheHit {
                    url: url.to_string(),
                });
                Some(self.snapshot(url, format, parsed, FetchOrigin::CacheHit, entry.fetched_at))
            }
            Err(e) => {
                tracing::warn!(feed = %url, error = %e, "Cached payload no longer parses, refetching");
                None
            }
        }
    }

    async fn fetch_and_store(&self, url: &str, options: &FeedOptions) -> Result<FeedSnapshot, SyncError> {
        let stored = self.stored_metadata(url).await;

        self.reporter.report(ProgressEvent::FetchingFeed {
            url: url.to_string(),
        });

        let (payload, metadata, origin) = match self
            .fetcher
            .fetch(url, &options.fetch_options(stored))
            .await
        {
            Ok(fetched) => fetched_parts(fetched),
            Err(FetchError::NotModified { .. }) => match self.peek_entry(url).await {
                Some(entry) => {
                    tracing::debug!(feed = %url, "Feed not modified, reusing cached payload");
                    self.reporter.report(ProgressEvent::NotModified {
                        url: url.to_string(),
                    });
                    (entry.payload, entry.metadata, FetchOrigin::Revalidated)
                }
                None => {
                    tracing::debug!(feed = %url, "Not modified but nothing cached, refetching unconditionally");
                    let unconditional = FeedOptions {
                        etag: None,
                        last_modified: None,
                        ..options.clone()
                    }
                    .fetch_options(CacheMetadata::default());
                    match self.fetcher.fetch(url, &unconditional).await {
                        Ok(fetched) => fetched_parts(fetched),
                        Err(e) => return Err(self.fail(url, unexpected_not_modified(e))),
                    }
                }
            },
            Err(FetchError::Network(e)) => return Err(self.fail(url, e.into())),
        };

        let (format, parsed) = parse_any(&payload, url).map_err(|e| self.fail(url, e.into()))?;

        if let Err(e) = self.cache.set(url, payload, options.cache_ttl, metadata).await {
            tracing::warn!(feed = %url, error = %e, "Failed to write feed to cache");
        }

        Ok(self.snapshot(url, format, parsed, origin, Utc::now()))
    }

    /// Revalidation hints from any stored entry, fresh or expired
    async fn stored_metadata(&self, url: &str) -> CacheMetadata {
        match self.cache.metadata(url).await {
            Ok(metadata) => metadata.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(feed = %url, error = %e, "Cache read failed, fetching unconditionally");
                CacheMetadata::default()
            }
        }
    }

    async fn peek_entry(&self, url: &str) -> Option<CacheEntry> {
        self.cache.peek(url).await.unwrap_or_else(|e| {
            tracing::warn!(feed = %url, error = %e, "Cache read failed");
            None
        })
    }

    fn snapshot(
        &self,
        url: &str,
        format: FeedFormat,
        parsed: ParsedFeed,
        origin: FetchOrigin,
        fetched_at: DateTime<Utc>,
    ) -> FeedSnapshot {
        let ParsedFeed { mut source, items } = parsed;
        source.last_fetched_at = Some(fetched_at);

        self.reporter.report(ProgressEvent::FeedParsed {
            url: url.to_string(),
            title: source.title.clone(),
            total_items: items.len(),
        });

        FeedSnapshot {
            source,
            items,
            format,
            origin,
        }
    }

    fn fail(&self, url: &str, error: SyncError) -> SyncError {
        tracing::warn!(feed = %url, error = %error, "Feed sync failed");
        self.reporter.report(ProgressEvent::FeedFailed {
            url: url.to_string(),
            error: error.to_string(),
        });
        error
    }
}

fn fetched_parts(fetched: FetchedFeed) -> (String, CacheMetadata, FetchOrigin) {
    let metadata = CacheMetadata {
        etag: fetched.etag,
        last_modified: fetched.last_modified,
    };
    (fetched.body, metadata, FetchOrigin::Fetched)
}

/// A 304 to a request without validators is a server bug; surface it as a status
fn unexpected_not_modified(error: FetchError) -> SyncError {
    match error {
        FetchError::NotModified { url } => NetworkError::Status { url, status: 304 }.into(),
        FetchError::Network(e) => e.into(),
    }
}
