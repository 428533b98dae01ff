use std::sync::Arc;

/// Events emitted while synchronizing feeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Feed is being fetched from the network
    FetchingFeed { url: String },

    /// A fresh cached payload was used; no request was made
    CacheHit { url: String },

    /// The server confirmed the cached payload is current
    NotModified { url: String },

    /// Feed document has been parsed successfully
    FeedParsed {
        url: String,
        title: String,
        total_items: usize,
    },

    /// Known subscription refreshed; `new_items` were not seen before
    FeedUpdated {
        url: String,
        title: String,
        new_items: usize,
    },

    /// Fetching or parsing a feed failed
    FeedFailed { url: String, error: String },

    /// A bulk sync over several sources is starting
    BulkSyncStarted { total_sources: usize },

    /// Bulk sync finished or was interrupted
    BulkSyncCompleted {
        succeeded: usize,
        failed: usize,
        cancelled: usize,
    },
}

/// Trait for reporting progress events during synchronization.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}


#[cfg(test)]
mod tests {
    use super::recording::RecordingReporter;
    use super::*;

    #[test]
    fn noop_reporter_accepts_events() {
        let reporter = NoopReporter::shared();
        reporter.report(ProgressEvent::FetchingFeed {
            url: "https://example.com/feed.xml".to_string(),
        });
        reporter.report(ProgressEvent::BulkSyncCompleted {
            succeeded: 1,
            failed: 0,
            cancelled: 0,
        });
    }

    #[test]
    fn recording_reporter_keeps_order() {
        let reporter = RecordingReporter::shared();
        let shared: SharedProgressReporter = reporter.clone();

        shared.report(ProgressEvent::BulkSyncStarted { total_sources: 2 });
        shared.report(ProgressEvent::CacheHit {
            url: "https://example.com/a.xml".to_string(),
        });

        assert_eq!(
            reporter.events(),
            vec![
                ProgressEvent::BulkSyncStarted { total_sources: 2 },
                ProgressEvent::CacheHit {
                    url: "https://example.com/a.xml".to_string()
                },
            ]
        );
    }
}
