pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod http;
pub mod progress;
pub mod repository;
pub mod sync;

// Re-export main types for convenience
pub use cache::{CacheEntry, CacheMetadata, CacheStore, FileCache, MemoryCache};
pub use config::Config;
pub use error::{
    CacheError, ConfigError, EntryError, FeedParseError, FetchError, NetworkError, ParseCause,
    RepositoryError, SyncError, TransportError,
};
pub use feed::{FeedFormat, FeedParser, Item, ParsedFeed, Source, detect_format, item_id, parse_any, source_id};
pub use fetch::{FetchClient, FetchOptions, FetchedFeed, RetryPolicy};
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestClient};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use repository::{MemoryRepository, SubscriptionRepository};
pub use sync::{
    BulkSyncReport, FeedOptions, FeedSnapshot, FeedUpdate, FetchOrigin, SourceOutcome,
    SubscribeOutcome, SyncCoordinator, SyncOutcome, diff_new_items,
};
