use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Transport-level failures reported by an [`HttpClient`](crate::http::HttpClient)
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

impl TransportError {
    /// Whether a fresh attempt might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Connect(_) | TransportError::Timeout => true,
            TransportError::Reqwest(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
        }
    }
}

/// Errors that can occur while retrieving a feed over the network
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Invalid feed URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("HTTP error {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },
}

impl NetworkError {
    /// Timeouts, 5xx responses and connection failures are worth retrying;
    /// everything else (4xx, bad URLs) is terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            NetworkError::InvalidUrl { .. } => false,
            NetworkError::Status { status, .. } => (500..600).contains(status),
            NetworkError::Timeout { .. } => true,
            NetworkError::Transport { source, .. } => source.is_transient(),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            NetworkError::InvalidUrl { url, .. }
            | NetworkError::Status { url, .. }
            | NetworkError::Timeout { url, .. }
            | NetworkError::Transport { url, .. } => url,
        }
    }
}

/// Outcome of a single fetch that did not produce a body
#[derive(Error, Debug)]
pub enum FetchError {
    /// The server answered 304 to a conditional request
    #[error("Feed {url} not modified since last fetch")]
    NotModified { url: String },

    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Underlying reason a whole document could not be parsed
#[derive(Error, Debug)]
pub enum ParseCause {
    #[error("invalid RSS: {0}")]
    Rss(#[from] rss::Error),

    #[error("invalid Atom: {0}")]
    Atom(#[from] quick_xml::Error),

    #[error("expected <{expected}> root element, found {}", .found.as_deref().unwrap_or("none"))]
    WrongRoot {
        expected: &'static str,
        found: Option<String>,
    },

    #[error("document is neither RSS nor Atom")]
    Unrecognized,
}

/// The feed document could not be parsed as either dialect
#[derive(Error, Debug)]
#[error("Failed to parse feed {url}: {cause}")]
pub struct FeedParseError {
    pub url: String,
    #[source]
    pub cause: ParseCause,
}

impl FeedParseError {
    pub fn new(url: impl Into<String>, cause: impl Into<ParseCause>) -> Self {
        Self {
            url: url.into(),
            cause: cause.into(),
        }
    }
}

/// Problems with a single feed entry; the entry is skipped, the feed survives
#[derive(Error, Debug)]
pub enum EntryError {
    #[error("Entry '{title}' has no media enclosure")]
    MissingMedia { title: String },

    #[error("Entry '{title}' has an invalid media URL '{url}': {source}")]
    InvalidMediaUrl {
        title: String,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Entry '{title}' has a non-playable media URL scheme '{scheme}'")]
    UnsupportedScheme { title: String, scheme: String },
}

/// Errors raised by a [`CacheStore`](crate::cache::CacheStore) backend
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode cache entry {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors raised by a [`SubscriptionRepository`](crate::repository::SubscriptionRepository)
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Subscription for {0} already exists")]
    AlreadyExists(String),

    #[error("No subscription for {0}")]
    NotFound(String),

    #[error("Failed to read subscriptions file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write subscriptions file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse subscriptions JSON in {path}: {source}")]
    JsonParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize subscriptions: {0}")]
    JsonSerializeFailed(#[from] serde_json::Error),
}

/// Errors loading the TOML configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level errors for sync operations
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Parse(#[from] FeedParseError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}
