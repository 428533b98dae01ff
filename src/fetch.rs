// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Network retrieval of feed documents.
//!
//! Every attempt is bounded by a timeout, transient failures are retried with
//! exponential backoff, and conditional headers let the server answer
//! `304 Not Modified` instead of resending an unchanged document. Dropping
//! the future returned by [`FetchClient::fetch`] cancels the request in
//! flight and any pending backoff sleep.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{
    ACCEPT, ETAG, HeaderMap, HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
    USER_AGENT,
};
use url::Url;

use crate::error::{FetchError, NetworkError};
use crate::http::{HttpClient, HttpRequest, HttpResponse};

pub const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.9, */*;q=0.8";

pub const DEFAULT_USER_AGENT: &str = concat!("castsync/", env!("CARGO_PKG_VERSION"));

/// Per-request options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub user_agent: String,
    /// Revalidation token from a prior response, sent as `If-None-Match`
    pub etag: Option<String>,
    /// Last-Modified value from a prior response, sent as `If-Modified-Since`
    pub last_modified: Option<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            etag: None,
            last_modified: None,
        }
    }
}

/// How many times to try and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay after the given (1-based) failed attempt: 1s, 2s, 4s, ... capped
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// A successfully retrieved feed document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFeed {
    pub body: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Retrieves feed documents through an [`HttpClient`]
#[derive(Debug, Clone)]
pub struct FetchClient<C> {
    client: C,
    retry: RetryPolicy,
}

impl<C: HttpClient> FetchClient<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetch a feed, retrying transient failures.
    ///
    /// Returns [`FetchError::NotModified`] when the server confirms the
    /// revalidation hints in `options` are still current.
    pub async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<FetchedFeed, FetchError> {
        let url = url.trim();
        let request = build_request(url, options)?;

        let mut attempt = 1;
        loop {
            match self.attempt(url, &request, options.timeout).await {
                Ok(feed) => return Ok(feed),
                Err(FetchError::Network(err))
                    if err.is_transient() && attempt < self.retry.max_attempts =>
                {
                    let delay = self.retry.delay_after(attempt);
                    tracing::warn!(
                        feed = %url,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient fetch failure, retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Errors carry the caller's URL, not the normalized request URL
    async fn attempt(
        &self,
        url: &str,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<FetchedFeed, FetchError> {
        let response = tokio::time::timeout(timeout, self.client.get(request))
            .await
            .map_err(|_| NetworkError::Timeout {
                url: url.to_string(),
                timeout,
            })?
            .map_err(|source| NetworkError::Transport {
                url: url.to_string(),
                source,
            })?;

        if response.status == 304 {
            return Err(FetchError::NotModified { url: url.to_string() });
        }
        if !(200..300).contains(&response.status) {
            return Err(NetworkError::Status {
                url: url.to_string(),
                status: response.status,
            }
            .into());
        }

        Ok(into_fetched(response))
    }
}

fn build_request(url: &str, options: &FetchOptions) -> Result<HttpRequest, NetworkError> {
    let parsed = Url::parse(url).map_err(|source| NetworkError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(FEED_ACCEPT));
    insert_header(&mut headers, USER_AGENT, Some(&options.user_agent), url);
    insert_header(&mut headers, IF_NONE_MATCH, options.etag.as_deref(), url);
    insert_header(&mut headers, IF_MODIFIED_SINCE, options.last_modified.as_deref(), url);

    Ok(HttpRequest {
        url: parsed.to_string(),
        headers,
    })
}

fn insert_header(
    headers: &mut HeaderMap,
    name: reqwest::header::HeaderName,
    value: Option<&str>,
    url: &str,
) {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return;
    };
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => {
            tracing::warn!(feed = %url, header = %name, "Dropping header with invalid characters");
        }
    }
}

fn into_fetched(response: HttpResponse) -> FetchedFeed {
    let etag = response.header(ETAG.as_str()).map(String::from);
    let last_modified = response.header(LAST_MODIFIED.as_str()).map(String::from);

    let body = String::from_utf8_lossy(&response.body);
    let body = body.strip_prefix('\u{feff}').unwrap_or(&body).to_string();

    FetchedFeed {
        body,
        etag,
        last_modified,
        fetched_at: Utc::now(),
    }
}
