use std::time::Duration;

use castsync::{
    FeedFormat, FeedOptions, FetchClient, FetchOrigin, FileCache, MemoryCache, MemoryRepository,
    NetworkError, ReqwestClient, RetryPolicy, SubscribeOutcome, SubscriptionRepository,
    SyncCoordinator, SyncError, source_id,
};
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd">
  <channel>
    <title>Integration Show</title>
    <link>https://example.com</link>
    <description>Testing over HTTP</description>
    <itunes:author>Jane Host</itunes:author>
    <item>
      <title>Episode 2</title>
      <guid>ep-2</guid>
      <pubDate>Tue, 02 Jan 2024 10:00:00 GMT</pubDate>
      <itunes:duration>1:02:03</itunes:duration>
      <enclosure url="/media/ep2.mp3" length="2048" type="audio/mpeg"/>
    </item>
    <item>
      <title>Episode 1</title>
      <guid>ep-1</guid>
      <enclosure url="https://cdn.example.com/ep1.mp3" length="1024" type="audio/mpeg"/>
    </item>
    <item>
      <title>Show notes only</title>
      <guid>notes</guid>
    </item>
  </channel>
</rss>"#;

const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Show</title>
  <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
  <updated>2024-01-02T10:00:00Z</updated>
  <author><name>Atom Author</name></author>
  <entry>
    <title>First Entry</title>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <updated>2024-01-02T10:00:00Z</updated>
    <link rel="enclosure" type="audio/mpeg" length="4096" href="https://cdn.example.com/first.mp3"/>
  </entry>
</feed>"#;

fn coordinator() -> SyncCoordinator<ReqwestClient, MemoryCache> {
    let retry = RetryPolicy::default().with_base_delay(Duration::from_millis(10));
    SyncCoordinator::new(
        FetchClient::new(ReqwestClient::new()).with_retry(retry),
        MemoryCache::new(),
    )
}

fn feed_url(server: &MockServer) -> String {
    format!("{}/feed.xml", server.uri())
}

#[tokio::test]
async fn fetches_and_normalizes_rss_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(RSS)
                .insert_header("Content-Type", "application/rss+xml"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let coord = coordinator();
    let url = feed_url(&server);
    let snapshot = coord.fetch_feed(&url, &FeedOptions::default()).await.unwrap();

    assert_eq!(snapshot.format, FeedFormat::Rss);
    assert_eq!(snapshot.origin, FetchOrigin::Fetched);
    assert_eq!(snapshot.source.id, source_id(&url));
    assert_eq!(snapshot.source.title, "Integration Show");
    assert_eq!(snapshot.source.author, "Jane Host");

    // The entry without media is skipped
    assert_eq!(snapshot.items.len(), 2);
    let latest = &snapshot.items[0];
    assert_eq!(latest.title, "Episode 2");
    assert_eq!(latest.duration_secs, 3723);
    assert_eq!(latest.media_url.as_str(), format!("{}/media/ep2.mp3", server.uri()));
    assert!(latest.published.is_some());
    assert!(snapshot.items[1].published.is_none());

    // Served from cache; the mock expects exactly one request
    let cached = coord.fetch_feed(&url, &FeedOptions::default()).await.unwrap();
    assert_eq!(cached.origin, FetchOrigin::CacheHit);
    assert_eq!(cached.items, snapshot.items);
}

#[tokio::test]
async fn sends_feed_accept_and_user_agent_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("user-agent", "castsync-test/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
        .expect(1)
        .mount(&server)
        .await;

    let options = FeedOptions {
        user_agent: "castsync-test/1.0".to_string(),
        ..Default::default()
    };
    coordinator().fetch_feed(&feed_url(&server), &options).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let accept = requests[0].headers.get("accept").unwrap().to_str().unwrap();
    assert!(accept.starts_with("application/rss+xml"));
}

#[tokio::test]
async fn revalidates_with_etag_and_reuses_cached_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("if-none-match", "\"v1\""))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(RSS)
                .insert_header("ETag", "\"v1\""),
        )
        .expect(1)
        .mount(&server)
        .await;

    let coord = coordinator();
    let url = feed_url(&server);
    let options = FeedOptions {
        use_cache: false,
        ..Default::default()
    };

    let first = coord.fetch_feed(&url, &options).await.unwrap();
    let second = coord.fetch_feed(&url, &options).await.unwrap();

    assert_eq!(first.origin, FetchOrigin::Fetched);
    assert_eq!(second.origin, FetchOrigin::Revalidated);
    assert_eq!(second.items, first.items);
}

#[tokio::test]
async fn retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
        .mount(&server)
        .await;

    let snapshot = coordinator()
        .fetch_feed(&feed_url(&server), &FeedOptions::default())
        .await
        .unwrap();

    assert_eq!(snapshot.items.len(), 2);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = coordinator()
        .fetch_feed(&feed_url(&server), &FeedOptions::default())
        .await
        .unwrap_err();

    match err {
        SyncError::Network(NetworkError::Status { status: 404, .. }) => {}
        e => panic!("Expected Status(404), got {:?}", e),
    }
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(RSS)
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let retry = RetryPolicy::default()
        .with_max_attempts(1)
        .with_base_delay(Duration::from_millis(10));
    let coord = SyncCoordinator::new(
        FetchClient::new(ReqwestClient::new()).with_retry(retry),
        MemoryCache::new(),
    );
    let options = FeedOptions {
        timeout: Duration::from_millis(200),
        ..Default::default()
    };

    let err = coord.fetch_feed(&feed_url(&server), &options).await.unwrap_err();
    assert!(matches!(err, SyncError::Network(NetworkError::Timeout { .. })));
}

#[tokio::test]
async fn file_cache_survives_a_new_coordinator() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ATOM))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let url = feed_url(&server);

    let first = SyncCoordinator::new(
        FetchClient::new(ReqwestClient::new()),
        FileCache::open(dir.path()).await.unwrap(),
    );
    let fetched = first.fetch_feed(&url, &FeedOptions::default()).await.unwrap();
    assert_eq!(fetched.format, FeedFormat::Atom);
    assert_eq!(fetched.source.author, "Atom Author");
    assert_eq!(fetched.items[0].file_size, Some(4096));

    let second = SyncCoordinator::new(
        FetchClient::new(ReqwestClient::new()),
        FileCache::open(dir.path()).await.unwrap(),
    );
    let cached = second.fetch_feed(&url, &FeedOptions::default()).await.unwrap();
    assert_eq!(cached.origin, FetchOrigin::CacheHit);
    assert_eq!(cached.items, fetched.items);
}

#[tokio::test]
async fn subscriptions_round_trip_through_disk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let file = dir.path().join("subscriptions.json");
    let url = feed_url(&server);
    let coord = coordinator();

    let repo = MemoryRepository::load(&file).await.unwrap();
    let outcome = coord.subscribe(&repo, &url, &FeedOptions::default()).await.unwrap();
    assert!(matches!(outcome, SubscribeOutcome::Created(_)));
    repo.save(&file).await.unwrap();

    let reloaded = MemoryRepository::load(&file).await.unwrap();
    let report = coord
        .refresh_subscriptions(&reloaded, &FeedOptions::default(), std::future::pending())
        .await
        .unwrap();
    assert_eq!(report.succeeded(), 1);

    let stored = reloaded.get_by_url(&url).await.unwrap().unwrap();
    assert_eq!(stored.item_ids.len(), 2);
    assert_eq!(stored.subscribed_at, outcome.source().subscribed_at);
}
