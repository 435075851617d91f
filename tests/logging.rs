//! What the perimeter reports through `tracing`.

use fetch_perimeter::infrastructure::mocks::{
    MockCache, MockCaptureLayer, MockClock, MockFetcher, MockSummarizer,
};
use fetch_perimeter::{Pipeline, QuotaSet, RateLimiter};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

fn capture() -> (MockCaptureLayer, tracing::subscriber::DefaultGuard) {
    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}

fn pipeline(cache: MockCache, fetcher: MockFetcher, summarizer: MockSummarizer) -> Pipeline {
    let limiter = RateLimiter::builder()
        .with_name("per-minute")
        .with_limit(1)
        .with_background_sweep(false)
        .build()
        .unwrap();
    Pipeline::new(Arc::new(cache), Arc::new(fetcher), Arc::new(summarizer))
        .with_quotas(QuotaSet::new().with_limiter(limiter))
}

fn article() -> String {
    "Enough text to clear the minimum length for summarization. ".repeat(5)
}

#[tokio::test]
async fn test_cache_write_failure_is_logged_not_returned() {
    let (capture, _guard) = capture();
    let pipeline = pipeline(
        MockCache::new().failing_writes(),
        MockFetcher::returning(article()),
        MockSummarizer::returning("Summary."),
    );

    assert!(pipeline.run("example.com/post", "ip1").await.is_ok());

    let event = capture.find("cache write failed").unwrap();
    assert_eq!(event.level, Level::WARN);
    assert_eq!(event.field("url"), Some("https://example.com/post"));
    assert_eq!(event.field("error"), Some("cache unavailable: write refused"));
}

#[tokio::test]
async fn test_fetch_detail_stays_in_logs() {
    let (capture, _guard) = capture();
    let pipeline = pipeline(
        MockCache::new(),
        MockFetcher::failing(fetch_perimeter::FetchError::Status(503)),
        MockSummarizer::returning("Summary."),
    );

    let err = pipeline.run("example.com", "ip1").await.unwrap_err();
    assert!(!err.user_message().contains("503"));

    let event = capture.find("fetch failed").unwrap();
    assert_eq!(event.level, Level::WARN);
    assert_eq!(event.field("error"), Some("upstream responded with status 503"));
}

#[tokio::test]
async fn test_rejections_log_at_debug() {
    let (capture, _guard) = capture();
    let pipeline = pipeline(
        MockCache::new(),
        MockFetcher::returning(article()),
        MockSummarizer::returning("Summary."),
    );

    let _ = pipeline.run("localhost:8080/admin", "ip1").await;
    let blocked = capture.find("rejected blocked url").unwrap();
    assert_eq!(blocked.level, Level::DEBUG);
    assert_eq!(blocked.field("url"), Some("https://localhost:8080/admin"));

    pipeline.admit("example.com", "ip1").unwrap();
    let _ = pipeline.admit("example.com", "ip1");

    let quota = capture.find("rejected over quota").unwrap();
    assert_eq!(quota.field("caller"), Some("ip1"));
    assert_eq!(quota.field("window"), Some("per-minute"));

    let limit = capture.find("rate limit exceeded").unwrap();
    assert_eq!(limit.level, Level::DEBUG);
    assert_eq!(limit.field("key"), Some("ip1"));
}

#[test]
fn test_sweep_and_destroy_are_logged() {
    let capture = MockCaptureLayer::new();
    let subscriber = tracing_subscriber::registry().with(capture.clone());

    tracing::subscriber::with_default(subscriber, || {
        let clock = MockClock::new(Instant::now());
        let limiter = RateLimiter::builder()
            .with_name("daily")
            .with_window(Duration::from_secs(10))
            .with_clock(Arc::new(clock.clone()))
            .with_background_sweep(false)
            .build()
            .unwrap();

        limiter.check("a");
        limiter.check("b");
        clock.advance(Duration::from_secs(11));
        assert_eq!(limiter.sweep(), 2);
        limiter.destroy();
    });

    let swept = capture.find("reclaimed expired").unwrap();
    assert_eq!(swept.level, Level::DEBUG);
    assert_eq!(swept.field("swept"), Some("2"));
    assert_eq!(swept.field("window"), Some("daily"));

    let destroyed = capture.find("rate limiter destroyed").unwrap();
    assert_eq!(destroyed.level, Level::INFO);
}

#[tokio::test(start_paused = true)]
async fn test_cache_write_timeout_is_logged() {
    let (capture, _guard) = capture();
    let pipeline = pipeline(
        MockCache::new().hanging_writes(),
        MockFetcher::returning(article()),
        MockSummarizer::returning("Summary."),
    );

    assert!(pipeline.run("example.com/post", "ip1").await.is_ok());

    let event = capture.find("cache write timed out").unwrap();
    assert_eq!(event.level, Level::WARN);
    assert_eq!(event.field("url"), Some("https://example.com/post"));
    assert_eq!(event.field("timeout_ms"), Some("2000"));
}
