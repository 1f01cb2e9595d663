//! Scheduler driving the HTTP loader end to end.

use super::{init_tracing, wait_for};
use preroll_network::{ConnectionSnapshot, HttpLoader, HttpLoaderConfig, QualityTier};
use preroll_prefetch::{
    EntryState, PrefetchConfig, PrefetchRequest, PreloadScheduler, Priority, RetryConfig,
};
use std::time::Duration;
use tokio::sync::watch;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PATIENCE: Duration = Duration::from_secs(5);

fn scheduler(
    config: PrefetchConfig,
    tier: QualityTier,
) -> (
    PreloadScheduler<HttpLoader>,
    watch::Sender<ConnectionSnapshot>,
) {
    let loader = HttpLoader::new(HttpLoaderConfig::default().with_metadata_bytes(512)).unwrap();
    let (tx, rx) = watch::channel(ConnectionSnapshot::new(tier));
    (PreloadScheduler::new(config, loader, rx).unwrap(), tx)
}

fn quick_retries() -> PrefetchConfig {
    let mut retry = RetryConfig::default().with_initial_backoff(Duration::from_millis(20));
    retry.max_backoff_ms = 200;
    PrefetchConfig::default().with_retry(retry)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_prefetched_track_is_ready() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks/intro.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8; 2048]))
        .expect(1)
        .mount(&server)
        .await;

    let (scheduler, _tx) = scheduler(PrefetchConfig::default(), QualityTier::Fast);
    scheduler.request_prefetch([PrefetchRequest::new(
        "intro",
        format!("{}/tracks/intro.mp3", server.uri()),
        Priority::High,
    )]);

    assert!(
        wait_for(PATIENCE, || scheduler.get_status("intro") == Some(EntryState::Ready)).await
    );

    let track = scheduler.get_ready_resource("intro").unwrap();
    assert_eq!(track.len(), 2048);
    assert_eq!(scheduler.stats().completed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_link_fetches_leading_range_only() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks/long.flac"))
        .and(header("range", "bytes=0-511"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![1u8; 512]))
        .expect(1)
        .mount(&server)
        .await;

    let (scheduler, _tx) = scheduler(PrefetchConfig::default(), QualityTier::Slow);
    scheduler.request_upcoming([(
        "long".to_string(),
        format!("{}/tracks/long.flac", server.uri()),
    )]);

    assert!(
        wait_for(PATIENCE, || scheduler.get_status("long") == Some(EntryState::Ready)).await
    );
    assert_eq!(scheduler.get_ready_resource("long").unwrap().len(), 512);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_server_errors_exhaust_retries() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks/broken.mp3"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (scheduler, _tx) = scheduler(quick_retries(), QualityTier::Medium);
    let request = PrefetchRequest::new(
        "broken",
        format!("{}/tracks/broken.mp3", server.uri()),
        Priority::Medium,
    );
    scheduler.request_prefetch([request.clone()]);

    assert!(
        wait_for(PATIENCE, || {
            scheduler
                .entries()
                .iter()
                .any(|e| e.item_id == "broken" && e.retry_count == 3)
        })
        .await
    );
    assert_eq!(scheduler.get_status("broken"), Some(EntryState::Failed));

    // No automatic attempts once exhausted
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(scheduler.stats().failed_transfers, 3);

    // A fresh request starts over
    scheduler.request_prefetch([request]);
    assert!(
        wait_for(PATIENCE, || {
            scheduler
                .entries()
                .iter()
                .any(|e| e.item_id == "broken" && e.retry_count >= 1)
        })
        .await
    );
    assert!(server.received_requests().await.unwrap().len() >= 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_track_fails_without_disturbing_others() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks/gone.mp3"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tracks/next.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![2u8; 256]))
        .mount(&server)
        .await;

    let (scheduler, _tx) = scheduler(quick_retries(), QualityTier::Slow);
    scheduler.request_prefetch([
        PrefetchRequest::new(
            "gone",
            format!("{}/tracks/gone.mp3", server.uri()),
            Priority::High,
        ),
        PrefetchRequest::new(
            "next",
            format!("{}/tracks/next.mp3", server.uri()),
            Priority::Medium,
        ),
    ]);

    assert!(
        wait_for(PATIENCE, || scheduler.get_status("next") == Some(EntryState::Ready)).await
    );
    assert!(scheduler.get_ready_resource("gone").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_clear_abandons_in_flight_transfer() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks/slow.mp3"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; 128])
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let (scheduler, _tx) = scheduler(PrefetchConfig::default(), QualityTier::Fast);
    scheduler.request_prefetch([PrefetchRequest::new(
        "slow",
        format!("{}/tracks/slow.mp3", server.uri()),
        Priority::High,
    )]);
    assert_eq!(scheduler.stats().active_loads, 1);

    scheduler.clear();
    tokio::time::sleep(Duration::from_millis(700)).await;

    assert_eq!(scheduler.get_status("slow"), None);
    let stats = scheduler.stats();
    assert_eq!(stats.tracked, 0);
    assert_eq!(stats.active_loads, 0);
    assert_eq!(stats.completed, 0);
}
