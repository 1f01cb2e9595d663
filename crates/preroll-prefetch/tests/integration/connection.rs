//! Scheduler policy following live connection measurements.

use super::{init_tracing, wait_for};
use preroll_network::{
    ActiveProbe, ConnectionMonitor, HttpLoader, HttpLoaderConfig, MonitorConfig, PassiveSignal,
    PlatformEstimate, ProbeConfig, QualityTier,
};
use preroll_prefetch::{CachePolicy, PrefetchConfig, PreloadScheduler};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn loader() -> HttpLoader {
    HttpLoader::new(HttpLoaderConfig::default()).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_platform_signal_drives_policy() {
    init_tracing();
    let config = ProbeConfig::default();
    let (platform, signal) = PassiveSignal::channel(&config);
    let monitor = ConnectionMonitor::default().with_probe(signal);

    let scheduler =
        PreloadScheduler::with_monitor(PrefetchConfig::default(), loader(), &monitor)
            .unwrap();
    assert_eq!(scheduler.policy(), CachePolicy::slow());

    platform
        .send(Some(PlatformEstimate::from_rtt(Duration::from_millis(20))))
        .unwrap();
    monitor.refresh().await;
    assert!(wait_for(Duration::from_secs(2), || scheduler.policy() == CachePolicy::fast()).await);

    platform
        .send(Some(PlatformEstimate::from_rtt(Duration::from_millis(90))))
        .unwrap();
    monitor.refresh().await;
    assert!(
        wait_for(Duration::from_secs(2), || scheduler.policy() == CachePolicy::medium()).await
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_probe_endpoint_is_conservative() {
    init_tracing();
    let probe = ActiveProbe::new(
        &ProbeConfig::default()
            .with_endpoint("http://127.0.0.1:9/ping")
            .with_timeout(Duration::from_millis(200)),
    )
    .unwrap();
    let monitor = Arc::new(ConnectionMonitor::default().with_probe(probe));

    let scheduler =
        PreloadScheduler::with_monitor(PrefetchConfig::default(), loader(), &monitor)
            .unwrap();

    assert_eq!(monitor.refresh().await.tier, QualityTier::Slow);
    assert!(
        wait_for(Duration::from_secs(2), || {
            scheduler.connection().tier == QualityTier::Slow
        })
        .await
    );
    assert_eq!(scheduler.policy(), CachePolicy::slow());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_probe_reaches_scheduler() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    // Loopback is fast but give the classifier room on a busy machine
    let probe_config = ProbeConfig::default()
        .with_endpoint(format!("{}/ping", server.uri()))
        .with_thresholds(Duration::from_secs(2), Duration::from_secs(4));
    let monitor = Arc::new(
        ConnectionMonitor::new(
            MonitorConfig::default().with_refresh_interval(Duration::from_millis(50)),
        )
        .with_probe(ActiveProbe::new(&probe_config).unwrap()),
    );

    let scheduler =
        PreloadScheduler::with_monitor(PrefetchConfig::default(), loader(), &monitor)
            .unwrap();
    let refresher = monitor.clone().spawn();

    assert!(
        wait_for(Duration::from_secs(5), || {
            scheduler.connection().tier == QualityTier::Fast
        })
        .await
    );
    assert_eq!(scheduler.policy().max_concurrent_loads, 5);

    refresher.abort();
}
