//! Native-path detection: the host answers face queries directly.

use std::sync::Arc;
use std::time::Duration;

use core_detector::{Descriptors, Detector, telemetry};
use core_host::headless::FaceMetrics;
use core_host::{HeadlessHost, HostCapabilities};
use tokio::time::{Instant, sleep};

fn native_host() -> HeadlessHost {
    let host = HeadlessHost::new();
    host.set_native_font_loading(true);
    host
}

fn detector(host: &HeadlessHost, family: &str) -> Detector<HeadlessHost> {
    Detector::new(Arc::new(host.clone()), family, Descriptors::default())
        .with_capabilities(Arc::new(HostCapabilities::new()))
}

#[tokio::test(start_paused = true)]
async fn installed_face_resolves_on_first_query() {
    let host = native_host();
    host.install_font("Arial", FaceMetrics::proportional(0.62));
    let start = Instant::now();

    let result = detector(&host, "Arial")
        .load(None, Some(Duration::from_millis(500)))
        .await;

    assert!(result.is_ok());
    assert!(start.elapsed() < Duration::from_millis(25));
    // Native detection never mounts probes.
    assert!(host.children(host.body().unwrap()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn face_loading_mid_attempt_is_picked_up_by_polling() {
    let host = native_host();
    host.register_web_font("Lobster", FaceMetrics::proportional(0.62));
    let later = host.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(200)).await;
        later.activate_font("Lobster");
    });
    let start = Instant::now();
    let before = telemetry::snapshot();

    let result = detector(&host, "Lobster")
        .load(None, Some(Duration::from_secs(1)))
        .await;

    assert!(result.is_ok());
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
    assert!(elapsed <= Duration::from_millis(225), "{elapsed:?}");
    assert!(telemetry::snapshot().native_queries >= before.native_queries + 8);
}

#[tokio::test(start_paused = true)]
async fn face_that_never_loads_fails_at_deadline() {
    let host = native_host();
    host.register_web_font("Lobster", FaceMetrics::proportional(0.62));
    let start = Instant::now();

    let failure = detector(&host, "Lobster")
        .load(None, Some(Duration::from_millis(300)))
        .await
        .unwrap_err();

    assert_eq!(start.elapsed(), Duration::from_millis(300));
    assert_eq!(failure.descriptor.family, "Lobster");
}

#[tokio::test(start_paused = true)]
async fn rejected_query_fails_without_waiting() {
    let host = native_host();
    host.set_native_failure(Some("SecurityError"));
    let start = Instant::now();
    let before = telemetry::snapshot();

    let result = detector(&host, "Lobster")
        .load(None, Some(Duration::from_secs(3)))
        .await;

    assert!(result.is_err());
    assert!(start.elapsed() < Duration::from_millis(25));
    assert!(telemetry::snapshot().native_query_rejections > before.native_query_rejections);
}

#[tokio::test(start_paused = true)]
async fn slow_query_is_cut_off_by_deadline_timer() {
    let host = native_host();
    host.install_font("Arial", FaceMetrics::proportional(0.62));
    host.set_native_latency(Duration::from_secs(5));
    let start = Instant::now();

    let result = detector(&host, "Arial")
        .load(None, Some(Duration::from_millis(400)))
        .await;

    assert!(result.is_err());
    assert_eq!(start.elapsed(), Duration::from_millis(400));
}

#[tokio::test(start_paused = true)]
async fn oversized_timeout_still_settles() {
    let host = native_host();
    host.install_font("Arial", FaceMetrics::proportional(0.62));

    let result = detector(&host, "Arial")
        .load(None, Some(Duration::from_secs(u64::MAX)))
        .await;
    assert!(result.is_ok());

    host.set_native_failure(Some("NetworkError"));
    let failure = detector(&host, "Arial")
        .load(None, Some(Duration::from_millis(u64::MAX)))
        .await
        .unwrap_err();
    assert_eq!(failure.timeout, Duration::from_millis(u64::MAX));
}

#[tokio::test(start_paused = true)]
async fn capability_is_probed_once_per_state() {
    let host = native_host();
    host.install_font("Arial", FaceMetrics::proportional(0.62));
    let caps = Arc::new(HostCapabilities::new());
    let detector = Detector::new(Arc::new(host.clone()), "Arial", Descriptors::default())
        .with_capabilities(Arc::clone(&caps));

    assert!(detector.load(None, None).await.is_ok());
    // Later changes to the host are not re-probed: the second attempt still
    // takes the native path and the host now rejects the query.
    host.set_native_font_loading(false);
    assert!(caps.supports_native_font_loading(&host));
    let start = Instant::now();
    assert!(detector.load(None, None).await.is_err());
    assert!(start.elapsed() < Duration::from_millis(25));
    assert!(host.children(host.body().unwrap()).is_empty());
}
