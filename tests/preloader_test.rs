//! Integration tests for the adaptive preloader
//!
//! These run in real time with fast tick/pause settings: the mock loaders
//! hold their slot for tens of milliseconds, and a paused clock would
//! auto-advance straight through those holds (and the task deadlines with
//! them).

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storefront_fetch::{
    ConcurrencyPolicy, DeviceClass, LoadOutcome, NetworkQuality, PreloadError, PreloadEvent,
    PreloadOptions, PreloadOutcome, Preloader, PreloaderConfig, Priority, ResourceLoader,
    ResourceType,
};
use tokio::sync::broadcast;

fn fast_config() -> PreloaderConfig {
    PreloaderConfig::new()
        .with_tick_interval(Duration::from_millis(10))
        .with_retry_pause(Duration::from_millis(20))
}

/// Loader that holds its slot for a fixed duration and tracks peak
/// concurrency
struct GatedLoader {
    hold: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    order: Mutex<Vec<String>>,
}

impl GatedLoader {
    fn new(hold: Duration) -> Self {
        Self {
            hold,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            order: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ResourceLoader for GatedLoader {
    async fn load(&self, url: &str, _: ResourceType) -> Result<LoadOutcome, PreloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.order.lock().push(url.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(LoadOutcome { from_cache: false })
    }
}

/// Loader that always fails at the transport level
struct FailingLoader {
    calls: AtomicUsize,
}

#[async_trait]
impl ResourceLoader for FailingLoader {
    async fn load(&self, _: &str, _: ResourceType) -> Result<LoadOutcome, PreloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PreloadError::Transport("connection refused".to_string()))
    }
}

/// Wait for `count` terminal events, panicking after five seconds
async fn wait_for_events(
    rx: &mut broadcast::Receiver<PreloadEvent>,
    count: usize,
) -> Vec<PreloadEvent> {
    let mut events = Vec::with_capacity(count);
    for _ in 0..count {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for preload event")
            .expect("event channel closed");
        events.push(event);
    }
    events
}

#[tokio::test]
async fn concurrency_never_exceeds_the_slot_budget() {
    let loader = Arc::new(GatedLoader::new(Duration::from_millis(40)));
    let preloader = Preloader::new(loader.clone(), fast_config()).unwrap();
    let mut rx = preloader.subscribe();

    // Medium quality caps the budget at two slots
    preloader.update_network_conditions(NetworkQuality::Medium, DeviceClass::Desktop);
    for i in 0..5 {
        preloader.preload_image(&format!("/img/{i}.webp"), &PreloadOptions::default());
    }

    let events = wait_for_events(&mut rx, 5).await;
    assert!(events
        .iter()
        .all(|e| matches!(e.outcome, PreloadOutcome::Loaded { .. })));
    assert!(loader.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(loader.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn duplicate_requests_load_once() {
    let loader = Arc::new(GatedLoader::new(Duration::from_millis(40)));
    let preloader = Preloader::new(loader.clone(), fast_config()).unwrap();
    let mut rx = preloader.subscribe();

    preloader.preload_script("/app.js", &PreloadOptions::default());
    preloader.preload_script("/app.js", &PreloadOptions::default());

    wait_for_events(&mut rx, 1).await;
    assert!(preloader.is_loaded("/app.js"));

    // Also idempotent after completion
    preloader.preload_script("/app.js", &PreloadOptions::default());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pause_freezes_the_queue_without_losing_it() {
    let loader = Arc::new(GatedLoader::new(Duration::ZERO));
    let preloader = Preloader::new(loader.clone(), fast_config()).unwrap();
    let mut rx = preloader.subscribe();

    preloader.pause();
    preloader.preload_font("/brand.woff2", &PreloadOptions::default());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
    assert_eq!(preloader.queued_len(), 1);

    preloader.resume();
    wait_for_events(&mut rx, 1).await;
    assert!(preloader.is_loaded("/brand.woff2"));
}

#[tokio::test]
async fn higher_priority_tasks_dequeue_first() {
    let loader = Arc::new(GatedLoader::new(Duration::from_millis(30)));
    let config = fast_config().with_concurrency(ConcurrencyPolicy {
        medium: 1,
        fast_mobile: 1,
        fast_desktop: 1,
        unknown: 1,
    });
    let preloader = Preloader::new(loader.clone(), config).unwrap();
    let mut rx = preloader.subscribe();

    // Occupy the single slot, then queue behind it in mixed priority order
    preloader.preload_image("/blocker.webp", &PreloadOptions::default());
    tokio::time::sleep(Duration::from_millis(15)).await;
    preloader.preload_image("/low.webp", &PreloadOptions::with_priority(Priority::Low));
    preloader.preload_image("/medium.webp", &PreloadOptions::with_priority(Priority::Medium));
    preloader.preload_image("/high.webp", &PreloadOptions::with_priority(Priority::High));

    wait_for_events(&mut rx, 4).await;
    let order = loader.order.lock().clone();
    assert_eq!(order, vec!["/blocker.webp", "/high.webp", "/medium.webp", "/low.webp"]);
}

#[tokio::test]
async fn failures_retry_then_settle_as_failed() {
    let loader = Arc::new(FailingLoader {
        calls: AtomicUsize::new(0),
    });
    let config = fast_config().with_max_retries(1);
    let preloader = Preloader::new(loader.clone(), config).unwrap();
    let mut rx = preloader.subscribe();

    preloader.preload_stylesheet("/theme.css", &PreloadOptions::default());

    let events = wait_for_events(&mut rx, 1).await;
    assert!(matches!(
        events[0].outcome,
        PreloadOutcome::Failed {
            error: PreloadError::Transport(_)
        }
    ));
    // Initial attempt plus one retry
    assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    assert!(preloader.is_failed("/theme.css"));
    assert!(!preloader.is_loaded("/theme.css"));
}

#[tokio::test]
async fn slow_network_suspends_until_conditions_improve() {
    let loader = Arc::new(GatedLoader::new(Duration::ZERO));
    let preloader = Preloader::new(loader.clone(), fast_config()).unwrap();
    let mut rx = preloader.subscribe();

    preloader.update_network_conditions(NetworkQuality::Slow, DeviceClass::Mobile);
    preloader.preload_route("/checkout", &PreloadOptions::default());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(loader.calls.load(Ordering::SeqCst), 0);

    preloader.update_network_conditions(NetworkQuality::Fast, DeviceClass::Mobile);
    wait_for_events(&mut rx, 1).await;
    assert!(preloader.is_loaded("/checkout"));
}

#[tokio::test]
async fn delayed_preload_waits_before_queueing() {
    let loader = Arc::new(GatedLoader::new(Duration::ZERO));
    let preloader = Preloader::new(loader.clone(), fast_config()).unwrap();
    let mut rx = preloader.subscribe();

    let options = PreloadOptions {
        delay: Some(Duration::from_millis(80)),
        ..PreloadOptions::default()
    };
    preloader.preload_image("/later.webp", &options);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(loader.calls.load(Ordering::SeqCst), 0);

    wait_for_events(&mut rx, 1).await;
    assert!(preloader.is_loaded("/later.webp"));
}

#[tokio::test]
async fn repeated_pages_are_predicted_and_preloaded() {
    let loader = Arc::new(GatedLoader::new(Duration::ZERO));
    let preloader = Preloader::new(loader.clone(), fast_config()).unwrap();
    let mut rx = preloader.subscribe();

    for _ in 0..8 {
        preloader.track_page_view("/home");
    }
    for _ in 0..4 {
        preloader.track_page_view("/shop");
    }
    preloader.track_page_view("/faq");

    preloader.predict_and_preload();

    wait_for_events(&mut rx, 2).await;
    assert!(preloader.is_loaded("/home"));
    assert!(preloader.is_loaded("/shop"));
    // Below the repetition threshold, never queued
    assert!(!preloader.is_loaded("/faq"));
    assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn metrics_reflect_terminal_outcomes() {
    let loader = Arc::new(GatedLoader::new(Duration::ZERO));
    let preloader = Preloader::new(loader.clone(), fast_config()).unwrap();
    let mut rx = preloader.subscribe();

    preloader.preload_image("/a.webp", &PreloadOptions::default());
    preloader.preload_image("/b.webp", &PreloadOptions::default());
    wait_for_events(&mut rx, 2).await;

    let metrics = preloader.metrics();
    assert_eq!(metrics.recorded, 2);
    assert!((metrics.success_rate - 1.0).abs() < f64::EPSILON);
    assert_eq!(metrics.queued, 0);
    assert_eq!(metrics.loading, 0);

    // Clearing terminal state allows a fresh load of the same URL
    preloader.clear_cache();
    preloader.preload_image("/a.webp", &PreloadOptions::default());
    wait_for_events(&mut rx, 1).await;
    assert_eq!(loader.calls.load(Ordering::SeqCst), 3);
}
