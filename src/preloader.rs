//! Adaptive resource preloader
//!
//! A priority-ordered, concurrency-limited scheduler for speculative
//! fetches. Each URL walks `unseen → queued → loading → {loaded | failed}`;
//! enqueue is idempotent while a URL is anywhere between queued and loaded,
//! and failures retry up to a fixed budget with a pause before re-enqueue.
//!
//! Dequeuing is event-driven: the worker wakes on a periodic tick **and** on
//! a notify fired by enqueues, freed slots, resumes and network-condition
//! changes, so the tick is a safety net rather than the scheduling latency.
//! The slot budget is recomputed from the concurrency policy table whenever
//! network conditions change; a `Slow` classification freezes dequeuing
//! entirely while keeping queued state intact, as does an explicit
//! [`Preloader::pause`].

use crate::behavior::{predict_routes, BehaviorTracker};
use crate::config::PreloaderConfig;
use crate::error::PreloadError;
use crate::loader::{ResourceLoader, ResourceType};
use crate::metrics::{MetricsRing, PreloadMetrics, PreloadRecord};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::time::{interval, sleep, timeout, Instant};
use tracing::{debug, trace, warn};

/// Preload priority; higher drains first, FIFO within a level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Speculative, least urgent
    Low,
    /// Default for advisory preloads
    Medium,
    /// Likely needed imminently
    High,
}

/// Observed network quality classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkQuality {
    /// 2g-class or data-saver; preloading suspends entirely
    Slow,
    /// 3g-class
    Medium,
    /// 4g-class or better
    Fast,
}

/// Coarse device classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    /// Phones and tablets: small slot budget even on fast networks
    Mobile,
    /// Desktop-class hardware
    Desktop,
}

/// Per-call preload options
#[derive(Debug, Clone, Default)]
pub struct PreloadOptions {
    /// Queue priority; `None` means medium
    pub priority: Option<Priority>,
    /// Wait this long before the task becomes eligible for the queue
    pub delay: Option<Duration>,
    /// Override the configured retry budget
    pub retries: Option<u32>,
    /// Override the per-type timeout
    pub timeout: Option<Duration>,
}

impl PreloadOptions {
    /// Options with a specific priority
    pub fn with_priority(priority: Priority) -> Self {
        Self {
            priority: Some(priority),
            ..Self::default()
        }
    }
}

/// Terminal outcome of a preload, broadcast to event subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreloadOutcome {
    /// The resource loaded
    Loaded {
        /// Answered by an intermediate cache
        from_cache: bool,
        /// Dequeue-to-completion wall time, milliseconds
        load_time_ms: u64,
    },
    /// The retry budget is exhausted
    Failed {
        /// Final error
        error: PreloadError,
    },
}

/// A terminal state transition for one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadEvent {
    /// Resource URL
    pub url: String,
    /// How it ended
    pub outcome: PreloadOutcome,
}

/// A task sitting in the priority queue
#[derive(Debug, Clone)]
struct QueuedTask {
    url: String,
    resource_type: ResourceType,
    priority: Priority,
    retries_remaining: u32,
    timeout: Duration,
    /// Monotonic enqueue order for FIFO within a priority level
    seq: u64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Max-heap: higher priority first, then earlier seq
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct SchedulerState {
    queue: BinaryHeap<QueuedTask>,
    /// URLs anywhere between queued and terminal (queued, loading, or in a
    /// retry pause); the idempotence set
    pending: HashSet<String>,
    loading: HashSet<String>,
    loaded: HashSet<String>,
    failed: HashSet<String>,
    max_concurrent: usize,
    /// Frozen by a `Slow` network classification
    suspended: bool,
    /// Frozen by an explicit `pause()`
    enabled: bool,
    quality: Option<NetworkQuality>,
    device: Option<DeviceClass>,
}

struct PreloaderInner {
    state: Mutex<SchedulerState>,
    behavior: Mutex<BehaviorTracker>,
    ring: Mutex<MetricsRing>,
    loader: Arc<dyn ResourceLoader>,
    config: PreloaderConfig,
    notify: Notify,
    events: broadcast::Sender<PreloadEvent>,
    seq: AtomicU64,
}

impl PreloaderInner {
    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn enqueue(&self, url: &str, resource_type: ResourceType, options: &PreloadOptions) {
        {
            let mut state = self.state.lock();
            if state.pending.contains(url) || state.loaded.contains(url) {
                trace!(url = %url, "preload already tracked, ignoring");
                return;
            }
            // An explicit re-request after terminal failure starts over
            state.failed.remove(url);
            state.pending.insert(url.to_string());
            state.queue.push(QueuedTask {
                url: url.to_string(),
                resource_type,
                priority: options.priority.unwrap_or(Priority::Medium),
                retries_remaining: options.retries.unwrap_or(self.config.max_retries),
                timeout: options
                    .timeout
                    .unwrap_or_else(|| self.config.timeout_for(resource_type)),
                seq: self.next_seq(),
            });
        }
        trace!(url = %url, kind = %resource_type, "preload queued");
        self.notify.notify_one();
    }

    /// Move tasks from the queue into execution while slots are free.
    /// Holding the lock only between pops keeps check-then-act atomic.
    fn drain(inner: &Arc<Self>) {
        loop {
            let task = {
                let mut state = inner.state.lock();
                if !state.enabled || state.suspended {
                    return;
                }
                if state.loading.len() >= state.max_concurrent {
                    return;
                }
                let Some(task) = state.queue.pop() else {
                    return;
                };
                state.loading.insert(task.url.clone());
                task
            };

            trace!(url = %task.url, kind = %task.resource_type, "preload dequeued");
            tokio::spawn(Self::execute(Arc::clone(inner), task));
        }
    }

    async fn execute(inner: Arc<Self>, task: QueuedTask) {
        let started = Instant::now();
        let result = timeout(task.timeout, inner.loader.load(&task.url, task.resource_type)).await;
        let outcome = match result {
            Ok(Ok(load)) => Ok(load),
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Err(PreloadError::Timeout),
        };

        match outcome {
            Ok(load) => {
                let load_time = started.elapsed();
                {
                    let mut state = inner.state.lock();
                    state.loading.remove(&task.url);
                    state.pending.remove(&task.url);
                    state.loaded.insert(task.url.clone());
                }
                inner.ring.lock().push(PreloadRecord::now(
                    &task.url,
                    load_time,
                    true,
                    load.from_cache,
                ));
                let _ = inner.events.send(PreloadEvent {
                    url: task.url.clone(),
                    outcome: PreloadOutcome::Loaded {
                        from_cache: load.from_cache,
                        load_time_ms: load_time.as_millis() as u64,
                    },
                });
                debug!(url = %task.url, ms = load_time.as_millis() as u64, "preload completed");
                inner.notify.notify_one();
            }
            Err(error) if task.retries_remaining > 0 => {
                warn!(
                    url = %task.url,
                    error = %error,
                    retries_remaining = task.retries_remaining,
                    "preload failed, will retry after pause"
                );
                {
                    // Slot freed; the URL stays pending through the pause so
                    // duplicate enqueues are still rejected
                    let mut state = inner.state.lock();
                    state.loading.remove(&task.url);
                }
                inner.notify.notify_one();

                let mut task = task;
                task.retries_remaining -= 1;
                tokio::spawn(async move {
                    sleep(inner.config.retry_pause).await;
                    task.seq = inner.next_seq();
                    inner.state.lock().queue.push(task);
                    inner.notify.notify_one();
                });
            }
            Err(error) => {
                let load_time = started.elapsed();
                {
                    let mut state = inner.state.lock();
                    state.loading.remove(&task.url);
                    state.pending.remove(&task.url);
                    state.failed.insert(task.url.clone());
                }
                inner
                    .ring
                    .lock()
                    .push(PreloadRecord::now(&task.url, load_time, false, false));
                let _ = inner.events.send(PreloadEvent {
                    url: task.url.clone(),
                    outcome: PreloadOutcome::Failed {
                        error: error.clone(),
                    },
                });
                warn!(url = %task.url, error = %error, "preload failed terminally");
                inner.notify.notify_one();
            }
        }
    }

    async fn run(inner: Arc<Self>) {
        let mut tick = interval(inner.config.tick_interval);
        loop {
            tokio::select! {
                _ = tick.tick() => {}
                () = inner.notify.notified() => {}
            }
            Self::drain(&inner);
        }
    }
}

/// Speculative resource preloader.
///
/// Preload calls are fire-and-forget: they never fail and never block.
/// Terminal outcomes are observable through [`Preloader::subscribe`] and
/// [`Preloader::metrics`]. The background worker stops when the `Preloader`
/// is dropped.
pub struct Preloader {
    inner: Arc<PreloaderInner>,
    worker: tokio::task::JoinHandle<()>,
}

impl Preloader {
    /// Create a preloader and start its scheduler worker
    pub fn new(loader: Arc<dyn ResourceLoader>, config: PreloaderConfig) -> Result<Self, PreloadError> {
        config
            .validate()
            .map_err(PreloadError::InvalidConfiguration)?;

        let (events, _) = broadcast::channel(64);
        let inner = Arc::new(PreloaderInner {
            state: Mutex::new(SchedulerState {
                queue: BinaryHeap::new(),
                pending: HashSet::new(),
                loading: HashSet::new(),
                loaded: HashSet::new(),
                failed: HashSet::new(),
                max_concurrent: config.concurrency.unknown,
                suspended: false,
                enabled: true,
                quality: None,
                device: None,
            }),
            behavior: Mutex::new(BehaviorTracker::new(
                config.max_page_views,
                config.max_interactions,
            )),
            ring: Mutex::new(MetricsRing::new(config.max_metric_records)),
            loader,
            config,
            notify: Notify::new(),
            events,
            seq: AtomicU64::new(0),
        });

        let worker = tokio::spawn(PreloaderInner::run(Arc::clone(&inner)));
        Ok(Self { inner, worker })
    }

    /// Queue an image preload
    pub fn preload_image(&self, url: &str, options: &PreloadOptions) {
        self.preload(url, ResourceType::Image, options);
    }

    /// Queue a stylesheet preload
    pub fn preload_stylesheet(&self, url: &str, options: &PreloadOptions) {
        self.preload(url, ResourceType::Stylesheet, options);
    }

    /// Queue a script preload
    pub fn preload_script(&self, url: &str, options: &PreloadOptions) {
        self.preload(url, ResourceType::Script, options);
    }

    /// Queue a font preload
    pub fn preload_font(&self, url: &str, options: &PreloadOptions) {
        self.preload(url, ResourceType::Font, options);
    }

    /// Queue a route existence probe
    pub fn preload_route(&self, url: &str, options: &PreloadOptions) {
        self.preload(url, ResourceType::Route, options);
    }

    fn preload(&self, url: &str, resource_type: ResourceType, options: &PreloadOptions) {
        match options.delay {
            Some(delay) if delay > Duration::ZERO => {
                let inner = Arc::clone(&self.inner);
                let url = url.to_string();
                let options = options.clone();
                tokio::spawn(async move {
                    sleep(delay).await;
                    inner.enqueue(&url, resource_type, &options);
                });
            }
            _ => self.inner.enqueue(url, resource_type, options),
        }
    }

    /// Suspend all scheduling without losing queued state
    pub fn pause(&self) {
        self.inner.state.lock().enabled = false;
        debug!("preloader paused");
    }

    /// Resume scheduling
    pub fn resume(&self) {
        self.inner.state.lock().enabled = true;
        debug!("preloader resumed");
        self.inner.notify.notify_one();
    }

    /// Recompute the slot budget from observed conditions. `Slow` freezes
    /// dequeuing entirely; queued state is retained.
    pub fn update_network_conditions(&self, quality: NetworkQuality, device: DeviceClass) {
        let slots = self.inner.config.concurrency.slots_for(quality, device);
        {
            let mut state = self.inner.state.lock();
            state.quality = Some(quality);
            state.device = Some(device);
            state.suspended = quality == NetworkQuality::Slow;
            if !state.suspended {
                state.max_concurrent = slots.max(1);
            }
        }
        debug!(?quality, ?device, slots, "network conditions updated");
        self.inner.notify.notify_one();
    }

    /// Forget terminal state so previously loaded or failed URLs can be
    /// preloaded again. Queued and loading tasks are unaffected.
    pub fn clear_cache(&self) {
        let mut state = self.inner.state.lock();
        state.loaded.clear();
        state.failed.clear();
    }

    /// Record a page view for prediction
    pub fn track_page_view(&self, page: &str) {
        self.inner.behavior.lock().record_page_view(page);
    }

    /// Record dwell time on a page
    pub fn track_time_spent(&self, page: &str, ms: u64) {
        self.inner.behavior.lock().record_time_spent(page, ms);
    }

    /// Record a named interaction
    pub fn track_interaction(&self, name: &str) {
        self.inner.behavior.lock().record_interaction(name);
    }

    /// Rank likely next routes from recorded behavior and queue advisory
    /// probes for them. Never blocks foreground work.
    pub fn predict_and_preload(&self) {
        let snapshot = self.inner.behavior.lock().snapshot();
        let predictions = predict_routes(
            &snapshot,
            self.inner.config.medium_repetition_threshold,
            self.inner.config.high_repetition_threshold,
        );
        for (page, priority) in predictions {
            self.preload_route(&page, &PreloadOptions::with_priority(priority));
        }
    }

    /// Derive aggregate metrics from the outcome ring and live queue state
    pub fn metrics(&self) -> PreloadMetrics {
        let (queued, loading) = {
            let state = self.inner.state.lock();
            (state.queue.len(), state.loading.len())
        };
        self.inner.ring.lock().aggregate(queued, loading)
    }

    /// Subscribe to terminal preload outcomes
    pub fn subscribe(&self) -> broadcast::Receiver<PreloadEvent> {
        self.inner.events.subscribe()
    }

    /// Whether a URL reached the loaded set
    pub fn is_loaded(&self, url: &str) -> bool {
        self.inner.state.lock().loaded.contains(url)
    }

    /// Whether a URL exhausted its retry budget
    pub fn is_failed(&self, url: &str) -> bool {
        self.inner.state.lock().failed.contains(url)
    }

    /// Tasks waiting in the queue
    pub fn queued_len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Tasks currently loading
    pub fn active_len(&self) -> usize {
        self.inner.state.lock().loading.len()
    }

    /// Last observed network conditions, if any signal arrived yet
    pub fn network_conditions(&self) -> Option<(NetworkQuality, DeviceClass)> {
        let state = self.inner.state.lock();
        state.quality.zip(state.device)
    }
}

impl Drop for Preloader {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn heap_drains_by_priority_then_fifo() {
        let mut heap = BinaryHeap::new();
        let task = |priority, seq| QueuedTask {
            url: format!("/r{seq}"),
            resource_type: ResourceType::Route,
            priority,
            retries_remaining: 0,
            timeout: Duration::from_secs(1),
            seq,
        };
        heap.push(task(Priority::Low, 0));
        heap.push(task(Priority::High, 1));
        heap.push(task(Priority::Medium, 2));
        heap.push(task(Priority::High, 3));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop()).map(|t| t.seq).collect();
        assert_eq!(order, vec![1, 3, 2, 0]);
    }
}
