use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Latency samples kept per histogram; older samples are dropped
const LATENCY_WINDOW: usize = 1000;

/// Global metrics collector for the application.
///
/// Tracks classifier and translator usage, result-cache performance and
/// session activity. Cheap to clone; all clones share the same counters.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Classifier
    classifier_calls_total: AtomicUsize,
    classifier_calls_failed: AtomicUsize,
    classifier_latency_ms: RwLock<VecDeque<u64>>,

    // Translator
    translation_calls_success: AtomicUsize,
    translation_calls_failed: AtomicUsize,
    translation_fallbacks: AtomicUsize,
    translation_latency_ms: RwLock<VecDeque<u64>>,

    // Result cache
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,

    // Interactions and sessions
    interactions: AtomicUsize,
    interactions_failed: AtomicUsize,
    images_processed: AtomicUsize,
    resets: AtomicUsize,
    active_sessions: AtomicUsize,

    endpoint_counters: DashMap<String, AtomicUsize>,

    circuit_breaker_trips: AtomicUsize,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                classifier_calls_total: AtomicUsize::new(0),
                classifier_calls_failed: AtomicUsize::new(0),
                classifier_latency_ms: RwLock::new(VecDeque::with_capacity(LATENCY_WINDOW)),
                translation_calls_success: AtomicUsize::new(0),
                translation_calls_failed: AtomicUsize::new(0),
                translation_fallbacks: AtomicUsize::new(0),
                translation_latency_ms: RwLock::new(VecDeque::with_capacity(LATENCY_WINDOW)),
                cache_hits: AtomicUsize::new(0),
                cache_misses: AtomicUsize::new(0),
                interactions: AtomicUsize::new(0),
                interactions_failed: AtomicUsize::new(0),
                images_processed: AtomicUsize::new(0),
                resets: AtomicUsize::new(0),
                active_sessions: AtomicUsize::new(0),
                endpoint_counters: DashMap::new(),
                circuit_breaker_trips: AtomicUsize::new(0),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_classifier_call(&self, success: bool, duration: Duration) {
        self.inner.classifier_calls_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.classifier_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        push_sample(&self.inner.classifier_latency_ms, duration);
    }

    pub fn record_translation_call(&self, success: bool, duration: Duration) {
        if success {
            self.inner.translation_calls_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.translation_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
        push_sample(&self.inner.translation_latency_ms, duration);
    }

    pub fn record_translation_fallback(&self) {
        self.inner.translation_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_interaction(&self, success: bool, num_images: usize) {
        self.inner.interactions.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.interactions_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.images_processed.fetch_add(num_images, Ordering::Relaxed);
    }

    pub fn record_reset(&self) {
        self.inner.resets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_active_sessions(&self, count: usize) {
        self.inner.active_sessions.store(count, Ordering::Relaxed);
    }

    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner
            .endpoint_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_circuit_breaker_trip(&self) {
        self.inner.circuit_breaker_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let classifier_latency = self.inner.classifier_latency_ms.read();
        let classifier_latency_avg_ms = avg(&classifier_latency);
        let classifier_latency_p95_ms = percentile(&classifier_latency, 0.95);
        drop(classifier_latency);

        let translation_latency = self.inner.translation_latency_ms.read();
        let translation_latency_avg_ms = avg(&translation_latency);
        drop(translation_latency);

        let cache_hits = self.inner.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.inner.cache_misses.load(Ordering::Relaxed);
        let cache_total = cache_hits + cache_misses;
        let cache_hit_rate = if cache_total > 0 {
            cache_hits as f64 / cache_total as f64
        } else {
            0.0
        };

        let mut endpoint_requests: Vec<(String, usize)> = self
            .inner
            .endpoint_counters
            .iter()
            .map(|e| (e.key().clone(), e.value().load(Ordering::Relaxed)))
            .collect();
        endpoint_requests.sort();

        MetricsSnapshot {
            classifier_calls_total: self.inner.classifier_calls_total.load(Ordering::Relaxed),
            classifier_calls_failed: self.inner.classifier_calls_failed.load(Ordering::Relaxed),
            classifier_latency_avg_ms,
            classifier_latency_p95_ms,
            translation_calls_success: self
                .inner
                .translation_calls_success
                .load(Ordering::Relaxed),
            translation_calls_failed: self.inner.translation_calls_failed.load(Ordering::Relaxed),
            translation_fallbacks: self.inner.translation_fallbacks.load(Ordering::Relaxed),
            translation_latency_avg_ms,
            cache_hits,
            cache_misses,
            cache_hit_rate,
            interactions: self.inner.interactions.load(Ordering::Relaxed),
            interactions_failed: self.inner.interactions_failed.load(Ordering::Relaxed),
            images_processed: self.inner.images_processed.load(Ordering::Relaxed),
            resets: self.inner.resets.load(Ordering::Relaxed),
            active_sessions: self.inner.active_sessions.load(Ordering::Relaxed),
            endpoint_requests,
            circuit_breaker_trips: self.inner.circuit_breaker_trips.load(Ordering::Relaxed),
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = format!(
            r#"# HELP classifier_calls_total Total number of classifier invocations
# TYPE classifier_calls_total counter
classifier_calls_total {}

# HELP classifier_calls_failed_total Classifier invocations that returned an error
# TYPE classifier_calls_failed_total counter
classifier_calls_failed_total {}

# HELP classifier_latency_avg_ms Average classifier latency in milliseconds
# TYPE classifier_latency_avg_ms gauge
classifier_latency_avg_ms {}

# HELP translation_calls_total Translation API calls by outcome
# TYPE translation_calls_total counter
translation_calls_total{{outcome="success"}} {}
translation_calls_total{{outcome="failure"}} {}

# HELP translation_fallbacks_total Labels shown untranslated after a failure
# TYPE translation_fallbacks_total counter
translation_fallbacks_total {}

# HELP cache_hit_rate Result cache hit rate (0.0 to 1.0)
# TYPE cache_hit_rate gauge
cache_hit_rate {}

# HELP interactions_total Image-submitting requests handled
# TYPE interactions_total counter
interactions_total {}

# HELP images_processed_total Total number of images processed
# TYPE images_processed_total counter
images_processed_total {}

# HELP resets_total Session resets
# TYPE resets_total counter
resets_total {}

# HELP active_sessions Live sessions
# TYPE active_sessions gauge
active_sessions {}

# HELP circuit_breaker_trips_total Total circuit breaker trips
# TYPE circuit_breaker_trips_total counter
circuit_breaker_trips_total {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {}
"#,
            snapshot.classifier_calls_total,
            snapshot.classifier_calls_failed,
            snapshot.classifier_latency_avg_ms,
            snapshot.translation_calls_success,
            snapshot.translation_calls_failed,
            snapshot.translation_fallbacks,
            snapshot.cache_hit_rate,
            snapshot.interactions,
            snapshot.images_processed,
            snapshot.resets,
            snapshot.active_sessions,
            snapshot.circuit_breaker_trips,
            snapshot.uptime_seconds,
        );

        if !snapshot.endpoint_requests.is_empty() {
            out.push_str("\n# HELP endpoint_requests_total Requests per endpoint\n");
            out.push_str("# TYPE endpoint_requests_total counter\n");
            for (endpoint, count) in &snapshot.endpoint_requests {
                out.push_str(&format!(
                    "endpoint_requests_total{{endpoint=\"{}\"}} {}\n",
                    endpoint, count
                ));
            }
        }

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub classifier_calls_total: usize,
    pub classifier_calls_failed: usize,
    pub classifier_latency_avg_ms: u64,
    pub classifier_latency_p95_ms: u64,
    pub translation_calls_success: usize,
    pub translation_calls_failed: usize,
    pub translation_fallbacks: usize,
    pub translation_latency_avg_ms: u64,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_hit_rate: f64,
    pub interactions: usize,
    pub interactions_failed: usize,
    pub images_processed: usize,
    pub resets: usize,
    pub active_sessions: usize,
    pub endpoint_requests: Vec<(String, usize)>,
    pub circuit_breaker_trips: usize,
    pub uptime_seconds: u64,
}

fn push_sample(window: &RwLock<VecDeque<u64>>, duration: Duration) {
    let mut samples = window.write();
    if samples.len() == LATENCY_WINDOW {
        samples.pop_front();
    }
    samples.push_back(duration.as_millis() as u64);
}

fn percentile(values: &VecDeque<u64>, p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted: Vec<u64> = values.iter().copied().collect();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &VecDeque<u64>) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}
