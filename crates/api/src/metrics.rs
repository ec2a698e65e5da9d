use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    failed_requests: AtomicUsize,

    // Timing (in microseconds)
    total_convert_time_us: AtomicU64,
    total_extract_time_us: AtomicU64,
    total_render_time_us: AtomicU64,

    // Counts
    captures_converted: AtomicUsize,
    extractions: AtomicUsize,
    graphs_rendered: AtomicUsize,
    triples_accepted: AtomicUsize,
    triples_skipped: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_convert(&self, duration: Duration) {
        self.total_convert_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.captures_converted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_extract(&self, duration: Duration, accepted: usize, skipped: usize) {
        self.total_extract_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.extractions.fetch_add(1, Ordering::Relaxed);
        self.triples_accepted.fetch_add(accepted, Ordering::Relaxed);
        self.triples_skipped.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn record_render(&self, duration: Duration) {
        self.total_render_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.graphs_rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            avg_convert_time_ms: avg_time_ms(&self.total_convert_time_us, &self.captures_converted),
            avg_extract_time_ms: avg_time_ms(&self.total_extract_time_us, &self.extractions),
            avg_render_time_ms: avg_time_ms(&self.total_render_time_us, &self.graphs_rendered),
            captures_converted: self.captures_converted.load(Ordering::Relaxed),
            graphs_rendered: self.graphs_rendered.load(Ordering::Relaxed),
            triples_accepted: self.triples_accepted.load(Ordering::Relaxed),
            triples_skipped: self.triples_skipped.load(Ordering::Relaxed),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    let cnt = count.load(Ordering::Relaxed) as f64;
    if cnt > 0.0 {
        total / cnt / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub avg_convert_time_ms: f64,
    pub avg_extract_time_ms: f64,
    pub avg_render_time_ms: f64,
    pub captures_converted: usize,
    pub graphs_rendered: usize,
    pub triples_accepted: usize,
    pub triples_skipped: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
