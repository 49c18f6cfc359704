// Metrics registry (Prometheus-style counters and latency histogram)
// reason: dashmap sharded map so concurrent calls on different keys never contend
//
// Constructed once by the composition root and shared via `Arc`; every
// counter is an atomic, so increments need no lock beyond the map shard.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use switchboard_core::port::MetricsSink;

/// Upper bounds (seconds) of the latency histogram buckets
pub const LATENCY_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

const REQUESTS_COUNT: &str = "service_requests_count";
const REQUESTS_ALL_COUNT: &str = "service_requests_all_count";
const REQUESTS_LATENCY: &str = "service_requests_latency_seconds";

type OutcomeKey = (String, String, bool);
type MethodKey = (String, String);

#[derive(Default)]
struct Histogram {
    // cumulative: bucket i counts observations <= LATENCY_BUCKETS[i]
    buckets: [AtomicU64; 11],
    count: AtomicU64,
    sum_bits: AtomicU64,
}

impl Histogram {
    fn observe(&self, seconds: f64) {
        for (bound, bucket) in LATENCY_BUCKETS.iter().zip(&self.buckets) {
            if seconds <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.count.fetch_add(1, Ordering::Relaxed);

        // f64 add via CAS on the bit pattern
        let mut current = self.sum_bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + seconds).to_bits();
            match self.sum_bits.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    fn sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Acquire))
    }
}

/// In-process metric store implementing `MetricsSink`
#[derive(Default)]
pub struct MetricsRegistry {
    requests: DashMap<OutcomeKey, AtomicU64>,
    requests_all: DashMap<MethodKey, AtomicU64>,
    latency: DashMap<OutcomeKey, Histogram>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_count(&self, service: &str, method: &str, success: bool) -> u64 {
        self.requests
            .get(&(service.to_string(), method.to_string(), success))
            .map(|counter| counter.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn request_count_all(&self, service: &str, method: &str) -> u64 {
        self.requests_all
            .get(&(service.to_string(), method.to_string()))
            .map(|counter| counter.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Number of latency observations for the key
    pub fn latency_count(&self, service: &str, method: &str, success: bool) -> u64 {
        self.latency
            .get(&(service.to_string(), method.to_string(), success))
            .map(|histogram| histogram.count.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn latency_sum(&self, service: &str, method: &str, success: bool) -> f64 {
        self.latency
            .get(&(service.to_string(), method.to_string(), success))
            .map(|histogram| histogram.sum())
            .unwrap_or(0.0)
    }

    /// Prometheus text exposition, series sorted by label values
    pub fn render(&self) -> String {
        let mut out = String::new();

        let mut requests: Vec<(OutcomeKey, u64)> = self
            .requests
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Acquire)))
            .collect();
        requests.sort_by(|a, b| a.0.cmp(&b.0));

        let _ = writeln!(out, "# HELP {} Number of requests received", REQUESTS_COUNT);
        let _ = writeln!(out, "# TYPE {} counter", REQUESTS_COUNT);
        for ((service, method, success), value) in &requests {
            let _ = writeln!(
                out,
                "{}{{{}}} {}",
                REQUESTS_COUNT,
                outcome_labels(service, method, *success),
                value
            );
        }

        let mut all: Vec<(MethodKey, u64)> = self
            .requests_all
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Acquire)))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));

        let _ = writeln!(out, "# HELP {} Number of all requests received", REQUESTS_ALL_COUNT);
        let _ = writeln!(out, "# TYPE {} counter", REQUESTS_ALL_COUNT);
        for ((service, method), value) in &all {
            let _ = writeln!(
                out,
                "{}{{{}}} {}",
                REQUESTS_ALL_COUNT,
                method_labels(service, method),
                value
            );
        }

        let mut keys: Vec<OutcomeKey> = self.latency.iter().map(|e| e.key().clone()).collect();
        keys.sort();

        let _ = writeln!(out, "# HELP {} Duration of requests in seconds", REQUESTS_LATENCY);
        let _ = writeln!(out, "# TYPE {} histogram", REQUESTS_LATENCY);
        for key in keys {
            let Some(histogram) = self.latency.get(&key) else {
                continue;
            };
            let labels = outcome_labels(&key.0, &key.1, key.2);
            for (bound, bucket) in LATENCY_BUCKETS.iter().zip(&histogram.buckets) {
                let _ = writeln!(
                    out,
                    "{}_bucket{{{},le=\"{}\"}} {}",
                    REQUESTS_LATENCY,
                    labels,
                    bound,
                    bucket.load(Ordering::Acquire)
                );
            }
            let count = histogram.count.load(Ordering::Acquire);
            let _ = writeln!(
                out,
                "{}_bucket{{{},le=\"+Inf\"}} {}",
                REQUESTS_LATENCY, labels, count
            );
            let _ = writeln!(out, "{}_sum{{{}}} {}", REQUESTS_LATENCY, labels, histogram.sum());
            let _ = writeln!(out, "{}_count{{{}}} {}", REQUESTS_LATENCY, labels, count);
        }

        out
    }
}

impl MetricsSink for MetricsRegistry {
    fn inc_requests(&self, service: &str, method: &str, success: bool) {
        self.requests
            .entry((service.to_string(), method.to_string(), success))
            .or_default()
            .fetch_add(1, Ordering::AcqRel);
    }

    fn inc_requests_all(&self, service: &str, method: &str) {
        self.requests_all
            .entry((service.to_string(), method.to_string()))
            .or_default()
            .fetch_add(1, Ordering::AcqRel);
    }

    fn observe_latency(&self, service: &str, method: &str, success: bool, seconds: f64) {
        self.latency
            .entry((service.to_string(), method.to_string(), success))
            .or_default()
            .observe(seconds);
    }
}

fn method_labels(service: &str, method: &str) -> String {
    format!(
        "method=\"{}\",service=\"{}\"",
        escape_label(method),
        escape_label(service)
    )
}

fn outcome_labels(service: &str, method: &str, success: bool) -> String {
    format!("{},success=\"{}\"", method_labels(service, method), success)
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
