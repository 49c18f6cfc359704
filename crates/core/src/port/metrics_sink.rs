// Metrics Sink Port
//
// Counter and latency observations keyed by (service, method[, success]).
// Implementations are shared by every concurrent call and must tolerate
// concurrent increments without external locking.

pub trait MetricsSink: Send + Sync {
    /// Per-(service, method, success) request counter
    fn inc_requests(&self, service: &str, method: &str, success: bool);

    /// Per-(service, method) total counter
    fn inc_requests_all(&self, service: &str, method: &str);

    /// Per-(service, method, success) latency distribution
    fn observe_latency(&self, service: &str, method: &str, success: bool, seconds: f64);
}
