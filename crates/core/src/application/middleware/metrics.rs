// Metrics layer: request counters and latency, recorded once per call
//
// The observation lives in a drop guard so it fires on every exit path,
// including a caller dropping the call future mid-flight (counted as failure).

use crate::application::service::{CallContext, CallRequest, Service};
use crate::error::ServiceError;
use crate::port::MetricsSink;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

pub struct MetricsMiddleware {
    service: String,
    sink: Arc<dyn MetricsSink>,
    next: Arc<dyn Service>,
}

impl MetricsMiddleware {
    pub fn new(
        service: impl Into<String>,
        sink: Arc<dyn MetricsSink>,
        next: Arc<dyn Service>,
    ) -> Self {
        Self {
            service: service.into(),
            sink,
            next,
        }
    }
}

struct Observation<'a> {
    sink: &'a dyn MetricsSink,
    service: &'a str,
    method: &'a str,
    begin: Instant,
    success: bool,
}

impl Drop for Observation<'_> {
    fn drop(&mut self) {
        let elapsed = self.begin.elapsed().as_secs_f64();
        self.sink
            .inc_requests(self.service, self.method, self.success);
        self.sink.inc_requests_all(self.service, self.method);
        self.sink
            .observe_latency(self.service, self.method, self.success, elapsed);
    }
}

#[async_trait]
impl Service for MetricsMiddleware {
    async fn call(&self, ctx: CallContext, request: CallRequest) -> Result<Value, ServiceError> {
        let method = request.method().clone();
        let mut observation = Observation {
            sink: self.sink.as_ref(),
            service: &self.service,
            method: method.name(),
            begin: Instant::now(),
            success: false,
        };

        let result = self.next.call(ctx, request).await;
        observation.success = result.is_ok();
        result
    }
}
