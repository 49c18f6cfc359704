// Logging layer: one structured record per call, emitted on every exit path

use crate::application::service::{CallContext, CallRequest, Service};
use crate::error::ServiceError;
use crate::port::{CallRecord, LogSink};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

pub struct LoggingMiddleware {
    service: String,
    sink: Arc<dyn LogSink>,
    next: Arc<dyn Service>,
}

impl LoggingMiddleware {
    pub fn new(service: impl Into<String>, sink: Arc<dyn LogSink>, next: Arc<dyn Service>) -> Self {
        Self {
            service: service.into(),
            sink,
            next,
        }
    }
}

const ABORTED: &str = "call aborted before completion";

/// Emits the call record when dropped, so a call that never reaches an
/// outcome (panic, dropped future) is still logged, as a failure
struct PendingRecord<'a> {
    sink: &'a dyn LogSink,
    service: &'a str,
    method: &'a str,
    begin: Instant,
    request: String,
    /// `Ok(rendered response)` or `Err(message)`; unset until the call returns
    outcome: Option<Result<Option<String>, String>>,
}

impl Drop for PendingRecord<'_> {
    fn drop(&mut self) {
        let (response, error) = match self.outcome.take() {
            Some(Ok(response)) => (response, None),
            Some(Err(error)) => (None, Some(error)),
            None => (None, Some(ABORTED.to_string())),
        };
        self.sink.emit(&CallRecord {
            service: self.service.to_string(),
            method: self.method.to_string(),
            took: self.begin.elapsed(),
            request: Some(std::mem::take(&mut self.request)),
            response,
            error,
        });
    }
}

#[async_trait]
impl Service for LoggingMiddleware {
    async fn call(&self, ctx: CallContext, request: CallRequest) -> Result<Value, ServiceError> {
        let method = request.method().clone();
        let mut record = PendingRecord {
            sink: self.sink.as_ref(),
            service: &self.service,
            method: method.name(),
            begin: Instant::now(),
            // rendered up front: the arguments move into `next`
            request: request.args().render(method.skip_log_fields()),
            outcome: None,
        };

        let result = self.next.call(ctx, request).await;

        record.outcome = Some(match &result {
            Ok(value) if !method.skips_response() => Ok(Some(value.to_string())),
            Ok(_) => Ok(None),
            Err(e) => Err(e.to_string()),
        });
        result
    }
}
