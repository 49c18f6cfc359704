// Recording adapters (in-memory)
//
// Keep every span and call record so tests and embedders can assert on
// exactly what the middleware and dispatcher emitted.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use switchboard_core::port::{
    CallRecord, Extractor, Injector, LogSink, Span, TagValue, Tracer,
};

/// W3C trace-context header
pub const TRACEPARENT: &str = "traceparent";

/// Snapshot of a recorded span
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedSpan {
    pub id: u64,
    pub parent: Option<u64>,
    /// 32 hex chars, shared by every span of one trace
    pub trace_id: String,
    /// Span id of the caller, when the trace came in over the wire
    pub remote_parent: Option<String>,
    pub operation: String,
    pub tags: BTreeMap<String, TagValue>,
    pub error: bool,
    pub finish_count: u32,
}

impl RecordedSpan {
    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }

    pub fn is_finished(&self) -> bool {
        self.finish_count > 0
    }

    pub fn span_id(&self) -> String {
        format!("{:016x}", self.id)
    }

    pub fn traceparent(&self) -> String {
        format!("00-{}-{}-01", self.trace_id, self.span_id())
    }
}

/// `(trace_id, parent_span_id)` of a version-00 traceparent value
fn parse_traceparent(value: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = value.trim().split('-').collect();
    let [version, trace_id, span_id, flags] = parts.as_slice() else {
        return None;
    };
    if *version != "00" || !is_hex(trace_id, 32) || !is_hex(span_id, 16) || !is_hex(flags, 2) {
        return None;
    }
    Some((trace_id.to_ascii_lowercase(), span_id.to_ascii_lowercase()))
}

fn is_hex(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| c.is_ascii_hexdigit())
}

struct RecordingSpan {
    state: Mutex<RecordedSpan>,
}

impl RecordingSpan {
    fn with_state<T>(&self, f: impl FnOnce(&mut RecordedSpan) -> T) -> T {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Span for RecordingSpan {
    fn set_tag(&self, key: &str, value: TagValue) {
        self.with_state(|s| {
            s.tags.insert(key.to_string(), value);
        });
    }

    fn set_error(&self) {
        self.with_state(|s| s.error = true);
    }

    fn finish(&self) {
        self.with_state(|s| s.finish_count += 1);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Tracer that retains every span it starts
#[derive(Clone, Default)]
pub struct RecordingTracer {
    spans: Arc<Mutex<Vec<Arc<RecordingSpan>>>>,
    next_id: Arc<AtomicU64>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all spans, in start order
    pub fn spans(&self) -> Vec<RecordedSpan> {
        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|span| span.with_state(|s| s.clone()))
            .collect()
    }

    pub fn spans_named(&self, operation: &str) -> Vec<RecordedSpan> {
        self.spans()
            .into_iter()
            .filter(|span| span.operation == operation)
            .collect()
    }
}

impl RecordingTracer {
    fn record(
        &self,
        operation: &str,
        parent: Option<u64>,
        trace_id: Option<String>,
        remote_parent: Option<String>,
    ) -> Arc<dyn Span> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let span = Arc::new(RecordingSpan {
            state: Mutex::new(RecordedSpan {
                id,
                parent,
                trace_id: trace_id.unwrap_or_else(|| format!("{:032x}", id)),
                remote_parent,
                operation: operation.to_string(),
                tags: BTreeMap::new(),
                error: false,
                finish_count: 0,
            }),
        });

        self.spans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(span.clone());
        span
    }
}

impl Tracer for RecordingTracer {
    fn start_span(&self, operation: &str, parent: Option<&dyn Span>) -> Arc<dyn Span> {
        let parent = parent
            .and_then(|p| p.as_any().downcast_ref::<RecordingSpan>())
            .map(|p| p.with_state(|s| (s.id, s.trace_id.clone())));

        match parent {
            Some((id, trace_id)) => self.record(operation, Some(id), Some(trace_id), None),
            None => self.record(operation, None, None, None),
        }
    }

    fn start_span_from(&self, operation: &str, carrier: &dyn Extractor) -> Arc<dyn Span> {
        match carrier.get(TRACEPARENT).and_then(parse_traceparent) {
            Some((trace_id, remote)) => {
                self.record(operation, None, Some(trace_id), Some(remote))
            }
            None => self.record(operation, None, None, None),
        }
    }

    fn inject(&self, span: &dyn Span, carrier: &mut dyn Injector) {
        if let Some(span) = span.as_any().downcast_ref::<RecordingSpan>() {
            carrier.set(TRACEPARENT, span.with_state(|s| s.traceparent()));
        }
    }
}

/// Log sink that retains every record
#[derive(Clone, Default)]
pub struct RecordingLogSink {
    records: Arc<Mutex<Vec<CallRecord>>>,
}

impl RecordingLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CallRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LogSink for RecordingLogSink {
    fn emit(&self, record: &CallRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}
