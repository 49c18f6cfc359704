// Tracer Port
//
// Span start / tag / finish interface. Spans are shared (`Arc`) between the
// dispatcher that opens them and the trace middleware that tags them, so all
// span methods take `&self`.

use std::any::Any;
use std::sync::Arc;

/// Tag value attached to a span
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Str(String),
    Bool(bool),
    Int(i64),
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Str(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Str(value)
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Bool(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Int(value)
    }
}

/// One unit of traced work
pub trait Span: Send + Sync {
    fn set_tag(&self, key: &str, value: TagValue);

    /// Mark the span as failed
    fn set_error(&self);

    /// Close the span. Callers go through `SpanGuard`, which calls this once.
    fn finish(&self);

    /// Lets a tracer recognise its own parent spans
    fn as_any(&self) -> &dyn Any;
}

/// Read side of a trace-context carrier (inbound request headers)
pub trait Extractor {
    fn get(&self, key: &str) -> Option<&str>;
    fn keys(&self) -> Vec<&str>;
}

/// Write side of a trace-context carrier (outbound reply headers)
pub trait Injector {
    fn set(&mut self, key: &str, value: String);
}

/// Span factory (process-wide, concurrent)
pub trait Tracer: Send + Sync {
    fn start_span(&self, operation: &str, parent: Option<&dyn Span>) -> Arc<dyn Span>;

    /// Start a root span continuing the remote trace found in `carrier`.
    /// Tracers without propagation start a fresh root.
    fn start_span_from(&self, operation: &str, carrier: &dyn Extractor) -> Arc<dyn Span> {
        let _ = carrier;
        self.start_span(operation, None)
    }

    /// Write the context of `span` into `carrier`
    fn inject(&self, span: &dyn Span, carrier: &mut dyn Injector) {
        let _ = (span, carrier);
    }
}

/// Finishes the wrapped span exactly once, on every exit path
pub struct SpanGuard {
    span: Arc<dyn Span>,
}

impl SpanGuard {
    pub fn new(span: Arc<dyn Span>) -> Self {
        Self { span }
    }

    pub fn span(&self) -> &Arc<dyn Span> {
        &self.span
    }

    pub fn set_tag(&self, key: &str, value: impl Into<TagValue>) {
        self.span.set_tag(key, value.into());
    }

    /// Mark errored and record the reason under `msg`
    pub fn fail(&self, message: impl Into<String>) {
        self.span.set_error();
        self.span.set_tag("msg", TagValue::Str(message.into()));
    }
}

impl Drop for SpanGuard {
    fn drop(&mut self) {
        self.span.finish();
    }
}

/// Tracer that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

struct NoopSpan;

impl Span for NoopSpan {
    fn set_tag(&self, _key: &str, _value: TagValue) {}
    fn set_error(&self) {}
    fn finish(&self) {}
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Tracer for NoopTracer {
    fn start_span(&self, _operation: &str, _parent: Option<&dyn Span>) -> Arc<dyn Span> {
        Arc::new(NoopSpan)
    }
}
