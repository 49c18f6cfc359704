// Port Layer - Instrumentation sinks injected into the middleware chain

pub mod log_sink;
pub mod metrics_sink;
pub mod tracer;

// Re-exports
pub use log_sink::{CallRecord, LogSink};
pub use metrics_sink::MetricsSink;
pub use tracer::{Extractor, Injector, NoopTracer, Span, SpanGuard, TagValue, Tracer};
