// Switchboard Infrastructure - Telemetry Adapters
// Implements: MetricsSink, Tracer, LogSink (ADR-001)

pub mod metrics_registry;
pub mod recording;
pub mod tracing_log_sink;
pub mod tracing_tracer;

pub use metrics_registry::MetricsRegistry;
pub use recording::{RecordedSpan, RecordingLogSink, RecordingTracer, TRACEPARENT};
pub use tracing_log_sink::TracingLogSink;
pub use tracing_tracer::TracingTracer;
