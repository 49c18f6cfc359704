// Tracer adapter backed by `tracing` spans
//
// Spans land in whatever subscriber the process installed; with the
// daemon's `telemetry` feature that includes the OpenTelemetry exporter.
// `tracing` fields are declared up front, so only the tags listed in the
// span macro below are kept; others are ignored.
//
// Trace-context propagation goes through the global OpenTelemetry propagator
// when built with the `otel` feature; without it remote context is ignored.

use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use switchboard_core::port::{Extractor, Injector, Span, TagValue, Tracer};
use tracing::field::Empty;

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTracer;

impl TracingTracer {
    pub fn new() -> Self {
        Self
    }
}

pub struct TracingSpan {
    // None once finished
    inner: Mutex<Option<tracing::Span>>,
}

impl TracingSpan {
    fn id(&self) -> Option<tracing::Id> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(tracing::Span::id)
    }

    fn with_span(&self, f: impl FnOnce(&tracing::Span)) {
        if let Some(span) = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            f(span);
        }
    }
}

impl Span for TracingSpan {
    fn set_tag(&self, key: &str, value: TagValue) {
        self.with_span(|span| match &value {
            TagValue::Str(s) => {
                span.record(key, s.as_str());
            }
            TagValue::Bool(b) => {
                span.record(key, *b);
            }
            TagValue::Int(i) => {
                span.record(key, *i);
            }
        });
    }

    fn set_error(&self) {
        self.with_span(|span| {
            span.record("error", true);
            span.record("otel.status_code", "ERROR");
        });
    }

    fn finish(&self) {
        // dropping the last handle closes the tracing span
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Tracer for TracingTracer {
    fn start_span(&self, operation: &str, parent: Option<&dyn Span>) -> Arc<dyn Span> {
        let parent_id = parent
            .and_then(|p| p.as_any().downcast_ref::<TracingSpan>())
            .and_then(TracingSpan::id);

        let span = tracing::info_span!(
            target: "switchboard::rpc",
            parent: parent_id,
            "rpc",
            otel.name = %operation,
            otel.status_code = Empty,
            method = Empty,
            batch = Empty,
            error = Empty,
            msg = Empty,
            http.method = Empty,
        );

        Arc::new(TracingSpan {
            inner: Mutex::new(Some(span)),
        })
    }

    fn start_span_from(&self, operation: &str, carrier: &dyn Extractor) -> Arc<dyn Span> {
        let span = self.start_span(operation, None);
        #[cfg(feature = "otel")]
        if let Some(traced) = span.as_any().downcast_ref::<TracingSpan>() {
            traced.with_span(|s| propagation::set_parent(s, carrier));
        }
        #[cfg(not(feature = "otel"))]
        let _ = carrier;
        span
    }

    fn inject(&self, span: &dyn Span, carrier: &mut dyn Injector) {
        #[cfg(feature = "otel")]
        if let Some(traced) = span.as_any().downcast_ref::<TracingSpan>() {
            traced.with_span(|s| propagation::inject(s, carrier));
        }
        #[cfg(not(feature = "otel"))]
        let _ = (span, carrier);
    }
}

#[cfg(feature = "otel")]
mod propagation {
    use opentelemetry::global;
    use opentelemetry::propagation::{self as otel, TextMapPropagator as _};
    use switchboard_core::port::{Extractor, Injector};
    use tracing_opentelemetry::OpenTelemetrySpanExt;

    struct ExtractorAdapter<'a>(&'a dyn Extractor);

    impl otel::Extractor for ExtractorAdapter<'_> {
        fn get(&self, key: &str) -> Option<&str> {
            self.0.get(key)
        }

        fn keys(&self) -> Vec<&str> {
            self.0.keys()
        }
    }

    struct InjectorAdapter<'a>(&'a mut dyn Injector);

    impl otel::Injector for InjectorAdapter<'_> {
        fn set(&mut self, key: &str, value: String) {
            self.0.set(key, value);
        }
    }

    pub(super) fn set_parent(span: &tracing::Span, carrier: &dyn Extractor) {
        let parent = global::get_text_map_propagator(|propagator| {
            propagator.extract(&ExtractorAdapter(carrier))
        });
        span.set_parent(parent);
    }

    pub(super) fn inject(span: &tracing::Span, carrier: &mut dyn Injector) {
        let context = span.context();
        global::get_text_map_propagator(|propagator| {
            propagator.inject_context(&context, &mut InjectorAdapter(carrier))
        });
    }
}
