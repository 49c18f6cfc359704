// Middleware Decorator Chain
//
// Fixed composition, outermost to innermost:
//   trace -> logging -> metrics -> core implementation
// Each layer observes the call and forwards the outcome of `next` unchanged.

pub mod logging;
pub mod metrics;
pub mod trace;


use crate::application::service::Service;
use crate::domain::{Capability, ServiceDescriptor};
use crate::port::{LogSink, MetricsSink, Tracer};
use std::sync::Arc;

pub use logging::LoggingMiddleware;
pub use metrics::MetricsMiddleware;
pub use trace::TraceMiddleware;

/// Wrapper constructor: takes the inner layer, returns the decorated one
pub type Middleware = Box<dyn FnOnce(Arc<dyn Service>) -> Arc<dyn Service> + Send>;

/// Process-wide instrumentation sinks
///
/// Constructed once at startup and handed to the dispatcher and every
/// decorator; never re-initialised.
#[derive(Clone)]
pub struct Instrumentation {
    pub tracer: Arc<dyn Tracer>,
    pub metrics: Arc<dyn MetricsSink>,
    pub logs: Arc<dyn LogSink>,
}

impl Instrumentation {
    pub fn new(
        tracer: Arc<dyn Tracer>,
        metrics: Arc<dyn MetricsSink>,
        logs: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            tracer,
            metrics,
            logs,
        }
    }
}

/// Wrapper constructors for the declared capabilities, innermost first
pub fn middlewares(
    descriptor: &ServiceDescriptor,
    instrumentation: &Instrumentation,
) -> Vec<Middleware> {
    let mut layers: Vec<Middleware> = Vec::with_capacity(3);

    if descriptor.has(Capability::Metrics) {
        let service = descriptor.name().to_string();
        let sink = instrumentation.metrics.clone();
        layers.push(Box::new(move |next: Arc<dyn Service>| -> Arc<dyn Service> {
            Arc::new(MetricsMiddleware::new(service, sink, next))
        }));
    }

    if descriptor.has(Capability::Logging) {
        let service = descriptor.name().to_string();
        let sink = instrumentation.logs.clone();
        layers.push(Box::new(move |next: Arc<dyn Service>| -> Arc<dyn Service> {
            Arc::new(LoggingMiddleware::new(service, sink, next))
        }));
    }

    if descriptor.has(Capability::Trace) {
        layers.push(Box::new(|next: Arc<dyn Service>| -> Arc<dyn Service> {
            Arc::new(TraceMiddleware::new(next))
        }));
    }

    layers
}

/// Fold the core implementation through the declared layers
pub fn decorate(
    core: Arc<dyn Service>,
    descriptor: &ServiceDescriptor,
    instrumentation: &Instrumentation,
) -> Arc<dyn Service> {
    middlewares(descriptor, instrumentation)
        .into_iter()
        .fold(core, |next, wrap| wrap(next))
}
