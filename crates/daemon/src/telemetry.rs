//! Telemetry setup for OpenTelemetry integration
//!
//! Spans opened by the tracing tracer are exported over OTLP when the
//! daemon is built with the `telemetry` feature and an endpoint is set.
//! W3C `traceparent` headers are then continued on inbound requests and
//! written back on replies.

use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Outcome of telemetry setup, reported once logging is up
#[derive(Debug)]
pub enum TelemetryStatus {
    /// `OTEL_EXPORTER_OTLP_ENDPOINT` not set
    Disabled,
    Enabled {
        service_name: String,
        endpoint: String,
    },
    /// Endpoint set but built without the `telemetry` feature
    FeatureMissing,
    Failed(String),
}

impl TelemetryStatus {
    pub fn report(&self) {
        match self {
            TelemetryStatus::Disabled => {
                tracing::debug!("OpenTelemetry not configured (OTEL_EXPORTER_OTLP_ENDPOINT not set)")
            }
            TelemetryStatus::Enabled {
                service_name,
                endpoint,
            } => tracing::info!(
                service_name = %service_name,
                endpoint = %endpoint,
                "OpenTelemetry initialized"
            ),
            TelemetryStatus::FeatureMissing => {
                tracing::warn!("OpenTelemetry endpoint set but feature 'telemetry' not enabled");
                tracing::warn!("Rebuild with: cargo build --features telemetry");
            }
            TelemetryStatus::Failed(e) => {
                tracing::warn!(error = %e, "Failed to initialize OpenTelemetry (continuing without it)")
            }
        }
    }
}

/// OTLP export layer, if configured
///
/// # Environment Variables
///
/// - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (e.g., http://localhost:4317)
/// - `OTEL_SERVICE_NAME`: Service name (default: switchboard)
///
/// # Example
///
/// ```text
/// OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 \
/// OTEL_SERVICE_NAME=switchboard-dev \
///     ./switchboard
/// ```
pub fn layer<S>() -> (Option<BoxedLayer<S>>, TelemetryStatus)
where
    S: Subscriber + for<'span> LookupSpan<'span> + Send + Sync,
{
    let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
        return (None, TelemetryStatus::Disabled);
    };

    build(endpoint)
}

#[cfg(not(feature = "telemetry"))]
fn build<S>(_endpoint: String) -> (Option<BoxedLayer<S>>, TelemetryStatus)
where
    S: Subscriber + for<'span> LookupSpan<'span> + Send + Sync,
{
    (None, TelemetryStatus::FeatureMissing)
}

#[cfg(feature = "telemetry")]
fn build<S>(endpoint: String) -> (Option<BoxedLayer<S>>, TelemetryStatus)
where
    S: Subscriber + for<'span> LookupSpan<'span> + Send + Sync,
{
    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "switchboard".to_string());
    match otlp_layer(&service_name, &endpoint) {
        Ok(layer) => (
            Some(layer),
            TelemetryStatus::Enabled {
                service_name,
                endpoint,
            },
        ),
        Err(e) => (None, TelemetryStatus::Failed(e.to_string())),
    }
}

#[cfg(feature = "telemetry")]
fn otlp_layer<S>(service_name: &str, endpoint: &str) -> anyhow::Result<BoxedLayer<S>>
where
    S: Subscriber + for<'span> LookupSpan<'span> + Send + Sync,
{
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .build();
    let tracer = provider.tracer(service_name.to_string());
    opentelemetry::global::set_tracer_provider(provider);
    opentelemetry::global::set_text_map_propagator(
        opentelemetry_sdk::propagation::TraceContextPropagator::new(),
    );

    Ok(Box::new(tracing_opentelemetry::layer().with_tracer(tracer)))
}
