//! JSON-RPC Dispatcher
//!
//! Resolves batch items against the registered services and executes them.
//! The route table is built once at startup and is read-only afterwards.

use crate::error::{code, rpc_error, to_rpc_error};
use crate::types::{RequestEnvelope, ResponseEnvelope, ResponseId, JSONRPC_VERSION};
use futures::future::join_all;
use jsonrpsee_types::ErrorObjectOwned;
use serde_json::value::RawValue;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use switchboard_core::application::{
    decorate, CallContext, CallRequest, Instrumentation, Service, ServiceRouter,
};
use switchboard_core::domain::{DomainError, MethodDescriptor, ServiceDescriptor};
use switchboard_core::port::{Span, SpanGuard, Tracer};
use tokio::sync::Semaphore;
use tracing::{debug, error};

struct Route {
    // "service.method" as declared
    name: String,
    method: Arc<MethodDescriptor>,
    service: Arc<dyn Service>,
}

struct Inner {
    // key: lowercase "service.method"
    routes: HashMap<String, Route>,
    tracer: Arc<dyn Tracer>,
    limit: Option<Arc<Semaphore>>,
}

/// Batch dispatcher shared by every connection
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

/// Result of dispatching one request body
#[derive(Debug)]
pub enum BatchOutcome {
    /// Body was not a JSON array of request objects
    Malformed(ResponseEnvelope),
    /// One entry per non-notification item
    Completed(Vec<ResponseEnvelope>),
}

impl BatchOutcome {
    pub fn to_body(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            BatchOutcome::Malformed(response) => serde_json::to_vec(response),
            BatchOutcome::Completed(responses) => serde_json::to_vec(responses),
        }
    }
}

pub struct DispatcherBuilder {
    instrumentation: Instrumentation,
    services: HashSet<String>,
    routes: HashMap<String, Route>,
    max_concurrency: Option<usize>,
}

impl DispatcherBuilder {
    pub fn new(instrumentation: Instrumentation) -> Self {
        Self {
            instrumentation,
            services: HashSet::new(),
            routes: HashMap::new(),
            max_concurrency: None,
        }
    }

    /// Cap on batch items executing at once (`None` or `0` = unbounded)
    pub fn max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit.filter(|n| *n > 0);
        self
    }

    /// Register a core implementation, wrapped in its declared decorators
    pub fn register(
        mut self,
        descriptor: Arc<ServiceDescriptor>,
        core: Arc<dyn Service>,
    ) -> Result<Self, DomainError> {
        if !self.services.insert(descriptor.name().to_lowercase()) {
            return Err(DomainError::DuplicateService(descriptor.name().to_string()));
        }

        let service = decorate(core, &descriptor, &self.instrumentation);
        for method in descriptor.methods() {
            let name = format!("{}.{}", descriptor.name(), method.name());
            self.routes.insert(
                name.to_lowercase(),
                Route {
                    name,
                    method: method.clone(),
                    service: service.clone(),
                },
            );
        }

        debug!(
            service = %descriptor.name(),
            methods = descriptor.methods().len(),
            capabilities = ?descriptor.capabilities(),
            "registered service"
        );
        Ok(self)
    }

    pub fn register_router(self, router: ServiceRouter) -> Result<Self, DomainError> {
        let descriptor = router.descriptor().clone();
        let core = router.build()?;
        self.register(descriptor, core)
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            inner: Arc::new(Inner {
                routes: self.routes,
                tracer: self.instrumentation.tracer,
                limit: self
                    .max_concurrency
                    .map(|n| Arc::new(Semaphore::new(n))),
            }),
        }
    }
}

impl Dispatcher {
    pub fn builder(instrumentation: Instrumentation) -> DispatcherBuilder {
        DispatcherBuilder::new(instrumentation)
    }

    pub fn tracer(&self) -> &Arc<dyn Tracer> {
        &self.inner.tracer
    }

    /// Registered method names, `service.method` as declared
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .routes
            .values()
            .map(|route| route.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Execute one item under a child span of `parent`
    ///
    /// Returns `None` for notifications, whatever the outcome.
    pub async fn dispatch_single(
        &self,
        request: RequestEnvelope,
        parent: &dyn Span,
    ) -> Option<ResponseEnvelope> {
        let span = SpanGuard::new(self.inner.tracer.start_span(&request.method, Some(parent)));
        span.set_tag("batch", true);

        let RequestEnvelope {
            id,
            version,
            method,
            params,
        } = request;

        let outcome = self
            .execute(&span, &version, &method, params, id.is_none())
            .await;

        let id = id?;
        Some(match outcome {
            Ok(result) => ResponseEnvelope::success(id, result),
            Err(err) => ResponseEnvelope::failure(ResponseId::Echoed(id), err),
        })
    }

    /// Decode a batch body and execute every item concurrently
    pub async fn dispatch_batch(&self, body: &[u8], parent: &Arc<dyn Span>) -> BatchOutcome {
        let requests: Vec<RequestEnvelope> = match serde_json::from_slice(body) {
            Ok(requests) => requests,
            Err(e) => {
                debug!(error = %e, "batch body rejected");
                return BatchOutcome::Malformed(ResponseEnvelope::failure(
                    ResponseId::Placeholder,
                    rpc_error(
                        code::PARSE_ERROR,
                        format!("request body could not be decoded: {}", e),
                    ),
                ));
            }
        };

        let mut ids = Vec::with_capacity(requests.len());
        let mut units = Vec::with_capacity(requests.len());
        for request in requests {
            ids.push(request.id.clone());

            let dispatcher = self.clone();
            let parent = parent.clone();
            units.push(tokio::spawn(async move {
                let _permit = match &dispatcher.inner.limit {
                    Some(limit) => limit.clone().acquire_owned().await.ok(),
                    None => None,
                };
                dispatcher.dispatch_single(request, parent.as_ref()).await
            }));
        }

        // Barrier: slot i is owned by unit i, compacted only after all finish
        let slots = join_all(units).await;

        let responses = slots
            .into_iter()
            .zip(ids)
            .filter_map(|(slot, id)| match slot {
                Ok(response) => response,
                Err(e) => {
                    error!(error = %e, "batch item did not complete");
                    id.map(|id| {
                        ResponseEnvelope::failure(
                            ResponseId::Echoed(id),
                            rpc_error(code::INTERNAL_ERROR, "method execution aborted"),
                        )
                    })
                }
            })
            .collect();

        BatchOutcome::Completed(responses)
    }

    async fn execute(
        &self,
        span: &SpanGuard,
        version: &str,
        method: &str,
        params: Option<Box<RawValue>>,
        notification: bool,
    ) -> Result<Box<RawValue>, ErrorObjectOwned> {
        if version != JSONRPC_VERSION {
            let message = format!("incorrect protocol version: {}", version);
            span.fail(message.clone());
            return Err(rpc_error(code::INVALID_REQUEST, message));
        }

        let Some(route) = self.inner.routes.get(&method.to_lowercase()) else {
            let message = format!("invalid method '{}'", method);
            debug!(method = %method, notification, "unknown method");
            span.fail(message.clone());
            return Err(rpc_error(code::METHOD_NOT_FOUND, message));
        };

        let args = decode_params(params)
            .and_then(|params| route.method.bind(params).map_err(|e| match e {
                DomainError::InvalidParams(why) => why,
                other => other.to_string(),
            }))
            .map_err(|why| {
                let message = format!("request body could not be decoded: {}", why);
                span.fail(message.clone());
                rpc_error(code::INVALID_PARAMS, message)
            })?;

        let ctx = CallContext::new(span.span().clone(), notification);
        let value = route
            .service
            .call(ctx, CallRequest::new(route.method.clone(), args))
            .await
            .map_err(to_rpc_error)?;

        serde_json::value::to_raw_value(&value).map_err(|e| {
            let message = format!("response body could not be encoded: {}", e);
            span.fail(message.clone());
            rpc_error(code::INTERNAL_ERROR, message)
        })
    }
}

fn decode_params(params: Option<Box<RawValue>>) -> Result<Value, String> {
    match params {
        None => Ok(Value::Null),
        Some(raw) => serde_json::from_str(raw.get()).map_err(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchboard_core::application::typed;
    use switchboard_core::domain::{Capability, ValueType};
    use switchboard_core::domain::Arguments;
    use switchboard_core::port::{NoopTracer, TagValue};
    use switchboard_core::ServiceError;
    use switchboard_infra_telemetry::{MetricsRegistry, RecordingLogSink, RecordingTracer};

    struct Fixture {
        dispatcher: Dispatcher,
        tracer: RecordingTracer,
        metrics: Arc<MetricsRegistry>,
    }

    #[derive(serde::Deserialize)]
    struct SumParams {
        a: f64,
        b: f64,
    }

    fn fixture() -> Fixture {
        fixture_with_cap(None)
    }

    fn fixture_with_cap(max_concurrency: Option<usize>) -> Fixture {
        let tracer = RecordingTracer::default();
        let metrics = Arc::new(MetricsRegistry::new());
        let instrumentation = Instrumentation::new(
            Arc::new(tracer.clone()),
            metrics.clone(),
            Arc::new(RecordingLogSink::default()),
        );

        let descriptor = Arc::new(
            ServiceDescriptor::builder("Demo")
                .capabilities([Capability::Trace, Capability::Logging, Capability::Metrics])
                .method(
                    MethodDescriptor::builder("Echo")
                        .param("value", ValueType::Any)
                        .result("value", ValueType::Any)
                        .build()
                        .unwrap(),
                )
                .method(
                    MethodDescriptor::builder("Sum")
                        .param("a", ValueType::Number)
                        .param("b", ValueType::Number)
                        .build()
                        .unwrap(),
                )
                .method(MethodDescriptor::builder("Fail").build().unwrap())
                .method(MethodDescriptor::builder("Panic").build().unwrap())
                .build()
                .unwrap(),
        );

        let router = ServiceRouter::new(descriptor)
            .route("Echo", |_ctx: CallContext, args: Arguments| async move {
                Ok::<Value, ServiceError>(args.into_value())
            })
            .unwrap()
            .route(
                "Sum",
                typed(|_ctx: CallContext, p: SumParams| async move {
                    Ok::<f64, ServiceError>(p.a + p.b)
                }),
            )
            .unwrap()
            .route("Fail", |_ctx: CallContext, _args: Arguments| async move {
                Err::<Value, ServiceError>(ServiceError::failed("boom"))
            })
            .unwrap()
            .route("Panic", |_ctx: CallContext, _args: Arguments| async move {
                if true {
                    panic!("handler panicked");
                }
                Ok::<Value, ServiceError>(Value::Null)
            })
            .unwrap();

        let dispatcher = Dispatcher::builder(instrumentation)
            .max_concurrency(max_concurrency)
            .register_router(router)
            .unwrap()
            .build();

        Fixture {
            dispatcher,
            tracer,
            metrics,
        }
    }

    fn root() -> Arc<dyn Span> {
        NoopTracer.start_span("root", None)
    }

    async fn run(dispatcher: &Dispatcher, body: Value) -> Value {
        let outcome = dispatcher
            .dispatch_batch(body.to_string().as_bytes(), &root())
            .await;
        serde_json::from_slice(&outcome.to_body().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_echo_batch_with_notification() {
        let f = fixture();
        let out = run(
            &f.dispatcher,
            json!([
                {"id": "1", "jsonrpc": "2.0", "method": "Demo.Echo", "params": {"value": "x"}},
                {"jsonrpc": "2.0", "method": "Demo.Echo", "params": {"value": "y"}}
            ]),
        )
        .await;

        assert_eq!(
            out,
            json!([{"id": "1", "jsonrpc": "2.0", "result": {"value": "x"}}])
        );
        // the notification still ran
        assert_eq!(f.metrics.request_count_all("Demo", "Echo"), 2);
    }

    #[tokio::test]
    async fn test_unknown_method_message_keeps_caller_spelling() {
        let f = fixture();
        let out = run(
            &f.dispatcher,
            json!([{"id": 9, "jsonrpc": "2.0", "method": "Demo.Nope"}]),
        )
        .await;

        assert_eq!(out[0]["id"], json!(9));
        assert_eq!(out[0]["error"]["code"], json!(-32601));
        assert_eq!(out[0]["error"]["message"], json!("invalid method 'Demo.Nope'"));
    }

    #[tokio::test]
    async fn test_method_lookup_is_case_insensitive() {
        let f = fixture();
        let out = run(
            &f.dispatcher,
            json!([{"id": 1, "jsonrpc": "2.0", "method": "demo.SUM", "params": [2, 3]}]),
        )
        .await;

        assert_eq!(out[0]["result"], json!(5.0));
    }

    #[tokio::test]
    async fn test_malformed_body_yields_single_parse_error() {
        let f = fixture();
        for body in [&b"{not json"[..], b"{\"id\":1}", b"[1, 2]"] {
            let outcome = f.dispatcher.dispatch_batch(body, &root()).await;
            let out: Value = serde_json::from_slice(&outcome.to_body().unwrap()).unwrap();

            assert!(out.is_object());
            assert_eq!(out["id"], json!("0"));
            assert_eq!(out["error"]["code"], json!(-32700));
            assert!(out["error"]["message"]
                .as_str()
                .unwrap()
                .starts_with("request body could not be decoded: "));
        }
        assert_eq!(f.metrics.request_count_all("Demo", "Echo"), 0);
    }

    #[tokio::test]
    async fn test_all_notifications_yield_empty_array() {
        let f = fixture();
        let out = run(
            &f.dispatcher,
            json!([
                {"jsonrpc": "2.0", "method": "Demo.Fail"},
                {"jsonrpc": "2.0", "method": "Demo.Nope"}
            ]),
        )
        .await;

        assert_eq!(out, json!([]));
        // failure observed, never surfaced
        assert_eq!(f.metrics.request_count("Demo", "Fail", false), 1);
    }

    #[tokio::test]
    async fn test_null_id_is_answered() {
        let f = fixture();
        let out = run(
            &f.dispatcher,
            json!([{"id": null, "jsonrpc": "2.0", "method": "Demo.Fail"}]),
        )
        .await;

        assert_eq!(out.as_array().unwrap().len(), 1);
        assert_eq!(out[0]["id"], Value::Null);
        assert_eq!(out[0]["error"]["code"], json!(-32603));
        assert_eq!(out[0]["error"]["message"], json!("boom"));
    }

    #[tokio::test]
    async fn test_wrong_version_is_invalid_request() {
        let f = fixture();
        let out = run(
            &f.dispatcher,
            json!([{"id": 1, "jsonrpc": "1.0", "method": "Demo.Echo", "params": {"value": 1}}]),
        )
        .await;

        assert_eq!(out[0]["error"]["code"], json!(-32600));
        assert_eq!(
            out[0]["error"]["message"],
            json!("incorrect protocol version: 1.0")
        );
        assert_eq!(f.metrics.request_count_all("Demo", "Echo"), 0);
    }

    #[tokio::test]
    async fn test_bad_params_are_invalid_params() {
        let f = fixture();
        let out = run(
            &f.dispatcher,
            json!([
                {"id": 1, "jsonrpc": "2.0", "method": "Demo.Sum", "params": {"a": 1}},
                {"id": 2, "jsonrpc": "2.0", "method": "Demo.Sum", "params": {"a": "x", "b": 2}}
            ]),
        )
        .await;

        assert_eq!(out[0]["error"]["code"], json!(-32602));
        assert_eq!(
            out[0]["error"]["message"],
            json!("request body could not be decoded: missing parameter 'b'")
        );
        assert_eq!(out[1]["error"]["code"], json!(-32602));
        // rejected before the decorator chain
        assert_eq!(f.metrics.request_count_all("Demo", "Sum"), 0);
    }

    #[tokio::test]
    async fn test_responses_follow_input_order() {
        let f = fixture();
        let items: Vec<Value> = (0..20)
            .map(|i| json!({"id": i, "jsonrpc": "2.0", "method": "Demo.Sum", "params": [i, 1]}))
            .collect();
        let out = run(&f.dispatcher, Value::Array(items)).await;

        let ids: Vec<i64> = out
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_panicking_item_resolves_to_internal_error() {
        let f = fixture();
        let out = run(
            &f.dispatcher,
            json!([
                {"id": 1, "jsonrpc": "2.0", "method": "Demo.Panic"},
                {"jsonrpc": "2.0", "method": "Demo.Panic"},
                {"id": 2, "jsonrpc": "2.0", "method": "Demo.Echo", "params": {"value": 1}}
            ]),
        )
        .await;

        let entries = out.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["id"], json!(1));
        assert_eq!(entries[0]["error"]["code"], json!(-32603));
        assert_eq!(entries[1]["result"], json!({"value": 1}));
        // metrics guard still fired while unwinding
        assert_eq!(f.metrics.request_count("Demo", "Panic", false), 2);
    }

    #[tokio::test]
    async fn test_items_get_child_spans_tagged_batch() {
        let f = fixture();
        let root = f.tracer.start_span("jsonRPC:/", None);
        let body = json!([
            {"id": 1, "jsonrpc": "2.0", "method": "Demo.Echo", "params": {"value": 1}},
            {"id": 2, "jsonrpc": "2.0", "method": "Demo.Fail"}
        ]);
        let _ = f
            .dispatcher
            .dispatch_batch(body.to_string().as_bytes(), &root)
            .await;

        let root_id = f.tracer.spans_named("jsonRPC:/")[0].id;
        let echo = &f.tracer.spans_named("Demo.Echo")[0];
        assert_eq!(echo.parent, Some(root_id));
        assert_eq!(echo.tag("batch"), Some(&TagValue::Bool(true)));
        assert_eq!(echo.tag("method"), Some(&TagValue::Str("Echo".into())));
        assert!(echo.is_finished());
        assert!(!echo.error);

        let fail = &f.tracer.spans_named("Demo.Fail")[0];
        assert!(fail.error);
        assert_eq!(fail.tag("msg"), Some(&TagValue::Str("boom".into())));
    }

    #[tokio::test]
    async fn test_concurrency_cap_still_completes_batch() {
        let f = fixture_with_cap(Some(2));
        let items: Vec<Value> = (0..16)
            .map(|i| json!({"id": i, "jsonrpc": "2.0", "method": "Demo.Echo", "params": {"value": i}}))
            .collect();
        let out = run(&f.dispatcher, Value::Array(items)).await;

        assert_eq!(out.as_array().unwrap().len(), 16);
        assert_eq!(out[15]["result"], json!({"value": 15}));
        assert_eq!(f.metrics.request_count("Demo", "Echo", true), 16);
    }

    #[test]
    fn test_methods_lists_qualified_names() {
        let f = fixture();
        assert_eq!(
            f.dispatcher.methods(),
            vec!["Demo.Echo", "Demo.Fail", "Demo.Panic", "Demo.Sum"]
        );
    }

    #[test]
    fn test_duplicate_service_rejected() {
        let instrumentation = Instrumentation::new(
            Arc::new(NoopTracer),
            Arc::new(MetricsRegistry::new()),
            Arc::new(RecordingLogSink::default()),
        );
        let descriptor = Arc::new(ServiceDescriptor::builder("Demo").build().unwrap());
        let core = ServiceRouter::new(descriptor.clone()).build().unwrap();

        let result = Dispatcher::builder(instrumentation)
            .register(descriptor.clone(), core.clone())
            .unwrap()
            .register(
                Arc::new(ServiceDescriptor::builder("demo").build().unwrap()),
                core,
            );
        assert!(matches!(result, Err(DomainError::DuplicateService(_))));
    }
}
