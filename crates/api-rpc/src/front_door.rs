//! Transport Front Door
//!
//! Verb check, before/after hooks and batch dispatch for one inbound
//! request. Independent of the listener: requests and replies are plain
//! `http` types with an in-memory body.

use crate::dispatcher::{BatchOutcome, Dispatcher};
use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use std::sync::Arc;
use switchboard_core::port::{Extractor, Injector, SpanGuard, Tracer};
use tracing::{debug, error};

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

const METHOD_NOT_ALLOWED: &str = "only POST method supported";

/// Inbound request as seen by hooks and the dispatcher
#[derive(Debug, Clone)]
pub struct InboundRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Bytes,
}

impl InboundRequest {
    pub fn new(method: Method, path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Reply to be written by the listener
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl HttpReply {
    pub fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn json(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self::empty(status)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON))
            .with_body(body)
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::empty(status)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_TEXT))
            .with_body(body.into())
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Bytes) {
        (self.status, self.headers, self.body)
    }
}

/// Trace context read from request headers
struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// Trace context written to reply headers
struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                self.0.insert(name, value);
            }
            _ => debug!(key, "dropping trace header that is not a valid HTTP header"),
        }
    }
}

/// State shared by the hooks of one inbound request
pub struct HookContext<'a> {
    request: &'a InboundRequest,
    cancelled: bool,
    reply: Option<HttpReply>,
    response_headers: HeaderMap,
}

impl<'a> HookContext<'a> {
    fn new(request: &'a InboundRequest) -> Self {
        Self {
            request,
            cancelled: false,
            reply: None,
            response_headers: HeaderMap::new(),
        }
    }

    pub fn request(&self) -> &InboundRequest {
        self.request
    }

    /// Abort: dispatch is skipped and nothing is written by the front door
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Abort with the hook's own reply
    pub fn cancel_with(&mut self, reply: HttpReply) {
        self.cancelled = true;
        self.reply = Some(reply);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Headers added to whatever reply is finally written
    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    fn finish(self, reply: HttpReply) -> HttpReply {
        let (status, mut headers, body) = reply.into_parts();
        for (name, value) in self.response_headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
        HttpReply {
            status,
            headers,
            body,
        }
    }
}

/// Callable run before or after dispatch
pub trait RequestHook: Send + Sync {
    fn run(&self, ctx: &mut HookContext<'_>);
}

/// Closure adapter for `RequestHook`
pub struct HookFn<F>(F);

impl<F> RequestHook for HookFn<F>
where
    F: Fn(&mut HookContext<'_>) + Send + Sync,
{
    fn run(&self, ctx: &mut HookContext<'_>) {
        (self.0)(ctx)
    }
}

pub fn hook_fn<F>(f: F) -> HookFn<F>
where
    F: Fn(&mut HookContext<'_>) + Send + Sync,
{
    HookFn(f)
}

/// Entry point for one inbound request
pub struct FrontDoor {
    dispatcher: Dispatcher,
    tracer: Arc<dyn Tracer>,
    before: Vec<Arc<dyn RequestHook>>,
    after: Vec<Arc<dyn RequestHook>>,
}

impl FrontDoor {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            tracer: dispatcher.tracer().clone(),
            dispatcher,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Hook run before body parsing; may cancel the request
    pub fn before(mut self, hook: impl RequestHook + 'static) -> Self {
        self.before.push(Arc::new(hook));
        self
    }

    /// Hook run after dispatch, before the reply is written
    pub fn after(mut self, hook: impl RequestHook + 'static) -> Self {
        self.after.push(Arc::new(hook));
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn serve(&self, request: InboundRequest) -> HttpReply {
        // Continues the caller's trace; finished on every return path
        let root = SpanGuard::new(self.tracer.start_span_from(
            &format!("jsonRPC:{}", request.path()),
            &HeaderExtractor(request.headers()),
        ));
        root.set_tag("http.method", request.method().as_str());

        let mut reply = self.respond(&request, &root).await;
        self.tracer
            .inject(root.span().as_ref(), &mut HeaderInjector(&mut reply.headers));
        reply
    }

    async fn respond(&self, request: &InboundRequest, root: &SpanGuard) -> HttpReply {
        if *request.method() != Method::POST {
            root.fail(METHOD_NOT_ALLOWED);
            return HttpReply::text(StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED);
        }

        let mut hooks = HookContext::new(request);
        for hook in &self.before {
            hook.run(&mut hooks);
        }
        if hooks.is_cancelled() {
            debug!(path = %request.path(), "request cancelled by hook");
            let reply = hooks
                .reply
                .take()
                .unwrap_or_else(|| HttpReply::empty(StatusCode::OK));
            return hooks.finish(reply);
        }

        let outcome = self.dispatcher.dispatch_batch(request.body(), root.span()).await;
        if let BatchOutcome::Malformed(response) = &outcome {
            if let Some(err) = response.error() {
                root.fail(err.message());
            }
        }

        for hook in &self.after {
            hook.run(&mut hooks);
        }

        let reply = match outcome.to_body() {
            Ok(body) => HttpReply::json(StatusCode::OK, body),
            Err(e) => {
                error!(error = %e, "failed to encode batch response");
                root.fail(e.to_string());
                HttpReply::text(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "response could not be encoded",
                )
            }
        };
        hooks.finish(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use switchboard_core::application::{CallContext, Instrumentation, ServiceRouter};
    use switchboard_core::domain::{Arguments, Capability, MethodDescriptor, ServiceDescriptor};
    use switchboard_core::port::TagValue;
    use switchboard_core::ServiceError;
    use switchboard_infra_telemetry::{
        MetricsRegistry, RecordingLogSink, RecordingTracer, TRACEPARENT,
    };

    fn dispatcher(tracer: &RecordingTracer, metrics: &Arc<MetricsRegistry>) -> Dispatcher {
        let descriptor = Arc::new(
            ServiceDescriptor::builder("Demo")
                .capabilities([Capability::Trace, Capability::Metrics])
                .method(MethodDescriptor::builder("Ping").build().unwrap())
                .build()
                .unwrap(),
        );
        let router = ServiceRouter::new(descriptor)
            .route("Ping", |_ctx: CallContext, _args: Arguments| async move {
                Ok::<Value, ServiceError>(json!("pong"))
            })
            .unwrap();

        Dispatcher::builder(Instrumentation::new(
            Arc::new(tracer.clone()),
            metrics.clone(),
            Arc::new(RecordingLogSink::default()),
        ))
        .register_router(router)
        .unwrap()
        .build()
    }

    fn ping() -> InboundRequest {
        InboundRequest::new(
            Method::POST,
            "/rpc",
            json!([{"id": 1, "jsonrpc": "2.0", "method": "Demo.Ping"}]).to_string(),
        )
    }

    #[tokio::test]
    async fn test_post_dispatches_and_writes_json() {
        let tracer = RecordingTracer::default();
        let metrics = Arc::new(MetricsRegistry::new());
        let door = FrontDoor::new(dispatcher(&tracer, &metrics));

        let reply = door.serve(ping()).await;

        assert_eq!(reply.status(), StatusCode::OK);
        assert_eq!(reply.content_type(), Some(CONTENT_TYPE_JSON));
        let body: Value = serde_json::from_slice(reply.body()).unwrap();
        assert_eq!(body, json!([{"id": 1, "jsonrpc": "2.0", "result": "pong"}]));

        let root = &tracer.spans_named("jsonRPC:/rpc")[0];
        assert_eq!(root.finish_count, 1);
        assert_eq!(root.tag("http.method"), Some(&TagValue::Str("POST".into())));
        assert!(!root.error);
    }

    #[tokio::test]
    async fn test_wrong_verb_rejected_without_dispatch() {
        let tracer = RecordingTracer::default();
        let metrics = Arc::new(MetricsRegistry::new());
        let door = FrontDoor::new(dispatcher(&tracer, &metrics));

        let request = InboundRequest::new(Method::GET, "/rpc", ping().body().clone());
        let reply = door.serve(request).await;

        assert_eq!(reply.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(reply.body().as_ref(), b"only POST method supported");
        assert_eq!(metrics.request_count_all("Demo", "Ping"), 0);

        let root = &tracer.spans_named("jsonRPC:/rpc")[0];
        assert!(root.error);
        assert_eq!(root.finish_count, 1);
    }

    #[tokio::test]
    async fn test_cancelling_hook_skips_dispatch() {
        let tracer = RecordingTracer::default();
        let metrics = Arc::new(MetricsRegistry::new());
        let after_runs = Arc::new(AtomicUsize::new(0));
        let counter = after_runs.clone();

        let door = FrontDoor::new(dispatcher(&tracer, &metrics))
            .before(hook_fn(|ctx| {
                ctx.cancel_with(HttpReply::text(StatusCode::UNAUTHORIZED, "denied"))
            }))
            .after(hook_fn(move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));

        let reply = door.serve(ping()).await;

        assert_eq!(reply.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(reply.body().as_ref(), b"denied");
        assert_eq!(metrics.request_count_all("Demo", "Ping"), 0);
        assert_eq!(after_runs.load(Ordering::SeqCst), 0);
        assert!(tracer.spans_named("Demo.Ping").is_empty());
        assert_eq!(tracer.spans_named("jsonRPC:/rpc")[0].finish_count, 1);
    }

    #[tokio::test]
    async fn test_all_before_hooks_run_before_cancel_check() {
        let tracer = RecordingTracer::default();
        let metrics = Arc::new(MetricsRegistry::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let second = runs.clone();

        let door = FrontDoor::new(dispatcher(&tracer, &metrics))
            .before(hook_fn(|ctx| ctx.cancel()))
            .before(hook_fn(move |ctx| {
                assert!(ctx.is_cancelled());
                second.fetch_add(1, Ordering::SeqCst);
            }));

        let reply = door.serve(ping()).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(reply.status(), StatusCode::OK);
        assert!(reply.body().is_empty());
    }

    #[tokio::test]
    async fn test_hook_headers_added_to_reply() {
        let tracer = RecordingTracer::default();
        let metrics = Arc::new(MetricsRegistry::new());

        let door = FrontDoor::new(dispatcher(&tracer, &metrics))
            .before(hook_fn(|ctx| {
                let id = ctx
                    .request()
                    .headers()
                    .get("x-request-id")
                    .cloned()
                    .unwrap_or_else(|| HeaderValue::from_static("none"));
                ctx.response_headers_mut().insert("x-request-id", id);
            }))
            .after(hook_fn(|ctx| {
                ctx.response_headers_mut()
                    .insert("x-served-by", HeaderValue::from_static("switchboard"));
            }));

        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("abc"));
        let reply = door.serve(ping().with_headers(headers)).await;

        assert_eq!(reply.headers().get("x-request-id").unwrap(), "abc");
        assert_eq!(reply.headers().get("x-served-by").unwrap(), "switchboard");
        assert_eq!(reply.content_type(), Some(CONTENT_TYPE_JSON));
    }

    #[tokio::test]
    async fn test_malformed_body_errors_root_span() {
        let tracer = RecordingTracer::default();
        let metrics = Arc::new(MetricsRegistry::new());
        let door = FrontDoor::new(dispatcher(&tracer, &metrics));

        let reply = door
            .serve(InboundRequest::new(Method::POST, "/rpc", "not json"))
            .await;

        assert_eq!(reply.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(reply.body()).unwrap();
        assert_eq!(body["error"]["code"], json!(-32700));
        assert!(tracer.spans_named("jsonRPC:/rpc")[0].error);
    }

    #[tokio::test]
    async fn test_inbound_trace_continued_and_written_back() {
        let tracer = RecordingTracer::default();
        let metrics = Arc::new(MetricsRegistry::new());
        let door = FrontDoor::new(dispatcher(&tracer, &metrics));

        let mut headers = HeaderMap::new();
        headers.insert(
            TRACEPARENT,
            HeaderValue::from_static("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
        );
        let reply = door.serve(ping().with_headers(headers)).await;

        let root = &tracer.spans_named("jsonRPC:/rpc")[0];
        assert_eq!(root.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(root.remote_parent.as_deref(), Some("00f067aa0ba902b7"));

        let item = &tracer.spans_named("Demo.Ping")[0];
        assert_eq!(item.parent, Some(root.id));
        assert_eq!(item.trace_id, root.trace_id);

        assert_eq!(
            reply.headers().get(TRACEPARENT).unwrap().to_str().unwrap(),
            root.traceparent()
        );
    }

    #[tokio::test]
    async fn test_trace_written_back_on_every_reply() {
        let tracer = RecordingTracer::default();
        let metrics = Arc::new(MetricsRegistry::new());
        let door = FrontDoor::new(dispatcher(&tracer, &metrics))
            .before(hook_fn(|ctx| ctx.cancel()));

        let cancelled = door.serve(ping()).await;
        let wrong_verb = door
            .serve(InboundRequest::new(Method::GET, "/rpc", ""))
            .await;

        let roots = tracer.spans_named("jsonRPC:/rpc");
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].remote_parent, None);
        assert_eq!(
            cancelled.headers().get(TRACEPARENT).unwrap().to_str().unwrap(),
            roots[0].traceparent()
        );
        assert_eq!(
            wrong_verb.headers().get(TRACEPARENT).unwrap().to_str().unwrap(),
            roots[1].traceparent()
        );
    }
}
