//! Shared fixture: an instrumented `Demo` service behind a dispatcher

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use switchboard_api_rpc::{Dispatcher, FrontDoor, InboundRequest};
use switchboard_core::application::{typed, CallContext, Instrumentation, ServiceRouter};
use switchboard_core::domain::{Arguments, Capability, MethodDescriptor, ServiceDescriptor, ValueType};
use switchboard_core::ServiceError;
use switchboard_infra_telemetry::{MetricsRegistry, RecordingLogSink, RecordingTracer};
use tokio::sync::Barrier;

pub struct Harness {
    pub tracer: RecordingTracer,
    pub metrics: Arc<MetricsRegistry>,
    pub logs: RecordingLogSink,
    pub dispatcher: Dispatcher,
}

#[derive(Deserialize)]
struct SleepParams {
    millis: u64,
}

#[derive(Serialize)]
struct SleepResult {
    slept: u64,
}

pub fn demo_descriptor() -> Arc<ServiceDescriptor> {
    Arc::new(
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
                MethodDescriptor::builder("Login")
                    .param("user", ValueType::String)
                    .param("password", ValueType::String)
                    .skip_log_field("password")
                    .skip_log_field("response")
                    .build()
                    .unwrap(),
            )
            .method(
                MethodDescriptor::builder("Fail")
                    .param("message", ValueType::String)
                    .build()
                    .unwrap(),
            )
            .method(MethodDescriptor::builder("Coded").build().unwrap())
            .method(
                MethodDescriptor::builder("Sleep")
                    .param("millis", ValueType::Integer)
                    .build()
                    .unwrap(),
            )
            .method(MethodDescriptor::builder("Rendezvous").build().unwrap())
            .build()
            .unwrap(),
    )
}

/// `Rendezvous` completes only once `rendezvous` calls are in flight together
pub fn demo_router(rendezvous: usize) -> ServiceRouter {
    let barrier = Arc::new(Barrier::new(rendezvous.max(1)));

    ServiceRouter::new(demo_descriptor())
        .route("Echo", |_ctx: CallContext, args: Arguments| async move {
            Ok::<Value, ServiceError>(args.into_value())
        })
        .unwrap()
        .route("Login", |_ctx: CallContext, args: Arguments| async move {
            let user: String = args.get("user")?;
            Ok::<Value, ServiceError>(json!({"token": format!("token-for-{}", user)}))
        })
        .unwrap()
        .route("Fail", |_ctx: CallContext, args: Arguments| async move {
            let message: String = args.get("message")?;
            Err::<Value, ServiceError>(ServiceError::Failed(message))
        })
        .unwrap()
        .route("Coded", |_ctx: CallContext, _args: Arguments| async move {
            Err::<Value, ServiceError>(
                ServiceError::coded(4001, "not found").with_data(json!({"kind": "demo"})),
            )
        })
        .unwrap()
        .route(
            "Sleep",
            typed(|_ctx: CallContext, p: SleepParams| async move {
                tokio::time::sleep(Duration::from_millis(p.millis)).await;
                Ok::<_, ServiceError>(SleepResult { slept: p.millis })
            }),
        )
        .unwrap()
        .route("Rendezvous", move |_ctx: CallContext, _args: Arguments| {
            let barrier = barrier.clone();
            async move {
                barrier.wait().await;
                Ok::<Value, ServiceError>(json!(true))
            }
        })
        .unwrap()
}

pub fn harness() -> Harness {
    harness_with(1, None)
}

pub fn harness_with(rendezvous: usize, max_concurrency: Option<usize>) -> Harness {
    let tracer = RecordingTracer::new();
    let metrics = Arc::new(MetricsRegistry::new());
    let logs = RecordingLogSink::new();

    let instrumentation = Instrumentation::new(
        Arc::new(tracer.clone()),
        metrics.clone(),
        Arc::new(logs.clone()),
    );
    let dispatcher = Dispatcher::builder(instrumentation)
        .max_concurrency(max_concurrency)
        .register_router(demo_router(rendezvous))
        .unwrap()
        .build();

    Harness {
        tracer,
        metrics,
        logs,
        dispatcher,
    }
}

impl Harness {
    pub fn front_door(&self) -> FrontDoor {
        FrontDoor::new(self.dispatcher.clone())
    }

    /// POST `body` through a plain front door and decode the JSON reply
    pub async fn post(&self, body: Value) -> Value {
        let reply = self
            .front_door()
            .serve(InboundRequest::new(http::Method::POST, "/", body.to_string()))
            .await;
        assert_eq!(reply.status(), http::StatusCode::OK);
        serde_json::from_slice(reply.body()).unwrap()
    }
}

pub fn call(id: Value, method: &str, params: Value) -> Value {
    json!({"id": id, "jsonrpc": "2.0", "method": method, "params": params})
}

pub fn notify(method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "method": method, "params": params})
}
