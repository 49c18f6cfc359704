// Demo service
//
// Small service wired into the daemon so a fresh install answers calls and
// exercises every decorator.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::application::{typed, CallContext, ServiceRouter};
use switchboard_core::domain::{DomainError, ServiceDescriptor};
use switchboard_core::ServiceError;

const DESCRIPTOR: &str = include_str!("demo.json");

/// Upper bound for `Demo.Sleep`
pub const MAX_SLEEP_MILLIS: u64 = 5000;

#[derive(Debug, Deserialize)]
struct EchoParams {
    value: Value,
}

#[derive(Debug, Serialize)]
struct EchoResult {
    value: Value,
}

#[derive(Debug, Deserialize)]
struct SumParams {
    a: f64,
    b: f64,
}

#[derive(Debug, Serialize)]
struct SumResult {
    sum: f64,
}

#[derive(Debug, Deserialize)]
struct FailParams {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SleepParams {
    millis: u64,
}

#[derive(Debug, Serialize)]
struct SleepResult {
    slept: u64,
}

pub fn descriptor() -> Result<Arc<ServiceDescriptor>, DomainError> {
    ServiceDescriptor::from_json(DESCRIPTOR).map(Arc::new)
}

pub fn router() -> Result<ServiceRouter, DomainError> {
    ServiceRouter::new(descriptor()?)
        .route(
            "Echo",
            typed(|_ctx: CallContext, p: EchoParams| async move {
                Ok::<_, ServiceError>(EchoResult { value: p.value })
            }),
        )?
        .route(
            "Sum",
            typed(|_ctx: CallContext, p: SumParams| async move {
                Ok::<_, ServiceError>(SumResult { sum: p.a + p.b })
            }),
        )?
        .route(
            "Fail",
            typed(|_ctx: CallContext, p: FailParams| async move {
                Err::<Value, _>(ServiceError::Failed(p.message))
            }),
        )?
        .route(
            "Sleep",
            typed(|_ctx: CallContext, p: SleepParams| async move {
                let millis = p.millis.min(MAX_SLEEP_MILLIS);
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok::<_, ServiceError>(SleepResult { slept: millis })
            }),
        )
}
