// Service Contract
//
// The single call contract shared by the core implementation and every
// decorator layer wrapped around it.

use crate::domain::{Arguments, MethodDescriptor};
use crate::error::ServiceError;
use crate::port::{NoopTracer, Span, Tracer};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Invocation context passed as the implicit first argument of every call
#[derive(Clone)]
pub struct CallContext {
    span: Arc<dyn Span>,
    notification: bool,
}

impl CallContext {
    pub fn new(span: Arc<dyn Span>, notification: bool) -> Self {
        Self { span, notification }
    }

    /// Context with a discarded span (tests, in-process calls)
    pub fn detached() -> Self {
        Self::new(NoopTracer.start_span("detached", None), false)
    }

    /// Span of the call currently in flight
    pub fn span(&self) -> &Arc<dyn Span> {
        &self.span
    }

    /// True when the caller will never see the outcome
    pub fn is_notification(&self) -> bool {
        self.notification
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("notification", &self.notification)
            .finish_non_exhaustive()
    }
}

/// Resolved method plus its bound arguments
#[derive(Debug, Clone)]
pub struct CallRequest {
    method: Arc<MethodDescriptor>,
    args: Arguments,
}

impl CallRequest {
    pub fn new(method: Arc<MethodDescriptor>, args: Arguments) -> Self {
        Self { method, args }
    }

    pub fn method(&self) -> &Arc<MethodDescriptor> {
        &self.method
    }

    pub fn args(&self) -> &Arguments {
        &self.args
    }

    pub fn into_args(self) -> Arguments {
        self.args
    }
}

/// A named set of remote-callable methods
///
/// Decorators implement this same trait and forward to `next`, so the
/// outcome returned here is exactly what the caller sees.
#[async_trait]
pub trait Service: Send + Sync {
    async fn call(&self, ctx: CallContext, request: CallRequest) -> Result<Value, ServiceError>;
}
