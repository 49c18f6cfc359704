// Method Router - the core (undecorated) service implementation
//
// Maps each declared method to a handler. Handlers are async functions of
// `(CallContext, Arguments)`, or typed functions wrapped with `typed`.

use crate::application::service::{CallContext, CallRequest, Service};
use crate::domain::{Arguments, DomainError, ServiceDescriptor};
use crate::error::ServiceError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Handler for one method
#[async_trait]
pub trait MethodHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: CallContext, args: Arguments) -> Result<Value, ServiceError>;
}

#[async_trait]
impl<F, Fut> MethodHandler for F
where
    F: Fn(CallContext, Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ServiceError>> + Send + 'static,
{
    async fn handle(&self, ctx: CallContext, args: Arguments) -> Result<Value, ServiceError> {
        (self)(ctx, args).await
    }
}

/// Adapt a typed handler: arguments decode into `P`, the output encodes from `R`
///
/// # Example
/// ```text
/// router.route("Sum", typed(|_ctx, p: SumParams| async move {
///     Ok(SumResult { sum: p.a + p.b })
/// }))?
/// ```
pub fn typed<P, R, F, Fut>(handler: F) -> impl MethodHandler
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(CallContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, ServiceError>> + Send + 'static,
{
    move |ctx: CallContext, args: Arguments| {
        let call = args.decode::<P>().map(|params| handler(ctx, params));
        async move {
            let output = call?.await?;
            Ok::<Value, ServiceError>(serde_json::to_value(output)?)
        }
    }
}

/// Core implementation of a service: one handler per declared method
pub struct ServiceRouter {
    descriptor: Arc<ServiceDescriptor>,
    // lowercase method name -> handler
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl ServiceRouter {
    pub fn new(descriptor: Arc<ServiceDescriptor>) -> Self {
        Self {
            descriptor,
            handlers: HashMap::new(),
        }
    }

    pub fn descriptor(&self) -> &Arc<ServiceDescriptor> {
        &self.descriptor
    }

    /// Attach a handler to a declared method (case-insensitive)
    pub fn route<H: MethodHandler>(mut self, method: &str, handler: H) -> Result<Self, DomainError> {
        let declared = self
            .descriptor
            .method(method)
            .ok_or_else(|| DomainError::UnknownMethod {
                service: self.descriptor.name().to_string(),
                method: method.to_string(),
            })?;

        self.handlers
            .insert(declared.name().to_lowercase(), Arc::new(handler));
        Ok(self)
    }

    /// Finish routing; every declared method must have a handler
    pub fn build(self) -> Result<Arc<dyn Service>, DomainError> {
        for method in self.descriptor.methods() {
            if !self.handlers.contains_key(&method.name().to_lowercase()) {
                return Err(DomainError::MissingHandler {
                    service: self.descriptor.name().to_string(),
                    method: method.name().to_string(),
                });
            }
        }
        debug!(
            service = %self.descriptor.name(),
            methods = self.handlers.len(),
            "service router built"
        );
        Ok(Arc::new(self))
    }
}

#[async_trait]
impl Service for ServiceRouter {
    async fn call(&self, ctx: CallContext, request: CallRequest) -> Result<Value, ServiceError> {
        let key = request.method().name().to_lowercase();
        let handler = self.handlers.get(&key).cloned().ok_or_else(|| {
            ServiceError::failed(format!(
                "method '{}' is not implemented",
                request.method().name()
            ))
        })?;

        handler.handle(ctx, request.into_args()).await
    }
}
