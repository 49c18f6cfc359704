// Trace layer: tags the call's span with the method and any failure

use crate::application::service::{CallContext, CallRequest, Service};
use crate::error::ServiceError;
use crate::port::TagValue;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct TraceMiddleware {
    next: Arc<dyn Service>,
}

impl TraceMiddleware {
    pub fn new(next: Arc<dyn Service>) -> Self {
        Self { next }
    }
}

#[async_trait]
impl Service for TraceMiddleware {
    async fn call(&self, ctx: CallContext, request: CallRequest) -> Result<Value, ServiceError> {
        let span = ctx.span().clone();
        span.set_tag("method", TagValue::from(request.method().name()));

        let result = self.next.call(ctx, request).await;

        if let Err(err) = &result {
            span.set_error();
            span.set_tag("msg", TagValue::Str(err.to_string()));
        }
        result
    }
}
