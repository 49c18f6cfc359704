// Application Layer - Service contract, method routing and middleware chain

pub mod middleware;
pub mod router;
pub mod service;

// Re-exports
pub use middleware::{decorate, middlewares, Instrumentation, Middleware};
pub use router::{typed, MethodHandler, ServiceRouter};
pub use service::{CallContext, CallRequest, Service};
