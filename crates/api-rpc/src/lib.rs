//! JSON-RPC API Layer
//!
//! Implements the JSON-RPC 2.0 batch endpoint for Switchboard services:
//! wire envelopes, dispatcher, transport front door and the HTTP listener.

pub mod dispatcher;
pub mod error;
pub mod front_door;
pub mod server;
pub mod types;

pub use dispatcher::{BatchOutcome, Dispatcher, DispatcherBuilder};
pub use error::ServerError;
pub use front_door::{hook_fn, FrontDoor, HookContext, HttpReply, InboundRequest, RequestHook};
pub use server::{MetricsRenderer, RpcServer, RpcServerConfig, ServerHandle, METRICS_CONTENT_TYPE};
