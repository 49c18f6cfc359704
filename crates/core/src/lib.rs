// Switchboard Core - Service Contracts, Ports & Middleware
// NO infrastructure dependencies (ADR-001: Hexagonal Architecture)

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{Result, ServiceError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
