//! RPC Error Types
//!
//! JSON-RPC 2.0 error codes and the mapping from call outcomes to wire
//! ErrorObjects.

use jsonrpsee_types::ErrorObjectOwned;
use switchboard_core::ServiceError;
use thiserror::Error;

/// JSON-RPC 2.0 error codes (closed set)
pub mod code {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// ErrorObject without data
pub fn rpc_error(code: i32, message: impl Into<String>) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code, message, None::<()>)
}

/// Convert a failed call outcome to a JSON-RPC ErrorObject
pub fn to_rpc_error(err: ServiceError) -> ErrorObjectOwned {
    match err {
        ServiceError::Failed(msg) => rpc_error(code::INTERNAL_ERROR, msg),
        ServiceError::InvalidParams(msg) => rpc_error(code::INVALID_PARAMS, msg),
        ServiceError::Coded {
            code,
            message,
            data,
        } => ErrorObjectOwned::owned(code, message, data),
        ServiceError::Serialization(msg) => rpc_error(
            code::INTERNAL_ERROR,
            format!("response body could not be encoded: {}", msg),
        ),
    }
}

/// Listener errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server task failed: {0}")]
    Task(String),
}
