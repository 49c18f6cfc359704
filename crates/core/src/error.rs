// Call Outcome Error Type
//
// The outcome indicator returned by every service call. Decorators observe
// it and forward it untouched; the RPC layer maps it to a wire ErrorObject.

use thiserror::Error;

/// Failure outcome of a service method
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// Plain failure reported by the implementation (-> internal error)
    #[error("{0}")]
    Failed(String),

    /// Arguments could not be turned into the method's typed input
    #[error("{0}")]
    InvalidParams(String),

    /// Structured error chosen by the implementation, propagated verbatim
    #[error("{message}")]
    Coded {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ServiceError {
    pub fn failed(message: impl Into<String>) -> Self {
        ServiceError::Failed(message.into())
    }

    pub fn coded(code: i32, message: impl Into<String>) -> Self {
        ServiceError::Coded {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data (only meaningful for `Coded`)
    pub fn with_data(self, data: serde_json::Value) -> Self {
        match self {
            ServiceError::Coded { code, message, .. } => ServiceError::Coded {
                code,
                message,
                data: Some(data),
            },
            other => other,
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Serialization(err.to_string())
    }
}

/// Result type alias for service calls
pub type Result<T> = std::result::Result<T, ServiceError>;
