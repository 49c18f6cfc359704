// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid name '{0}': names must be non-empty and must not contain '.'")]
    InvalidName(String),

    #[error("Duplicate method '{method}' in service '{service}'")]
    DuplicateMethod { service: String, method: String },

    #[error("Duplicate parameter '{param}' in method '{method}'")]
    DuplicateParameter { method: String, param: String },

    #[error("Duplicate service '{0}'")]
    DuplicateService(String),

    #[error("Method '{method}' is not declared by service '{service}'")]
    UnknownMethod { service: String, method: String },

    #[error("Method '{method}' of service '{service}' has no handler")]
    MissingHandler { service: String, method: String },

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Invalid descriptor document: {0}")]
    InvalidDocument(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
