// Domain Layer - Service description and call arguments

pub mod arguments;
pub mod descriptor;
pub mod error;

// Re-exports
pub use arguments::Arguments;
pub use descriptor::{
    Capability, Field, MethodDescriptor, MethodDescriptorBuilder, ServiceDescriptor,
    ServiceDescriptorBuilder, ValueType,
};
pub use error::DomainError;
