pub mod cache;
pub mod error;
pub mod model;
pub mod substitution;

// Re-export commonly used types
pub use cache::{ExpiringCache, ExpiryPolicy};
pub use error::{GatewayError, GatewayResult};
pub use model::resources::{
    ErrorHandler, InboundProperty, OutboundProperty, Resource, ResourceConfiguration,
    ResourceMethod, ResourceMethodDefinition, RetryHandler, RetryPolicy,
};
pub use model::subsystem::{AuthType, ConnectionProperties, Subsystem};
pub use substitution::SubstitutionEngine;
