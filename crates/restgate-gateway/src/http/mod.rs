//! Outbound HTTP execution: request draft, pooled client cache, executor
//! and the condition-driven retry evaluator.

mod client_cache;
mod executor;
mod request;
mod retry;
pub(crate) mod url;

pub use executor::{ExecutedResponse, HttpExecutor, HttpFailure, PoolSettings};
pub use request::{OutboundBody, OutboundRequest};
pub use retry::RetryEvaluator;
