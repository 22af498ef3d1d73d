//! The run pipeline: builder chain, transform chain and orchestrator.

mod context;
mod orchestrator;
mod request;
mod response;

pub use context::{RunContext, RunRequest};
pub use orchestrator::RunOrchestrator;
pub use request::{builder_chain, RequestStage};
pub use response::{transform_chain, HttpRunResponse, ResponseStage, RunOutcome};
