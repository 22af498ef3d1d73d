//! Shared application state.

use std::sync::Arc;

use restgate_gateway::RunOrchestrator;

use crate::store::ResourceConfigurationStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ResourceConfigurationStore>,
    pub orchestrator: Arc<RunOrchestrator>,
}
