//! Run orchestration: method resolution, subsystem lookup, authentication,
//! builder chain, execution with retry and response transformation.

use std::sync::Arc;

use restgate_core::{GatewayResult, ResourceConfiguration, ResourceMethodDefinition, SubstitutionEngine};

use crate::auth::AuthenticationService;
use crate::connectivity::ConnectivityRetriever;
use crate::http::{HttpExecutor, OutboundRequest, RetryEvaluator};
use crate::run::context::{RunContext, RunRequest};
use crate::run::request::{builder_chain, RequestStage};
use crate::run::response::{transform_chain, HttpRunResponse, ResponseStage, RunOutcome};

pub struct RunOrchestrator {
    authentication: Arc<AuthenticationService>,
    connectivity: Arc<ConnectivityRetriever>,
    executor: Arc<HttpExecutor>,
    retry: RetryEvaluator,
    request_stages: Vec<Box<dyn RequestStage>>,
    response_stages: Vec<Box<dyn ResponseStage>>,
}

impl RunOrchestrator {
    pub fn new(
        engine: Arc<SubstitutionEngine>,
        authentication: Arc<AuthenticationService>,
        connectivity: Arc<ConnectivityRetriever>,
        executor: Arc<HttpExecutor>,
    ) -> Self {
        Self {
            authentication,
            connectivity,
            executor,
            retry: RetryEvaluator::new(engine.clone()),
            request_stages: builder_chain(engine.clone()),
            response_stages: transform_chain(engine),
        }
    }

    /// Execute an API call towards a configured connected system.
    pub async fn run(
        &self,
        subsystem_name: &str,
        configuration: &ResourceConfiguration,
        resource: &str,
        run_request: RunRequest,
    ) -> GatewayResult<RunOutcome> {
        tracing::info!(
            subsystem = subsystem_name,
            configuration = %configuration.name,
            resource,
            method = run_request.method.as_deref().unwrap_or_default(),
            "starting run"
        );

        let method = ResourceMethodDefinition::resolve(
            configuration,
            resource,
            run_request.method.as_deref(),
        )?;
        let subsystem = self.connectivity.subsystem(subsystem_name).await?;
        let auth_token = self.authentication.authenticate(&subsystem).await?;

        let mut ctx = RunContext {
            run_request,
            method,
            subsystem,
            auth_token,
            matched_error_outbound: None,
        };

        let mut request = OutboundRequest::new();
        for stage in &self.request_stages {
            stage.apply(&mut request, &ctx)?;
        }

        let retry_handlers = ctx.method.retry_handlers();
        let response = self.retry.execute(&self.executor, &request, &retry_handlers).await?;

        let mut run_response = HttpRunResponse::new(response, request);
        if !ctx.run_request.wants_original_response() {
            for stage in &self.response_stages {
                stage.apply(&mut run_response, &mut ctx)?;
            }
        }
        Ok(run_response.into_outcome())
    }
}
