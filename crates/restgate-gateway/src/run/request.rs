//! Ordered request builder chain.
//!
//! Stages mutate one shared `OutboundRequest` against the read-only run
//! context. The body stage runs first so the computed body is available to
//! later stages, e.g. a header carrying an integrity digest over the body.

use std::sync::Arc;

use restgate_core::{GatewayResult, SubstitutionEngine};

use crate::http::{OutboundBody, OutboundRequest};
use crate::run::context::RunContext;

pub trait RequestStage: Send + Sync {
    fn apply(&self, request: &mut OutboundRequest, ctx: &RunContext) -> GatewayResult<()>;
}

/// The fixed stage order: body, url, method, headers, timeouts, auth/TLS.
pub fn builder_chain(engine: Arc<SubstitutionEngine>) -> Vec<Box<dyn RequestStage>> {
    vec![
        Box::new(BodyStage { engine: engine.clone() }),
        Box::new(UrlStage { engine: engine.clone() }),
        Box::new(MethodStage),
        Box::new(HeadersStage { engine }),
        Box::new(TimeoutsStage),
        Box::new(AuthTlsStage),
    ]
}

/// A literal body from the run request is used verbatim; otherwise the
/// inbound body template is rendered.
struct BodyStage {
    engine: Arc<SubstitutionEngine>,
}

impl RequestStage for BodyStage {
    fn apply(&self, request: &mut OutboundRequest, ctx: &RunContext) -> GatewayResult<()> {
        if let Some(body) = &ctx.run_request.body {
            request.body = Some(OutboundBody::Json(body.clone()));
            return Ok(());
        }
        let template = ctx.method.inbound().and_then(|i| i.transformation_in_template.as_deref());
        if let Some(template) = template {
            let context = ctx.request_substitution_context(request);
            let body = self.engine.render(template, &context)?;
            tracing::trace!(body = %body, "substituted request body");
            request.body = Some(OutboundBody::Raw(body));
        }
        Ok(())
    }
}

/// Subsystem base URL + resource path + query-param suffix, rendered as one
/// template.
struct UrlStage {
    engine: Arc<SubstitutionEngine>,
}

impl RequestStage for UrlStage {
    fn apply(&self, request: &mut OutboundRequest, ctx: &RunContext) -> GatewayResult<()> {
        let url = format!(
            "{}{}{}",
            ctx.subsystem.url,
            ctx.method.path(),
            ctx.method.inbound().and_then(|i| i.query_params.as_deref()).unwrap_or_default()
        );
        let context = ctx.request_substitution_context(request);
        let rendered = self.engine.render(&url, &context)?;
        tracing::debug!(url = %rendered, "request url after substitution");
        request.url = rendered;
        if let Some(encode) = ctx.method.inbound().and_then(|i| i.encode_url) {
            request.encode_url = encode;
        }
        Ok(())
    }
}

struct MethodStage;

impl RequestStage for MethodStage {
    fn apply(&self, request: &mut OutboundRequest, ctx: &RunContext) -> GatewayResult<()> {
        request.method = ctx.method.method_name().to_string();
        Ok(())
    }
}

/// Effective request headers with every value rendered as a template.
struct HeadersStage {
    engine: Arc<SubstitutionEngine>,
}

impl RequestStage for HeadersStage {
    fn apply(&self, request: &mut OutboundRequest, ctx: &RunContext) -> GatewayResult<()> {
        let headers = ctx.method.request_headers();
        if headers.is_empty() {
            return Ok(());
        }
        let context = ctx.request_substitution_context(request);
        for (name, values) in headers {
            let rendered = values
                .iter()
                .map(|value| self.engine.render(value, &context))
                .collect::<GatewayResult<Vec<String>>>()?;
            request.headers.insert(name, rendered);
        }
        tracing::debug!(headers = ?request.headers, "request headers");
        Ok(())
    }
}

struct TimeoutsStage;

impl RequestStage for TimeoutsStage {
    fn apply(&self, request: &mut OutboundRequest, ctx: &RunContext) -> GatewayResult<()> {
        let connection = ctx.subsystem.connection();
        request.connect_timeout_seconds = connection.connect_timeout_seconds();
        request.read_timeout_seconds = connection.read_timeout_seconds();
        request.write_timeout_seconds = connection.write_timeout_seconds();
        Ok(())
    }
}

/// Secret references for the executor's TLS context selection, only when the
/// subsystem requires client verification.
struct AuthTlsStage;

impl RequestStage for AuthTlsStage {
    fn apply(&self, request: &mut OutboundRequest, ctx: &RunContext) -> GatewayResult<()> {
        if !ctx.subsystem.ssl_verify() {
            return Ok(());
        }
        let connection = ctx.subsystem.connection();
        request.ssl_verify = true;
        request.trust_store_secret_name = connection.ssl_trust_store_secret_name.clone();
        request.trust_store_secret_password = connection.ssl_trust_store_secret_password.clone();
        request.key_store_secret_name = connection.ssl_key_store_secret_name.clone();
        request.key_store_secret_password = connection.ssl_key_store_secret_password.clone();
        Ok(())
    }
}
