//! Ordered response transform chain.
//!
//! Stages run over an `HttpRunResponse` wrapper that keeps the original
//! upstream response immutable and records overrides next to it; the
//! effective accessors fall back to the original values when no override was
//! set. The chain is skipped entirely when the caller asked for the
//! unmodified response.

use std::sync::Arc;

use indexmap::IndexMap;

use restgate_core::model::resources::merge_headers;
use restgate_core::{GatewayError, GatewayResult, SubstitutionEngine};

use crate::http::{ExecutedResponse, OutboundRequest};
use crate::run::context::RunContext;

/// Structured run result handed back to the caller.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: u16,
    pub headers: IndexMap<String, Vec<String>>,
    pub body: Vec<u8>,
}

/// The upstream response plus the overrides produced by the transform chain.
pub struct HttpRunResponse {
    original: ExecutedResponse,
    request: OutboundRequest,
    status_override: Option<u16>,
    headers_override: Option<IndexMap<String, Vec<String>>>,
    transformed_body: Option<String>,
}

impl HttpRunResponse {
    pub fn new(original: ExecutedResponse, request: OutboundRequest) -> Self {
        Self {
            original,
            request,
            status_override: None,
            headers_override: None,
            transformed_body: None,
        }
    }

    pub fn request(&self) -> &OutboundRequest {
        &self.request
    }

    pub fn original_status(&self) -> u16 {
        self.original.status
    }

    pub fn status(&self) -> u16 {
        self.status_override.unwrap_or(self.original.status)
    }

    pub fn set_status(&mut self, status: u16) {
        self.status_override = Some(status);
    }

    /// Original headers minus the entity framing headers, which no longer
    /// describe the body once it can be rewritten.
    pub fn original_headers(&self) -> IndexMap<String, Vec<String>> {
        self.original
            .headers
            .iter()
            .filter(|(name, _)| {
                !name.eq_ignore_ascii_case("content-length")
                    && !name.eq_ignore_ascii_case("transfer-encoding")
            })
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect()
    }

    pub fn headers(&self) -> IndexMap<String, Vec<String>> {
        self.headers_override.clone().unwrap_or_else(|| self.original_headers())
    }

    pub fn set_headers(&mut self, headers: IndexMap<String, Vec<String>>) {
        self.headers_override = Some(headers);
    }

    pub fn original_body_string(&self) -> String {
        self.original.body_string()
    }

    pub fn content_subtype(&self) -> Option<String> {
        self.original.content_subtype()
    }

    pub fn set_transformed_body(&mut self, body: String) {
        self.transformed_body = Some(body);
    }

    pub fn into_outcome(self) -> RunOutcome {
        let status = self.status();
        let headers = self.headers();
        let body = match self.transformed_body {
            Some(body) => body.into_bytes(),
            None => self.original.body,
        };
        RunOutcome { status, headers, body }
    }
}

pub trait ResponseStage: Send + Sync {
    fn apply(&self, response: &mut HttpRunResponse, ctx: &mut RunContext) -> GatewayResult<()>;
}

/// The fixed stage order: content-type gate, error-handler match, body,
/// headers, status.
pub fn transform_chain(engine: Arc<SubstitutionEngine>) -> Vec<Box<dyn ResponseStage>> {
    vec![
        Box::new(ContentTypeStage),
        Box::new(ErrorHandlerStage { engine: engine.clone() }),
        Box::new(BodyTransformStage { engine: engine.clone() }),
        Box::new(HeadersTransformStage { engine: engine.clone() }),
        Box::new(StatusTransformStage { engine }),
    ]
}

/// XML upstream responses are rejected; anything else is treated as JSON.
struct ContentTypeStage;

impl ResponseStage for ContentTypeStage {
    fn apply(&self, response: &mut HttpRunResponse, _ctx: &mut RunContext) -> GatewayResult<()> {
        if response.content_subtype().as_deref() == Some("xml") {
            return Err(GatewayError::ContentTypeNotSupported("xml".to_string()));
        }
        Ok(())
    }
}

/// First error handler whose condition renders "true" wins; its outbound
/// replaces the method's own for the remaining stages.
struct ErrorHandlerStage {
    engine: Arc<SubstitutionEngine>,
}

impl ResponseStage for ErrorHandlerStage {
    fn apply(&self, response: &mut HttpRunResponse, ctx: &mut RunContext) -> GatewayResult<()> {
        let context = ctx.response_substitution_context(response);
        for handler in ctx.method.error_handlers() {
            let rendered = self.engine.render(&handler.error_condition, &context)?;
            if rendered.eq_ignore_ascii_case("true") {
                tracing::debug!(condition = %handler.error_condition, "found matching error handler");
                ctx.matched_error_outbound = handler.outbound.clone();
                break;
            }
        }
        Ok(())
    }
}

struct BodyTransformStage {
    engine: Arc<SubstitutionEngine>,
}

impl ResponseStage for BodyTransformStage {
    fn apply(&self, response: &mut HttpRunResponse, ctx: &mut RunContext) -> GatewayResult<()> {
        let template = ctx
            .effective_outbound()
            .and_then(|outbound| outbound.transformation_out_template.clone());
        if let Some(template) = template {
            let context = ctx.response_substitution_context(response);
            let body = self.engine.render(&template, &context)?;
            tracing::trace!(body = %body, "substituted response body");
            response.set_transformed_body(body);
        }
        Ok(())
    }
}

/// Global response headers overlaid by the effective outbound's headers;
/// when any configured header exists the response headers are replaced
/// entirely, otherwise the original ones pass through.
struct HeadersTransformStage {
    engine: Arc<SubstitutionEngine>,
}

impl ResponseStage for HeadersTransformStage {
    fn apply(&self, response: &mut HttpRunResponse, ctx: &mut RunContext) -> GatewayResult<()> {
        let local = ctx.effective_outbound().and_then(|outbound| outbound.headers.clone());
        let configured = merge_headers(
            ctx.method.configuration().global_response_headers.as_ref(),
            local.as_ref(),
        );
        if configured.is_empty() {
            return Ok(());
        }
        let context = ctx.response_substitution_context(response);
        let mut rendered: IndexMap<String, Vec<String>> = IndexMap::new();
        for (name, values) in configured {
            let values = values
                .iter()
                .map(|value| self.engine.render(value, &context))
                .collect::<GatewayResult<Vec<String>>>()?;
            rendered.insert(name, values);
        }
        tracing::debug!(headers = ?rendered, "response headers");
        response.set_headers(rendered);
        Ok(())
    }
}

struct StatusTransformStage {
    engine: Arc<SubstitutionEngine>,
}

impl ResponseStage for StatusTransformStage {
    fn apply(&self, response: &mut HttpRunResponse, ctx: &mut RunContext) -> GatewayResult<()> {
        let template = ctx.effective_outbound().and_then(|outbound| outbound.code.clone());
        if let Some(template) = template {
            let context = ctx.response_substitution_context(response);
            let rendered = self.engine.render(&template, &context)?;
            if !rendered.trim().is_empty() {
                let status: u16 = rendered.trim().parse().map_err(|_| {
                    GatewayError::General(format!("invalid response status '{}'", rendered))
                })?;
                response.set_status(status);
                tracing::debug!(status, "substituted response status");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::context::RunRequest;
    use restgate_core::{
        ConnectionProperties, ResourceConfiguration, ResourceMethodDefinition, Subsystem,
    };
    use serde_json::json;

    fn run_context(configuration_yaml: &str) -> RunContext {
        let configuration: ResourceConfiguration =
            serde_yaml::from_str(configuration_yaml).unwrap();
        let method = ResourceMethodDefinition::resolve(&configuration, "ticket", None).unwrap();
        RunContext {
            run_request: RunRequest {
                inputs: Some(json!({"caller": "ops"})),
                ..Default::default()
            },
            method,
            subsystem: Subsystem {
                name: "billing".to_string(),
                url: "https://billing.example.com".to_string(),
                connection_properties: vec![ConnectionProperties::default()],
                auth_subsystem: None,
            },
            auth_token: None,
            matched_error_outbound: None,
        }
    }

    fn upstream(status: u16, content_type: &str, body: &str) -> HttpRunResponse {
        let mut headers: IndexMap<String, Vec<String>> = IndexMap::new();
        headers.insert("content-type".to_string(), vec![content_type.to_string()]);
        headers.insert("content-length".to_string(), vec![body.len().to_string()]);
        let mut request = OutboundRequest::new();
        request.method = "getTicket".to_string();
        request.url = "https://billing.example.com/tickets/1".to_string();
        HttpRunResponse::new(
            ExecutedResponse {
                status,
                headers,
                body: body.as_bytes().to_vec(),
            },
            request,
        )
    }

    fn apply(ctx: &mut RunContext, response: &mut HttpRunResponse) -> GatewayResult<()> {
        let chain = transform_chain(Arc::new(SubstitutionEngine::new()));
        for stage in &chain {
            stage.apply(response, ctx)?;
        }
        Ok(())
    }

    #[test]
    fn test_xml_response_is_rejected() {
        let mut ctx = run_context(
            r#"
            name: cfg
            resources:
              ticket:
                path: /tickets
                methods:
                  getTicket: {}
            "#,
        );
        let mut response = upstream(200, "application/xml", "<a/>");
        let err = apply(&mut ctx, &mut response).unwrap_err();
        assert!(matches!(err, GatewayError::ContentTypeNotSupported(_)));
    }

    #[test]
    fn test_untransformed_response_passes_through() {
        let mut ctx = run_context(
            r#"
            name: cfg
            resources:
              ticket:
                path: /tickets
                methods:
                  getTicket: {}
            "#,
        );
        let mut response = upstream(200, "application/json", r#"{"id": 1}"#);
        apply(&mut ctx, &mut response).unwrap();
        let outcome = response.into_outcome();
        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.body, br#"{"id": 1}"#.to_vec());
        // entity framing headers are stripped
        assert!(outcome.headers.get("content-length").is_none());
        assert!(outcome.headers.get("content-type").is_some());
    }

    #[test]
    fn test_outbound_templates_rewrite_body_headers_and_status() {
        let mut ctx = run_context(
            r#"
            name: cfg
            globalResponseHeaders:
              X-Origin: ["restgate"]
            resources:
              ticket:
                path: /tickets
                methods:
                  getTicket:
                    outbound:
                      code: "299"
                      transformationOutTemplate: '{"ticket": {{ response.body.id }}, "by": "{{ inputs.caller }}"}'
                      headers:
                        X-Transformed: ["yes"]
            "#,
        );
        let mut response = upstream(200, "application/json", r#"{"id": 7}"#);
        apply(&mut ctx, &mut response).unwrap();
        let outcome = response.into_outcome();
        assert_eq!(outcome.status, 299);
        assert_eq!(outcome.body, br#"{"ticket": 7, "by": "ops"}"#.to_vec());
        assert_eq!(outcome.headers.get("X-Origin"), Some(&vec!["restgate".to_string()]));
        assert_eq!(outcome.headers.get("X-Transformed"), Some(&vec!["yes".to_string()]));
        // configured headers replace the original ones entirely
        assert!(outcome.headers.get("content-type").is_none());
    }

    #[test]
    fn test_local_error_handler_wins_over_global() {
        let mut ctx = run_context(
            r#"
            name: cfg
            globalErrorHandlers:
              - errorCondition: "{{ response.code == 404 }}"
                outbound:
                  code: "500"
            resources:
              ticket:
                path: /tickets
                methods:
                  getTicket:
                    errorHandlers:
                      - errorCondition: "{{ response.code == 404 }}"
                        outbound:
                          code: "410"
                          transformationOutTemplate: '{"gone": true}'
            "#,
        );
        let mut response = upstream(404, "application/json", r#"{"error": "missing"}"#);
        apply(&mut ctx, &mut response).unwrap();
        let outcome = response.into_outcome();
        assert_eq!(outcome.status, 410);
        assert_eq!(outcome.body, br#"{"gone": true}"#.to_vec());
    }

    #[test]
    fn test_unmatched_error_handler_leaves_method_outbound_in_effect() {
        let mut ctx = run_context(
            r#"
            name: cfg
            resources:
              ticket:
                path: /tickets
                methods:
                  getTicket:
                    outbound:
                      code: "{{ response.code }}"
                    errorHandlers:
                      - errorCondition: "{{ response.code == 500 }}"
                        outbound:
                          code: "502"
            "#,
        );
        let mut response = upstream(200, "application/json", r#"{"id": 1}"#);
        apply(&mut ctx, &mut response).unwrap();
        assert_eq!(response.status(), 200);
    }
}
