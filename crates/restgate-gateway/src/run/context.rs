//! Execution context of one run invocation.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use restgate_core::{OutboundProperty, ResourceMethodDefinition, Subsystem};

use crate::http::OutboundRequest;
use crate::run::response::HttpRunResponse;

/// The caller's invocation payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    /// Target method; may be omitted when the resource has exactly one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Named inputs exposed to templates as `inputs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Value>,
    /// Literal request body, used verbatim instead of the body template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// `ORIGINAL` bypasses the response transform chain entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
}

impl RunRequest {
    pub fn wants_original_response(&self) -> bool {
        self.response_format
            .as_deref()
            .map(|format| format.eq_ignore_ascii_case("ORIGINAL"))
            .unwrap_or(false)
    }
}

/// Read-only state shared by the builder stages, plus the error-handler
/// outbound selected during response transformation.
pub struct RunContext {
    pub run_request: RunRequest,
    pub method: ResourceMethodDefinition,
    pub subsystem: Subsystem,
    pub auth_token: Option<String>,
    pub matched_error_outbound: Option<OutboundProperty>,
}

impl RunContext {
    /// The outbound spec in effect: a matched error handler's outbound
    /// replaces the method's own.
    pub fn effective_outbound(&self) -> Option<&OutboundProperty> {
        self.matched_error_outbound.as_ref().or_else(|| self.method.outbound())
    }

    /// Substitution context for request-building templates.
    pub fn request_substitution_context(&self, request: &OutboundRequest) -> Value {
        let mut request_properties = serde_json::Map::new();
        request_properties
            .insert("method".to_string(), Value::String(self.method.method_name().to_string()));
        if let Some(body) = request.body_for_substitution() {
            request_properties.insert("body".to_string(), body);
        }

        let mut context = serde_json::Map::new();
        context.insert("request".to_string(), Value::Object(request_properties));
        context.insert("inputs".to_string(), self.run_request.inputs.clone().unwrap_or(Value::Null));
        self.insert_auth_entry(&mut context);
        Value::Object(context)
    }

    /// Substitution context for response transformation, retry-handler and
    /// error-handler conditions excepted (the retry evaluator builds its own
    /// from the failure).
    pub fn response_substitution_context(&self, response: &HttpRunResponse) -> Value {
        let request = response.request();
        let mut request_properties = serde_json::Map::new();
        request_properties
            .insert("method".to_string(), Value::String(request.method.clone()));
        request_properties.insert("url".to_string(), Value::String(request.url.clone()));
        if let Some(body) = request.body_for_substitution() {
            request_properties.insert("body".to_string(), body);
        }
        request_properties.insert("headers".to_string(), json!(request.headers));

        let response_properties = json!({
            "body": json_or_string(&response.original_body_string()),
            "code": response.original_status(),
            "headers": response.original_headers(),
        });

        let mut context = serde_json::Map::new();
        context.insert("inputs".to_string(), self.run_request.inputs.clone().unwrap_or(Value::Null));
        context.insert("request".to_string(), Value::Object(request_properties));
        context.insert("response".to_string(), response_properties);
        self.insert_auth_entry(&mut context);
        Value::Object(context)
    }

    /// Templates reference the generated token directly under the configured
    /// auth key name.
    fn insert_auth_entry(&self, context: &mut serde_json::Map<String, Value>) {
        if let Some(key) = self.subsystem.auth_key().filter(|k| !k.trim().is_empty()) {
            let token = self
                .auth_token
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null);
            context.insert(key, token);
        }
    }
}

/// Bodies that parse as JSON are exposed structurally, everything else as
/// the raw string.
pub(crate) fn json_or_string(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use restgate_core::{ConnectionProperties, ResourceConfiguration};

    fn context() -> RunContext {
        let configuration: ResourceConfiguration = serde_yaml::from_str(
            r#"
            name: cfg
            resources:
              ticket:
                path: /tickets
                methods:
                  createTicket: {}
            "#,
        )
        .unwrap();
        let method =
            ResourceMethodDefinition::resolve(&configuration, "ticket", Some("createTicket"))
                .unwrap();
        let mut connection = ConnectionProperties::default();
        connection.auth_key = Some("apiToken".to_string());
        RunContext {
            run_request: RunRequest {
                inputs: Some(json!({"id": 7})),
                ..Default::default()
            },
            method,
            subsystem: Subsystem {
                name: "billing".to_string(),
                url: "https://billing.example.com".to_string(),
                connection_properties: vec![connection],
                auth_subsystem: None,
            },
            auth_token: Some("tok-1".to_string()),
            matched_error_outbound: None,
        }
    }

    #[test]
    fn test_request_context_exposes_method_inputs_and_token() {
        let ctx = context();
        let request = OutboundRequest::new();
        let value = ctx.request_substitution_context(&request);
        assert_eq!(value["request"]["method"], "createTicket");
        assert_eq!(value["inputs"]["id"], 7);
        assert_eq!(value["apiToken"], "tok-1");
        assert!(value["request"].get("body").is_none());
    }

    #[test]
    fn test_wants_original_response_is_case_insensitive() {
        let request = RunRequest {
            response_format: Some("original".to_string()),
            ..Default::default()
        };
        assert!(request.wants_original_response());
        let request = RunRequest::default();
        assert!(!request.wants_original_response());
    }

    #[test]
    fn test_json_or_string() {
        assert_eq!(json_or_string(r#"{"a": 1}"#)["a"], 1);
        assert_eq!(json_or_string("plain"), Value::String("plain".to_string()));
    }
}
