//! Resource configuration document model.
//!
//! A resource configuration is a named document describing resources, their
//! methods and the global policies (headers, retry handlers, error handlers)
//! used when calling connected systems. `ResourceMethodDefinition` combines a
//! resolved method with its parent configuration and exposes the effective
//! views the run pipeline consumes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Configured header map. A `null` value marks the header as unset and is
/// dropped from the effective map rather than forwarded.
pub type ConfiguredHeaders = IndexMap<String, Option<Vec<String>>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfiguration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_request_headers: Option<ConfiguredHeaders>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_response_headers: Option<ConfiguredHeaders>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_retry_handlers: Option<Vec<RetryHandler>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_error_handlers: Option<Vec<ErrorHandler>>,
    #[serde(default)]
    pub resources: IndexMap<String, Resource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub methods: IndexMap<String, ResourceMethod>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMethod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbound: Option<InboundProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound: Option<OutboundProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_handlers: Option<Vec<RetryHandler>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_handlers: Option<Vec<ErrorHandler>>,
}

/// Request-construction spec of a resource method.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundProperty {
    /// Query-parameter suffix appended to the resource path, e.g. `?id={{ inputs.id }}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<String>,
    /// Template producing the outbound request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation_in_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<ConfiguredHeaders>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encode_url: Option<bool>,
}

/// Response-rewriting spec of a resource method or error handler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundProperty {
    /// Template producing the response status code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Template producing the response body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation_out_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<ConfiguredHeaders>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryHandler {
    /// Condition template; the handler matches when it renders to "true".
    pub retry_condition: String,
    pub retry_policy: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub back_off_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorHandler {
    /// Condition template; the handler matches when it renders to "true".
    pub error_condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound: Option<OutboundProperty>,
}

/// A resolved resource method together with its parent configuration.
#[derive(Debug, Clone)]
pub struct ResourceMethodDefinition {
    configuration: ResourceConfiguration,
    path: String,
    method_name: String,
    method: ResourceMethod,
}

impl ResourceMethodDefinition {
    /// Resolve a method within a configuration.
    ///
    /// When no method name is given the resource must expose exactly one
    /// method, which becomes the default. Method names match
    /// case-insensitively.
    pub fn resolve(
        configuration: &ResourceConfiguration,
        resource_name: &str,
        method_name: Option<&str>,
    ) -> GatewayResult<Self> {
        let resource = configuration.resources.get(resource_name).ok_or_else(|| {
            GatewayError::ResourceNotFound {
                resource: resource_name.to_string(),
                configuration: configuration.name.clone(),
            }
        })?;

        let requested = method_name.map(str::trim).filter(|m| !m.is_empty());
        if requested.is_none() && resource.methods.len() != 1 {
            return Err(GatewayError::MethodNameRequired(resource_name.to_string()));
        }

        let target = match requested {
            Some(name) => name.to_string(),
            None => {
                let default_name = resource.methods.keys().next().cloned().unwrap_or_default();
                tracing::info!(method = %default_name, "no method name specified, using default");
                default_name
            }
        };

        let (method_name, method) = resource
            .methods
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&target))
            .map(|(name, method)| (name.clone(), method.clone()))
            .ok_or_else(|| GatewayError::ResourceMethodNotFound {
                method: target.clone(),
                resource: resource_name.to_string(),
            })?;

        Ok(Self {
            configuration: configuration.clone(),
            path: resource.path.clone(),
            method_name,
            method,
        })
    }

    pub fn configuration(&self) -> &ResourceConfiguration {
        &self.configuration
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn inbound(&self) -> Option<&InboundProperty> {
        self.method.inbound.as_ref()
    }

    pub fn outbound(&self) -> Option<&OutboundProperty> {
        self.method.outbound.as_ref()
    }

    /// Effective retry handlers: local entries first, then global ones, so a
    /// local handler wins when both match the same condition.
    pub fn retry_handlers(&self) -> Vec<RetryHandler> {
        let mut handlers = self.method.retry_handlers.clone().unwrap_or_default();
        if let Some(global) = &self.configuration.global_retry_handlers {
            handlers.extend(global.iter().cloned());
        }
        handlers
    }

    /// Effective error handlers, local-then-global like retry handlers.
    pub fn error_handlers(&self) -> Vec<ErrorHandler> {
        let mut handlers = self.method.error_handlers.clone().unwrap_or_default();
        if let Some(global) = &self.configuration.global_error_handlers {
            handlers.extend(global.iter().cloned());
        }
        handlers
    }

    /// Effective request headers: global headers overlaid by the inbound
    /// headers. Same case-insensitive key, the local value wins; `null`
    /// values are dropped.
    pub fn request_headers(&self) -> IndexMap<String, Vec<String>> {
        merge_headers(
            self.configuration.global_request_headers.as_ref(),
            self.inbound().and_then(|i| i.headers.as_ref()),
        )
    }
}

/// Overlay `local` on top of `global` with case-insensitive keys; the local
/// value replaces the global one but the first-seen key spelling is kept.
/// `null` values mark a header as unset and are dropped.
pub fn merge_headers(
    global: Option<&ConfiguredHeaders>,
    local: Option<&ConfiguredHeaders>,
) -> IndexMap<String, Vec<String>> {
    let mut merged: IndexMap<String, Vec<String>> = IndexMap::new();
    for headers in [global, local].into_iter().flatten() {
        for (name, values) in headers {
            let Some(values) = values else { continue };
            match merged.keys().find(|k| k.eq_ignore_ascii_case(name)).cloned() {
                Some(existing) => {
                    merged.insert(existing, values.clone());
                }
                None => {
                    merged.insert(name.clone(), values.clone());
                }
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configuration_with_methods(methods: Vec<&str>) -> ResourceConfiguration {
        let mut method_map = IndexMap::new();
        for name in methods {
            method_map.insert(name.to_string(), ResourceMethod::default());
        }
        let mut resources = IndexMap::new();
        resources.insert(
            "ticket".to_string(),
            Resource { path: "/tickets".to_string(), methods: method_map },
        );
        ResourceConfiguration {
            name: "cfg".to_string(),
            description: None,
            global_request_headers: None,
            global_response_headers: None,
            global_retry_handlers: None,
            global_error_handlers: None,
            resources,
        }
    }

    #[test]
    fn test_single_method_is_default() {
        let configuration = configuration_with_methods(vec!["create"]);
        let definition =
            ResourceMethodDefinition::resolve(&configuration, "ticket", None).unwrap();
        assert_eq!(definition.method_name(), "create");
    }

    #[test]
    fn test_method_name_required_with_multiple_methods() {
        let configuration = configuration_with_methods(vec!["create", "delete"]);
        let err = ResourceMethodDefinition::resolve(&configuration, "ticket", None).unwrap_err();
        assert!(matches!(err, GatewayError::MethodNameRequired(_)));
    }

    #[test]
    fn test_method_resolution_is_case_insensitive() {
        let configuration = configuration_with_methods(vec!["Create"]);
        let definition =
            ResourceMethodDefinition::resolve(&configuration, "ticket", Some("create")).unwrap();
        assert_eq!(definition.method_name(), "Create");
    }

    #[test]
    fn test_unknown_method_and_resource() {
        let configuration = configuration_with_methods(vec!["create"]);
        let err = ResourceMethodDefinition::resolve(&configuration, "ticket", Some("nope"))
            .unwrap_err();
        assert!(matches!(err, GatewayError::ResourceMethodNotFound { .. }));

        let err = ResourceMethodDefinition::resolve(&configuration, "order", None).unwrap_err();
        assert!(matches!(err, GatewayError::ResourceNotFound { .. }));
    }

    #[test]
    fn test_header_merge_local_precedence() {
        let mut global = ConfiguredHeaders::new();
        global.insert("X-A".to_string(), Some(vec!["1".to_string()]));
        global.insert("X-B".to_string(), Some(vec!["2".to_string()]));
        let mut local = ConfiguredHeaders::new();
        local.insert("x-a".to_string(), Some(vec!["9".to_string()]));

        let merged = merge_headers(Some(&global), Some(&local));
        assert_eq!(merged.get("X-A"), Some(&vec!["9".to_string()]));
        assert_eq!(merged.get("X-B"), Some(&vec!["2".to_string()]));
        assert_eq!(merged.len(), 2);

        // merging twice gives the same result
        let again = merge_headers(Some(&global), Some(&local));
        assert_eq!(merged, again);
    }

    #[test]
    fn test_header_merge_drops_null_values() {
        let mut global = ConfiguredHeaders::new();
        global.insert("X-A".to_string(), Some(vec!["1".to_string()]));
        global.insert("X-Unset".to_string(), None);

        let merged = merge_headers(Some(&global), None);
        assert_eq!(merged.len(), 1);
        assert!(merged.get("X-Unset").is_none());
    }

    #[test]
    fn test_handlers_local_then_global() {
        let local_handler = RetryHandler {
            retry_condition: "{{ response.code == 503 }}".to_string(),
            retry_policy: RetryPolicy { max_retries: 1, back_off_seconds: 1 },
        };
        let global_handler = RetryHandler {
            retry_condition: "{{ response.code == 503 }}".to_string(),
            retry_policy: RetryPolicy { max_retries: 5, back_off_seconds: 9 },
        };

        let mut configuration = configuration_with_methods(vec!["create"]);
        configuration.global_retry_handlers = Some(vec![global_handler]);
        configuration
            .resources
            .get_mut("ticket")
            .unwrap()
            .methods
            .get_mut("create")
            .unwrap()
            .retry_handlers = Some(vec![local_handler]);

        let definition =
            ResourceMethodDefinition::resolve(&configuration, "ticket", None).unwrap();
        let handlers = definition.retry_handlers();
        assert_eq!(handlers.len(), 2);
        assert_eq!(handlers[0].retry_policy.max_retries, 1);
        assert_eq!(handlers[1].retry_policy.max_retries, 5);
    }
}
