//! Token endpoint request construction and execution.

use indexmap::IndexMap;
use restgate_core::{GatewayError, GatewayResult, Subsystem};

use crate::http::{ExecutedResponse, HttpExecutor, OutboundBody, OutboundRequest};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Call the subsystem's token endpoint. Non-2xx/3xx answers are fatal to the
/// authentication attempt and are never retried.
pub(crate) async fn execute_auth_request(
    executor: &HttpExecutor,
    subsystem: &Subsystem,
    basic_auth: bool,
) -> GatewayResult<ExecutedResponse> {
    let request = build_auth_request(subsystem, basic_auth)?;
    let response = executor.execute(&request).await?;
    if !response.is_success_or_redirect() {
        return Err(GatewayError::GetAuthTokenError {
            subsystem: subsystem.name.clone(),
            reason: format!("{}: {}", response.status, response.body_string()),
        });
    }
    Ok(response)
}

fn build_auth_request(subsystem: &Subsystem, basic_auth: bool) -> GatewayResult<OutboundRequest> {
    let connection = subsystem.connection();
    let mut request = OutboundRequest::new();
    request.url = subsystem.joined_auth_url();
    request.method = connection.auth_method.clone().unwrap_or_default();
    request.encode_url = true;
    request.headers = connection.auth_headers()?;

    if basic_auth {
        let credentials = format!(
            "{}:{}",
            connection.auth_username.as_deref().unwrap_or_default(),
            connection.auth_password.as_deref().unwrap_or_default()
        );
        use base64::Engine as _;
        let token = base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes());
        request
            .headers
            .insert("Authorization".to_string(), vec![format!("Basic {}", token)]);
    }

    if let Some(body) = connection.auth_body.as_deref().filter(|b| !b.trim().is_empty()) {
        if wants_form_body(&request.headers) {
            request.body = Some(OutboundBody::Form(parse_form_body(body)?));
        } else {
            request.body = Some(OutboundBody::Raw(body.to_string()));
        }
    }

    if connection.ssl_verify.unwrap_or(false) {
        request.ssl_verify = true;
        request.key_store_secret_name = connection.ssl_key_store_secret_name.clone();
        request.key_store_secret_password = connection.ssl_key_store_secret_password.clone();
        request.trust_store_secret_name = connection.ssl_trust_store_secret_name.clone();
        request.trust_store_secret_password = connection.ssl_trust_store_secret_password.clone();
    }
    Ok(request)
}

fn wants_form_body(headers: &IndexMap<String, Vec<String>>) -> bool {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .and_then(|(_, values)| values.first())
        .map(|value| value == FORM_URLENCODED)
        .unwrap_or(false)
}

/// Parse an auth body into form pairs. Accepted shapes: a JSON object or a
/// `k=v&k2=v2` pair list; anything else is rejected.
fn parse_form_body(body: &str) -> GatewayResult<Vec<(String, String)>> {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(body) {
        return Ok(map
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect());
    }

    let mut pairs = Vec::new();
    for pair in body.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(GatewayError::InvalidAuthBody(body.to_string()));
        };
        let key_valid = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !key_valid || value.is_empty() {
            return Err(GatewayError::InvalidAuthBody(body.to_string()));
        }
        pairs.push((key.to_string(), value.to_string()));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use restgate_core::ConnectionProperties;

    fn subsystem(connection: ConnectionProperties) -> Subsystem {
        Subsystem {
            name: "billing".to_string(),
            url: "https://billing.example.com".to_string(),
            connection_properties: vec![connection],
            auth_subsystem: None,
        }
    }

    #[test]
    fn test_parse_form_body_pairs() {
        let pairs = parse_form_body("grant_type=client_credentials&scope=read").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("grant_type".to_string(), "client_credentials".to_string()));
    }

    #[test]
    fn test_parse_form_body_json_object() {
        let pairs = parse_form_body(r#"{"grant_type": "password", "attempts": 2}"#).unwrap();
        assert!(pairs.contains(&("grant_type".to_string(), "password".to_string())));
        assert!(pairs.contains(&("attempts".to_string(), "2".to_string())));
    }

    #[test]
    fn test_parse_form_body_rejects_other_shapes() {
        assert!(matches!(
            parse_form_body("just some text").unwrap_err(),
            GatewayError::InvalidAuthBody(_)
        ));
        assert!(matches!(
            parse_form_body("key=&other=1").unwrap_err(),
            GatewayError::InvalidAuthBody(_)
        ));
    }

    #[test]
    fn test_build_auth_request_with_basic_header_and_form_body() {
        let connection = ConnectionProperties {
            auth_url: Some("/token".to_string()),
            auth_method: Some("POST".to_string()),
            auth_username: Some("alice".to_string()),
            auth_password: Some("s3cret".to_string()),
            auth_body: Some("grant_type=client_credentials".to_string()),
            auth_headers: Some(format!(r#"{{"content-type": ["{}"]}}"#, FORM_URLENCODED)),
            ..Default::default()
        };
        let request = build_auth_request(&subsystem(connection), true).unwrap();
        assert_eq!(request.url, "https://billing.example.com/token");
        assert_eq!(request.method, "POST");
        assert_eq!(
            request.header("authorization"),
            Some(&vec!["Basic YWxpY2U6czNjcmV0".to_string()])
        );
        assert!(matches!(request.body, Some(OutboundBody::Form(_))));
    }

    #[test]
    fn test_build_auth_request_raw_body_without_form_content_type() {
        let connection = ConnectionProperties {
            auth_url: Some("https://sso.example.com/token".to_string()),
            auth_method: Some("POST".to_string()),
            auth_body: Some(r#"{"user": "alice"}"#.to_string()),
            ..Default::default()
        };
        let request = build_auth_request(&subsystem(connection), false).unwrap();
        assert_eq!(request.url, "https://sso.example.com/token");
        assert!(matches!(request.body, Some(OutboundBody::Raw(_))));
    }
}
