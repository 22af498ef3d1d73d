//! Credential extraction from token endpoint responses.

use restgate_core::{GatewayError, GatewayResult};
use serde_json_path::JsonPath;

use crate::http::ExecutedResponse;

/// Extract a token from a JSON response body at the configured reference
/// path. XML responses are unsupported; any other content type is treated as
/// JSON.
pub fn extract_token(response: &ExecutedResponse, token_ref: &str) -> GatewayResult<String> {
    if let Some(subtype) = response.content_subtype() {
        if subtype == "xml" {
            return Err(GatewayError::ContentTypeNotSupported("xml".to_string()));
        }
    }

    let body = response.body_string();
    let document: serde_json::Value = serde_json::from_str(&body).map_err(|e| {
        GatewayError::General(format!("authentication response is not valid json: {}", e))
    })?;
    let path = JsonPath::parse(token_ref).map_err(|e| GatewayError::QueryFailed {
        expression: token_ref.to_string(),
        reason: e.to_string(),
    })?;
    let matches: Vec<&serde_json::Value> = path.query(&document).all();
    match matches.as_slice() {
        [] => Err(GatewayError::QueryFailed {
            expression: token_ref.to_string(),
            reason: "no value matched in authentication response".to_string(),
        }),
        [single] => Ok(value_to_string(single)),
        many => Ok(serde_json::Value::Array(many.iter().map(|v| (*v).clone()).collect())
            .to_string()),
    }
}

/// Extract the named cookie from the Set-Cookie headers of a token endpoint
/// response.
pub fn extract_cookie(response: &ExecutedResponse, cookie_name: &str) -> GatewayResult<String> {
    let cookies = response.header("set-cookie").ok_or_else(|| {
        GatewayError::CookieAuthenticationFailed(
            "Set-Cookie header missing in authentication response from external system".to_string(),
        )
    })?;

    let lowered = cookie_name.to_ascii_lowercase();
    let matched = cookies
        .iter()
        .find(|cookie| cookie.to_ascii_lowercase().contains(&lowered))
        .ok_or_else(|| {
            GatewayError::CookieAuthenticationFailed(format!(
                "{} is missing in Set-Cookie header in authentication response from external system",
                cookie_name
            ))
        })?;

    matched
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(name, _)| name.eq_ignore_ascii_case(cookie_name))
        .map(|(_, value)| value.to_string())
        .ok_or_else(|| {
            GatewayError::CookieAuthenticationFailed(format!(
                "{} is missing in Set-Cookie header in authentication response from external system",
                cookie_name
            ))
        })
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
