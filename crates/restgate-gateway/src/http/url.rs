//! URL encoding for rendered request URLs.
//!
//! Rendered URLs can carry path segments and query values that standard URL
//! builders refuse or mangle, e.g. a query value holding embedded JSON.
//! Each path segment and each query value is percent-encoded individually;
//! query parameter names are left as written.

use restgate_core::{GatewayError, GatewayResult};
use url::Url;

/// Percent-encode the path segments and query values of a rendered URL and
/// parse the result.
pub fn encode(raw: &str) -> GatewayResult<Url> {
    let scheme_end = raw
        .find("://")
        .ok_or_else(|| invalid(raw, "missing scheme"))?;
    let authority_start = scheme_end + 3;
    let path_start = raw[authority_start..]
        .find('/')
        .map(|i| authority_start + i)
        .unwrap_or(raw.len());

    let base = &raw[..path_start];
    let rest = &raw[path_start..];
    let (path, query) = match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };

    let encoded_path = path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");

    let mut encoded = format!("{}{}", base, encoded_path);
    if let Some(query) = query {
        let encoded_query = query
            .split('&')
            .map(|pair| match pair.split_once('=') {
                Some((name, value)) => format!("{}={}", name, urlencoding::encode(value)),
                None => pair.to_string(),
            })
            .collect::<Vec<_>>()
            .join("&");
        encoded.push('?');
        encoded.push_str(&encoded_query);
    }

    Url::parse(&encoded).map_err(|e| invalid(raw, &e.to_string()))
}

/// Parse a URL without re-encoding its components.
pub fn parse(raw: &str) -> GatewayResult<Url> {
    Url::parse(raw).map_err(|e| invalid(raw, &e.to_string()))
}

fn invalid(raw: &str, reason: &str) -> GatewayError {
    GatewayError::HttpExecutionFailed {
        operation: raw.to_string(),
        reason: format!("invalid url: {}", reason),
    }
}
