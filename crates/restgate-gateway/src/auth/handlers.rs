//! The five authentication strategy implementations.

use std::sync::Arc;

use base64::Engine as _;
use restgate_core::{AuthType, GatewayError, GatewayResult, Subsystem};

use crate::auth::extract::{extract_cookie, extract_token};
use crate::auth::request::execute_auth_request;
use crate::auth::{AuthHandler, TokenData};
use crate::http::HttpExecutor;

pub(crate) fn all(executor: Arc<HttpExecutor>) -> Vec<Arc<dyn AuthHandler>> {
    vec![
        Arc::new(NoAuthHandler),
        Arc::new(BasicAuthHandler),
        Arc::new(BasicAuthTokenHandler { executor: executor.clone() }),
        Arc::new(BearerHandler { executor: executor.clone() }),
        Arc::new(CookieHandler { executor }),
    ]
}

/// Collects the names of required connection properties that are blank.
fn missing_properties(checks: &[(&'static str, Option<&str>)]) -> GatewayResult<()> {
    let missing: Vec<&str> = checks
        .iter()
        .filter(|(_, value)| value.map(str::trim).filter(|v| !v.is_empty()).is_none())
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(GatewayError::AuthPropertiesMissing(missing.join(", ")))
    }
}

fn basic_credentials(subsystem: &Subsystem) -> String {
    let connection = subsystem.connection();
    let credentials = format!(
        "{}:{}",
        connection.auth_username.as_deref().unwrap_or_default(),
        connection.auth_password.as_deref().unwrap_or_default()
    );
    base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes())
}

struct NoAuthHandler;

#[async_trait::async_trait]
impl AuthHandler for NoAuthHandler {
    fn auth_type(&self) -> AuthType {
        AuthType::NoAuth
    }

    fn auth_key(&self, _subsystem: &Subsystem) -> Option<String> {
        None
    }

    async fn generate_token_data(&self, _subsystem: &Subsystem) -> GatewayResult<TokenData> {
        // never reached: a missing auth key skips token generation entirely
        Ok(TokenData { token: String::new(), expire_seconds: None })
    }
}

/// Credentials encoded locally, no token endpoint involved.
struct BasicAuthHandler;

#[async_trait::async_trait]
impl AuthHandler for BasicAuthHandler {
    fn auth_type(&self) -> AuthType {
        AuthType::BasicAuth
    }

    fn validate(&self, subsystem: &Subsystem) -> GatewayResult<()> {
        let connection = subsystem.connection();
        missing_properties(&[
            ("auth.username", connection.auth_username.as_deref()),
            ("auth.password", connection.auth_password.as_deref()),
        ])
    }

    async fn generate_token_data(&self, subsystem: &Subsystem) -> GatewayResult<TokenData> {
        Ok(TokenData {
            token: basic_credentials(subsystem),
            expire_seconds: subsystem.connection().auth_expire_seconds(),
        })
    }
}

/// Basic-authenticated call to the token endpoint, token taken from the JSON
/// response body at the configured reference path.
struct BasicAuthTokenHandler {
    executor: Arc<HttpExecutor>,
}

#[async_trait::async_trait]
impl AuthHandler for BasicAuthTokenHandler {
    fn auth_type(&self) -> AuthType {
        AuthType::BasicAuthToken
    }

    fn validate(&self, subsystem: &Subsystem) -> GatewayResult<()> {
        let connection = subsystem.connection();
        missing_properties(&[
            ("auth.username", connection.auth_username.as_deref()),
            ("auth.password", connection.auth_password.as_deref()),
            ("auth.tokenRef", connection.auth_token_ref.as_deref()),
            ("auth.method", connection.auth_method.as_deref()),
            ("auth.url", connection.auth_url.as_deref()),
        ])
    }

    async fn generate_token_data(&self, subsystem: &Subsystem) -> GatewayResult<TokenData> {
        let response = execute_auth_request(&self.executor, subsystem, true).await?;
        let token_ref = subsystem.connection().auth_token_ref.clone().unwrap_or_default();
        Ok(TokenData {
            token: extract_token(&response, &token_ref)?,
            expire_seconds: subsystem.connection().auth_expire_seconds(),
        })
    }
}

/// Unauthenticated call to the token endpoint, token taken from the JSON
/// response body.
struct BearerHandler {
    executor: Arc<HttpExecutor>,
}

#[async_trait::async_trait]
impl AuthHandler for BearerHandler {
    fn auth_type(&self) -> AuthType {
        AuthType::Bearer
    }

    fn validate(&self, subsystem: &Subsystem) -> GatewayResult<()> {
        let connection = subsystem.connection();
        missing_properties(&[
            ("auth.url", connection.auth_url.as_deref()),
            ("auth.method", connection.auth_method.as_deref()),
            ("auth.tokenRef", connection.auth_token_ref.as_deref()),
        ])
    }

    async fn generate_token_data(&self, subsystem: &Subsystem) -> GatewayResult<TokenData> {
        let response = execute_auth_request(&self.executor, subsystem, false).await?;
        let token_ref = subsystem.connection().auth_token_ref.clone().unwrap_or_default();
        Ok(TokenData {
            token: extract_token(&response, &token_ref)?,
            expire_seconds: subsystem.connection().auth_expire_seconds(),
        })
    }
}

/// Token endpoint call whose credential comes back as a cookie; the token
/// reference names the cookie.
struct CookieHandler {
    executor: Arc<HttpExecutor>,
}

#[async_trait::async_trait]
impl AuthHandler for CookieHandler {
    fn auth_type(&self) -> AuthType {
        AuthType::Cookie
    }

    fn validate(&self, subsystem: &Subsystem) -> GatewayResult<()> {
        let connection = subsystem.connection();
        missing_properties(&[
            ("auth.url", connection.auth_url.as_deref()),
            ("auth.method", connection.auth_method.as_deref()),
            ("auth.tokenRef", connection.auth_token_ref.as_deref()),
        ])
    }

    async fn generate_token_data(&self, subsystem: &Subsystem) -> GatewayResult<TokenData> {
        let response = execute_auth_request(&self.executor, subsystem, false).await?;
        let token_ref = subsystem.connection().auth_token_ref.clone().unwrap_or_default();
        Ok(TokenData {
            token: extract_cookie(&response, &token_ref)?,
            expire_seconds: subsystem.connection().auth_expire_seconds(),
        })
    }
}
