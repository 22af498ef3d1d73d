//! Authentication strategies for connected systems.
//!
//! A subsystem declares one of five strategies. Generated credentials are
//! cached under `<subsystemName>_<authKey>` with a TTL counted from token
//! creation; tokens without a stated validity are regenerated on every use.

mod extract;
mod handlers;
mod request;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use restgate_core::{AuthType, ExpiringCache, GatewayError, GatewayResult, Subsystem};

use crate::http::HttpExecutor;

pub use extract::{extract_cookie, extract_token};

/// A generated credential with its optional validity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenData {
    pub token: String,
    pub expire_seconds: Option<u64>,
}

/// One authentication strategy.
#[async_trait::async_trait]
pub trait AuthHandler: Send + Sync {
    fn auth_type(&self) -> AuthType;

    /// Logical identity under which a generated credential is cached; `None`
    /// disables authentication for the subsystem.
    fn auth_key(&self, subsystem: &Subsystem) -> Option<String> {
        subsystem.connection().auth_key.clone()
    }

    /// Check the connection properties the strategy needs, reporting every
    /// missing one.
    fn validate(&self, _subsystem: &Subsystem) -> GatewayResult<()> {
        Ok(())
    }

    async fn generate_token_data(&self, subsystem: &Subsystem) -> GatewayResult<TokenData>;
}

/// Dispatches to the strategy declared by a subsystem and manages the token
/// cache.
pub struct AuthenticationService {
    handlers: HashMap<AuthType, Arc<dyn AuthHandler>>,
    token_cache: ExpiringCache<String, TokenData>,
}

impl AuthenticationService {
    pub fn new(executor: Arc<HttpExecutor>) -> Self {
        let mut handlers: HashMap<AuthType, Arc<dyn AuthHandler>> = HashMap::new();
        for handler in handlers::all(executor) {
            handlers.insert(handler.auth_type(), handler);
        }
        Self {
            handlers,
            token_cache: ExpiringCache::from_creation(|token: &TokenData| {
                token.expire_seconds.map(Duration::from_secs)
            }),
        }
    }

    /// Authenticate against a subsystem, returning the generated token, or
    /// `None` when the subsystem does not use authentication.
    ///
    /// When the subsystem references an auth subsystem, that subsystem's
    /// connection properties drive the token generation, while the cache key
    /// stays scoped to the subsystem that owns the credentials.
    pub async fn authenticate(&self, subsystem: &Subsystem) -> GatewayResult<Option<String>> {
        let auth_subsystem = subsystem.auth_subsystem.as_deref().unwrap_or(subsystem);
        let auth_type = auth_subsystem.connection().auth_type()?;
        let handler = self
            .handlers
            .get(&auth_type)
            .ok_or_else(|| GatewayError::AuthHandlerNotSupported(auth_type.to_string()))?;

        let Some(auth_key) = handler
            .auth_key(auth_subsystem)
            .filter(|key| !key.trim().is_empty())
        else {
            return Ok(None);
        };

        handler.validate(auth_subsystem)?;
        let cache_key = format!("{}_{}", subsystem.name, auth_key);
        let token = self
            .token_cache
            .get_or_compute(cache_key, || handler.generate_token_data(auth_subsystem))
            .await?;
        Ok(Some(token.token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::PoolSettings;
    use httpmock::prelude::*;
    use restgate_core::ConnectionProperties;

    fn service() -> AuthenticationService {
        AuthenticationService::new(Arc::new(HttpExecutor::internal(PoolSettings::default())))
    }

    fn subsystem(connection: ConnectionProperties) -> Subsystem {
        Subsystem {
            name: "billing".to_string(),
            url: "https://billing.example.com".to_string(),
            connection_properties: vec![connection],
            auth_subsystem: None,
        }
    }

    #[tokio::test]
    async fn test_no_auth_yields_no_token() {
        let connection = ConnectionProperties {
            auth_type: Some("NoAuth".to_string()),
            auth_key: Some("token".to_string()),
            ..Default::default()
        };
        let token = service().authenticate(&subsystem(connection)).await.unwrap();
        assert_eq!(token, None);
    }

    #[tokio::test]
    async fn test_unknown_auth_type_fails_closed() {
        let connection = ConnectionProperties {
            auth_type: Some("Kerberos".to_string()),
            ..Default::default()
        };
        let err = service().authenticate(&subsystem(connection)).await.unwrap_err();
        assert!(matches!(err, GatewayError::AuthHandlerNotSupported(_)));
    }

    #[tokio::test]
    async fn test_basic_auth_token_is_base64_credentials() {
        let connection = ConnectionProperties {
            auth_type: Some("BasicAuth".to_string()),
            auth_key: Some("basicToken".to_string()),
            auth_username: Some("alice".to_string()),
            auth_password: Some("s3cret".to_string()),
            ..Default::default()
        };
        let token = service().authenticate(&subsystem(connection)).await.unwrap();
        // base64("alice:s3cret")
        assert_eq!(token.as_deref(), Some("YWxpY2U6czNjcmV0"));
    }

    #[tokio::test]
    async fn test_basic_auth_missing_properties_are_all_reported() {
        let connection = ConnectionProperties {
            auth_type: Some("BasicAuth".to_string()),
            auth_key: Some("basicToken".to_string()),
            ..Default::default()
        };
        let err = service().authenticate(&subsystem(connection)).await.unwrap_err();
        match err {
            GatewayError::AuthPropertiesMissing(missing) => {
                assert!(missing.contains("auth.username"));
                assert!(missing.contains("auth.password"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_blank_auth_key_skips_authentication() {
        let connection = ConnectionProperties {
            auth_type: Some("BasicAuth".to_string()),
            auth_key: Some("  ".to_string()),
            auth_username: Some("alice".to_string()),
            auth_password: Some("s3cret".to_string()),
            ..Default::default()
        };
        let token = service().authenticate(&subsystem(connection)).await.unwrap();
        assert_eq!(token, None);
    }

    #[tokio::test]
    async fn test_bearer_token_cached_within_ttl() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({"access_token": "tok-1"}));
            })
            .await;

        let connection = ConnectionProperties {
            auth_type: Some("Bearer".to_string()),
            auth_key: Some("bearerToken".to_string()),
            auth_url: Some(server.url("/token")),
            auth_method: Some("POST".to_string()),
            auth_token_ref: Some("$.access_token".to_string()),
            auth_expire_seconds: Some("3600".to_string()),
            ..Default::default()
        };
        let service = service();
        let system = subsystem(connection);

        let first = service.authenticate(&system).await.unwrap();
        let second = service.authenticate(&system).await.unwrap();
        assert_eq!(first.as_deref(), Some("tok-1"));
        assert_eq!(second.as_deref(), Some("tok-1"));
        // token endpoint consulted once within the TTL window
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_bearer_token_without_validity_regenerates_every_time() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({"access_token": "tok-1"}));
            })
            .await;

        let connection = ConnectionProperties {
            auth_type: Some("Bearer".to_string()),
            auth_key: Some("bearerToken".to_string()),
            auth_url: Some(server.url("/token")),
            auth_method: Some("POST".to_string()),
            auth_token_ref: Some("$.access_token".to_string()),
            ..Default::default()
        };
        let service = service();
        let system = subsystem(connection);

        service.authenticate(&system).await.unwrap();
        service.authenticate(&system).await.unwrap();
        mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_auth_endpoint_error_is_fatal() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(403).body("denied");
            })
            .await;

        let connection = ConnectionProperties {
            auth_type: Some("Bearer".to_string()),
            auth_key: Some("bearerToken".to_string()),
            auth_url: Some(server.url("/token")),
            auth_method: Some("POST".to_string()),
            auth_token_ref: Some("$.access_token".to_string()),
            ..Default::default()
        };
        let err = service().authenticate(&subsystem(connection)).await.unwrap_err();
        assert!(matches!(err, GatewayError::GetAuthTokenError { .. }));
    }

    #[tokio::test]
    async fn test_auth_subsystem_drives_generation_but_cache_scopes_to_it() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/sso/token").header("authorization", "Basic YWxpY2U6czNjcmV0");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({"token": "sso-tok"}));
            })
            .await;

        let mut system = subsystem(ConnectionProperties {
            auth_type: Some("NoAuth".to_string()),
            ..Default::default()
        });
        system.auth_subsystem = Some(Box::new(Subsystem {
            name: "sso".to_string(),
            url: server.base_url(),
            connection_properties: vec![ConnectionProperties {
                auth_type: Some("BasicAuthToken".to_string()),
                auth_key: Some("ssoToken".to_string()),
                auth_username: Some("alice".to_string()),
                auth_password: Some("s3cret".to_string()),
                auth_url: Some("/sso/token".to_string()),
                auth_method: Some("POST".to_string()),
                auth_token_ref: Some("$.token".to_string()),
                ..Default::default()
            }],
            auth_subsystem: None,
        }));

        let token = service().authenticate(&system).await.unwrap();
        assert_eq!(token.as_deref(), Some("sso-tok"));
    }
}
