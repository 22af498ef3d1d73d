//! Connected-system records returned by the subsystem directory service.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

pub const DEFAULT_CONNECT_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_READ_TIMEOUT_SECONDS: u64 = 60;
pub const DEFAULT_WRITE_TIMEOUT_SECONDS: u64 = 60;

/// Authentication strategy of a connected system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthType {
    NoAuth,
    BasicAuth,
    BasicAuthToken,
    Bearer,
    Cookie,
}

impl AuthType {
    /// Parse an auth type tag; unknown tags fail closed.
    pub fn parse(tag: &str) -> GatewayResult<Self> {
        match tag {
            t if t.eq_ignore_ascii_case("NoAuth") => Ok(AuthType::NoAuth),
            t if t.eq_ignore_ascii_case("BasicAuth") => Ok(AuthType::BasicAuth),
            t if t.eq_ignore_ascii_case("BasicAuthToken") => Ok(AuthType::BasicAuthToken),
            t if t.eq_ignore_ascii_case("Bearer") => Ok(AuthType::Bearer),
            t if t.eq_ignore_ascii_case("Cookie") => Ok(AuthType::Cookie),
            other => Err(GatewayError::AuthHandlerNotSupported(other.to_string())),
        }
    }
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            AuthType::NoAuth => "NoAuth",
            AuthType::BasicAuth => "BasicAuth",
            AuthType::BasicAuthToken => "BasicAuthToken",
            AuthType::Bearer => "Bearer",
            AuthType::Cookie => "Cookie",
        };
        f.write_str(tag)
    }
}

/// Connection properties of a subsystem. The directory service emits both
/// dotted and underscored field spellings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "ssl.verify", alias = "ssl_verify", default, skip_serializing_if = "Option::is_none")]
    pub ssl_verify: Option<bool>,
    #[serde(
        rename = "ssl.trustStoreSecretName",
        alias = "ssl_trustStoreSecretName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ssl_trust_store_secret_name: Option<String>,
    #[serde(
        rename = "ssl.trustStoreSecretPassword",
        alias = "ssl_trustStoreSecretPassword",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ssl_trust_store_secret_password: Option<String>,
    #[serde(
        rename = "ssl.keyStoreSecretName",
        alias = "ssl_keyStoreSecretName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ssl_key_store_secret_name: Option<String>,
    #[serde(
        rename = "ssl.keyStoreSecretPassword",
        alias = "ssl_keyStoreSecretPassword",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ssl_key_store_secret_password: Option<String>,
    #[serde(rename = "auth.username", alias = "auth_username", default, skip_serializing_if = "Option::is_none")]
    pub auth_username: Option<String>,
    #[serde(rename = "auth.password", alias = "auth_password", default, skip_serializing_if = "Option::is_none")]
    pub auth_password: Option<String>,
    #[serde(rename = "auth.type", alias = "auth_type", default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,
    #[serde(rename = "auth.url", alias = "auth_url", default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    #[serde(rename = "auth.method", alias = "auth_method", default, skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<String>,
    /// JSON-encoded header map used on the token endpoint call.
    #[serde(rename = "auth.headers", alias = "auth_headers", default, skip_serializing_if = "Option::is_none")]
    pub auth_headers: Option<String>,
    #[serde(rename = "auth.body", alias = "auth_body", default, skip_serializing_if = "Option::is_none")]
    pub auth_body: Option<String>,
    #[serde(rename = "auth.expireSeconds", alias = "auth_expireSeconds", default, skip_serializing_if = "Option::is_none")]
    pub auth_expire_seconds: Option<String>,
    #[serde(rename = "auth.key", alias = "auth_key", default, skip_serializing_if = "Option::is_none")]
    pub auth_key: Option<String>,
    #[serde(
        rename = "auth.subsystemName",
        alias = "auth_subsystemName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub auth_subsystem_name: Option<String>,
    #[serde(rename = "auth.tokenRef", alias = "auth_tokenRef", default, skip_serializing_if = "Option::is_none")]
    pub auth_token_ref: Option<String>,
    #[serde(
        rename = "client.connectTimeoutSeconds",
        alias = "client_connectTimeoutSeconds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_connect_timeout_seconds: Option<u64>,
    #[serde(
        rename = "client.readTimeoutSeconds",
        alias = "client_readTimeoutSeconds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_read_timeout_seconds: Option<u64>,
    #[serde(
        rename = "client.writeTimeoutSeconds",
        alias = "client_writeTimeoutSeconds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_write_timeout_seconds: Option<u64>,
}

impl ConnectionProperties {
    pub fn auth_type(&self) -> GatewayResult<AuthType> {
        AuthType::parse(self.auth_type.as_deref().unwrap_or_default())
    }

    /// Parsed token-endpoint headers from the JSON-encoded `auth.headers` field.
    pub fn auth_headers(&self) -> GatewayResult<IndexMap<String, Vec<String>>> {
        let Some(raw) = self.auth_headers.as_deref().filter(|r| !r.trim().is_empty()) else {
            return Ok(IndexMap::new());
        };
        serde_json::from_str(raw).map_err(|e| {
            GatewayError::General(format!("invalid auth headers '{}': {}", raw, e))
        })
    }

    /// Token validity parsed from `auth.expireSeconds`; absent or unparsable
    /// values mean the generated token has no stated validity.
    pub fn auth_expire_seconds(&self) -> Option<u64> {
        self.auth_expire_seconds.as_deref().and_then(|s| s.trim().parse().ok())
    }

    pub fn connect_timeout_seconds(&self) -> u64 {
        self.client_connect_timeout_seconds.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECONDS)
    }

    pub fn read_timeout_seconds(&self) -> u64 {
        self.client_read_timeout_seconds.unwrap_or(DEFAULT_READ_TIMEOUT_SECONDS)
    }

    pub fn write_timeout_seconds(&self) -> u64 {
        self.client_write_timeout_seconds.unwrap_or(DEFAULT_WRITE_TIMEOUT_SECONDS)
    }
}

/// A connected system: name, base URL and one or more connection-property
/// sets, the first of which is authoritative. A subsystem may reference a
/// separate auth subsystem whose connection properties are used to generate
/// credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subsystem {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub connection_properties: Vec<ConnectionProperties>,
    #[serde(skip)]
    pub auth_subsystem: Option<Box<Subsystem>>,
}

impl Subsystem {
    /// The authoritative connection-property set. The directory lookup
    /// rejects subsystems without one, so this cannot fail after retrieval.
    pub fn connection(&self) -> &ConnectionProperties {
        self.connection_properties.first().expect("subsystem has no connection properties")
    }

    pub fn ssl_verify(&self) -> bool {
        self.connection().ssl_verify.unwrap_or(false)
    }

    /// Absolute auth URLs are used verbatim, relative ones are joined onto
    /// the subsystem base URL.
    pub fn joined_auth_url(&self) -> String {
        let auth_url = self.connection().auth_url.clone().unwrap_or_default();
        if auth_url.to_ascii_lowercase().starts_with("http") {
            auth_url
        } else {
            format!("{}{}", self.url, auth_url)
        }
    }

    /// The auth key under which credentials are cached, taken from the auth
    /// subsystem when one is referenced.
    pub fn auth_key(&self) -> Option<String> {
        let source = self.auth_subsystem.as_deref().unwrap_or(self);
        source.connection().auth_key.clone()
    }
}
