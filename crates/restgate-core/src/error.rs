use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Coded gateway error. Every variant carries a stable error code and an
/// associated HTTP status so the REST layer can surface failures verbatim.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("resource configuration '{0}' not found")]
    ResourceConfigurationNotFound(String),
    #[error("resource configuration '{0}' already exists")]
    ResourceConfigurationAlreadyExists(String),
    #[error("failed to read resource configuration file '{0}'")]
    ResourceConfigurationReadError(String),
    #[error("resource '{resource}' not found in configuration '{configuration}'")]
    ResourceNotFound { resource: String, configuration: String },
    #[error("method '{method}' not found in resource '{resource}'")]
    ResourceMethodNotFound { method: String, resource: String },
    #[error("json query '{expression}' failed: {reason}")]
    QueryFailed { expression: String, reason: String },
    #[error("substitution failed: {0}")]
    SubstitutionFailed(String),
    #[error("http execution failed for {operation}: {reason}")]
    HttpExecutionFailed { operation: String, reason: String },
    #[error("connected system '{0}' not found")]
    ConnectedSystemNotFound(String),
    #[error("content type '{0}' in http response is not supported")]
    ContentTypeNotSupported(String),
    #[error("resource configuration failed validation: {0}")]
    SchemaError(String),
    #[error("auth handler '{0}' is not supported")]
    AuthHandlerNotSupported(String),
    #[error("required auth properties missing: {0}")]
    AuthPropertiesMissing(String),
    #[error("cookie authentication failed: {0}")]
    CookieAuthenticationFailed(String),
    #[error("method name is required to run resource '{0}'")]
    MethodNameRequired(String),
    #[error("certificate handling failed for {kind} '{secret}': {reason}")]
    CertificateHandlingFailed { kind: &'static str, secret: String, reason: String },
    #[error("failed to get auth token from '{subsystem}': {reason}")]
    GetAuthTokenError { subsystem: String, reason: String },
    #[error("invalid auth body: {0}")]
    InvalidAuthBody(String),
    #[error("{0}")]
    General(String),
}

impl GatewayError {
    /// Stable error code reported in the error payload.
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::ResourceConfigurationNotFound(_) => "RG-01",
            GatewayError::ResourceConfigurationAlreadyExists(_) => "RG-02",
            GatewayError::ResourceConfigurationReadError(_) => "RG-03",
            GatewayError::ResourceNotFound { .. } => "RG-04",
            GatewayError::ResourceMethodNotFound { .. } => "RG-05",
            GatewayError::QueryFailed { .. } => "RG-06",
            GatewayError::SubstitutionFailed(_) => "RG-07",
            GatewayError::HttpExecutionFailed { .. } => "RG-08",
            GatewayError::ConnectedSystemNotFound(_) => "RG-09",
            GatewayError::ContentTypeNotSupported(_) => "RG-10",
            GatewayError::SchemaError(_) => "RG-11",
            GatewayError::AuthHandlerNotSupported(_) => "RG-12",
            GatewayError::AuthPropertiesMissing(_) => "RG-13",
            GatewayError::CookieAuthenticationFailed(_) => "RG-14",
            GatewayError::MethodNameRequired(_) => "RG-15",
            GatewayError::CertificateHandlingFailed { .. } => "RG-16",
            GatewayError::GetAuthTokenError { .. } => "RG-17",
            GatewayError::InvalidAuthBody(_) => "RG-18",
            GatewayError::General(_) => "RG-500",
        }
    }

    /// HTTP status associated with the error when surfaced to a caller.
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::ResourceConfigurationNotFound(_)
            | GatewayError::ResourceNotFound { .. }
            | GatewayError::ResourceMethodNotFound { .. }
            | GatewayError::ConnectedSystemNotFound(_)
            | GatewayError::AuthPropertiesMissing(_) => 404,
            GatewayError::ResourceConfigurationAlreadyExists(_) => 409,
            GatewayError::SchemaError(_) | GatewayError::InvalidAuthBody(_) => 400,
            GatewayError::CookieAuthenticationFailed(_) => 401,
            _ => 500,
        }
    }
}
