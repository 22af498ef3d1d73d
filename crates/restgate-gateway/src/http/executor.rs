//! Outbound HTTP execution over pooled clients.
//!
//! HTTP error responses (4xx/5xx) are not failures for control flow: they
//! are handed back as normal responses so the retry evaluator and the
//! response transform chain can inspect status and body. Only
//! connection-level problems or unrecoverable execution errors propagate as
//! errors.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use restgate_core::{GatewayError, GatewayResult};

use crate::http::client_cache::ClientCache;
pub use crate::http::client_cache::PoolSettings;
use crate::http::request::{OutboundBody, OutboundRequest};
use crate::http::url;
use crate::tls::TlsContextStore;

/// Completed upstream response.
#[derive(Debug, Clone)]
pub struct ExecutedResponse {
    pub status: u16,
    pub headers: IndexMap<String, Vec<String>>,
    pub body: Vec<u8>,
}

impl ExecutedResponse {
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&Vec<String>> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values)
    }

    /// Subtype of the Content-Type header, e.g. `json` for
    /// `application/json; charset=utf-8`.
    pub fn content_subtype(&self) -> Option<String> {
        let value = self.header("content-type")?.first()?;
        let mime = value.split(';').next().unwrap_or_default().trim();
        mime.split('/').nth(1).map(|subtype| subtype.to_ascii_lowercase())
    }

    pub fn is_success_or_redirect(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// One failed execution attempt.
#[derive(Debug)]
pub enum HttpFailure {
    /// The upstream answered with a 4xx/5xx response.
    ErrorResponse(ExecutedResponse),
    /// Connection-level failure: connect timeout/refused, unknown host or a
    /// read/write timeout.
    Transport { reason: String, connect: bool },
    /// Unrecoverable execution error, never retried.
    Fatal(GatewayError),
}

impl HttpFailure {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HttpFailure::ErrorResponse(_) | HttpFailure::Transport { .. })
    }

    /// Whether the failure was a connection timeout/refusal, exposed to
    /// retry conditions as `connectionTimeout`.
    pub fn connection_timeout(&self) -> bool {
        matches!(self, HttpFailure::Transport { connect: true, .. })
    }

    pub fn error_response(&self) -> Option<&ExecutedResponse> {
        match self {
            HttpFailure::ErrorResponse(response) => Some(response),
            _ => None,
        }
    }

    /// Final outcome of the failure once retries are exhausted or skipped:
    /// an HTTP error response flows back as a response, everything else
    /// propagates as an error.
    pub fn into_result(self, operation: &str) -> GatewayResult<ExecutedResponse> {
        match self {
            HttpFailure::ErrorResponse(response) => Ok(response),
            HttpFailure::Transport { reason, .. } => Err(GatewayError::HttpExecutionFailed {
                operation: operation.to_string(),
                reason,
            }),
            HttpFailure::Fatal(error) => Err(error),
        }
    }
}

/// TLS selection strategy of an executor.
enum TlsSelector {
    /// Contexts from the TLS material store, selected per request secrets.
    External(Arc<TlsContextStore>),
    /// No certificate verification; used for internal service calls.
    Insecure,
}

pub struct HttpExecutor {
    clients: ClientCache,
    tls: TlsSelector,
}

impl HttpExecutor {
    /// Executor for connected-system calls, with TLS contexts taken from
    /// the material store when a request asks for verification.
    pub fn external(store: Arc<TlsContextStore>, pool: PoolSettings) -> Self {
        Self { clients: ClientCache::new(pool), tls: TlsSelector::External(store) }
    }

    /// Executor for internal service calls without certificate verification.
    pub fn internal(pool: PoolSettings) -> Self {
        Self { clients: ClientCache::new(pool), tls: TlsSelector::Insecure }
    }

    /// Execute one request. Error responses come back as `Ok`; connection
    /// failures and unrecoverable errors as `Err`.
    pub async fn execute(&self, request: &OutboundRequest) -> GatewayResult<ExecutedResponse> {
        match self.attempt(request).await {
            Ok(response) => Ok(response),
            Err(HttpFailure::ErrorResponse(response)) => Ok(response),
            Err(failure) => failure.into_result(&operation(request)),
        }
    }

    /// One attempt with failure classification, used by the retry evaluator.
    pub(crate) async fn attempt(
        &self,
        request: &OutboundRequest,
    ) -> Result<ExecutedResponse, HttpFailure> {
        let material = match (&self.tls, request.ssl_verify) {
            (TlsSelector::External(store), true) => Some(
                store
                    .get(
                        request.trust_store_secret_name.as_deref(),
                        request.key_store_secret_name.as_deref(),
                    )
                    .map_err(HttpFailure::Fatal)?,
            ),
            _ => None,
        };
        let verify = material.is_some();
        let client = self
            .clients
            .get_client(request, material.as_ref(), verify)
            .map_err(HttpFailure::Fatal)?;

        let target = if request.encode_url {
            url::encode(&request.url).map_err(HttpFailure::Fatal)?
        } else {
            url::parse(&request.url).map_err(HttpFailure::Fatal)?
        };
        let method = reqwest::Method::from_str(&request.method).map_err(|_| {
            HttpFailure::Fatal(GatewayError::HttpExecutionFailed {
                operation: operation(request),
                reason: format!("invalid http method '{}'", request.method),
            })
        })?;

        let mut builder = client.request(method, target);
        for (name, values) in &request.headers {
            for value in values {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        match &request.body {
            Some(OutboundBody::Raw(text)) => builder = builder.body(text.clone()),
            Some(OutboundBody::Json(value)) => builder = builder.json(value),
            Some(OutboundBody::Form(pairs)) => builder = builder.form(pairs),
            None => {}
        }
        // the client enforces connect and read timeouts; this bounds the
        // whole exchange including the write side
        let overall = request.connect_timeout_seconds
            + request.read_timeout_seconds
            + request.write_timeout_seconds;
        builder = builder.timeout(Duration::from_secs(overall));

        tracing::debug!(method = %request.method, url = %request.url, "executing http request");
        let response = builder.send().await.map_err(|e| classify(e, request))?;

        let status = response.status().as_u16();
        let mut headers: IndexMap<String, Vec<String>> = IndexMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.entry(name.to_string()).or_default().push(value.to_string());
            }
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| classify(e, request))?
            .to_vec();

        let executed = ExecutedResponse { status, headers, body };
        tracing::debug!(status = executed.status, "http response received");
        if status >= 400 {
            return Err(HttpFailure::ErrorResponse(executed));
        }
        Ok(executed)
    }
}

fn operation(request: &OutboundRequest) -> String {
    format!("{}:{}", request.method, request.url)
}

fn classify(error: reqwest::Error, request: &OutboundRequest) -> HttpFailure {
    if error.is_connect() || error.is_timeout() {
        HttpFailure::Transport { reason: error.to_string(), connect: error.is_connect() }
    } else {
        HttpFailure::Fatal(GatewayError::HttpExecutionFailed {
            operation: operation(request),
            reason: error.to_string(),
        })
    }
}
