use indexmap::IndexMap;

use restgate_core::model::subsystem::{
    DEFAULT_CONNECT_TIMEOUT_SECONDS, DEFAULT_READ_TIMEOUT_SECONDS, DEFAULT_WRITE_TIMEOUT_SECONDS,
};

/// Body of an outbound request.
#[derive(Debug, Clone)]
pub enum OutboundBody {
    /// Raw text, typically a rendered template.
    Raw(String),
    /// JSON payload supplied verbatim by the caller.
    Json(serde_json::Value),
    /// Form-urlencoded pairs.
    Form(Vec<(String, String)>),
}

/// Mutable draft of one outbound request. Created fresh per invocation,
/// populated by the request builder chain and discarded after execution.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub method: String,
    pub headers: IndexMap<String, Vec<String>>,
    pub body: Option<OutboundBody>,
    pub connect_timeout_seconds: u64,
    pub read_timeout_seconds: u64,
    pub write_timeout_seconds: u64,
    pub ssl_verify: bool,
    pub trust_store_secret_name: Option<String>,
    pub trust_store_secret_password: Option<String>,
    pub key_store_secret_name: Option<String>,
    pub key_store_secret_password: Option<String>,
    pub encode_url: bool,
}

impl OutboundRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Body value exposed to substitution contexts: JSON bodies keep their
    /// structure, rendered text is exposed as a string.
    pub fn body_for_substitution(&self) -> Option<serde_json::Value> {
        match &self.body {
            Some(OutboundBody::Json(value)) => Some(value.clone()),
            Some(OutboundBody::Raw(text)) => Some(serde_json::Value::String(text.clone())),
            Some(OutboundBody::Form(pairs)) => Some(serde_json::json!(pairs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<indexmap::IndexMap<_, _>>())),
            None => None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&Vec<String>> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values)
    }
}

impl Default for OutboundRequest {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: String::new(),
            headers: IndexMap::new(),
            body: None,
            connect_timeout_seconds: DEFAULT_CONNECT_TIMEOUT_SECONDS,
            read_timeout_seconds: DEFAULT_READ_TIMEOUT_SECONDS,
            write_timeout_seconds: DEFAULT_WRITE_TIMEOUT_SECONDS,
            ssl_verify: false,
            trust_store_secret_name: None,
            trust_store_secret_password: None,
            key_store_secret_name: None,
            key_store_secret_password: None,
            encode_url: true,
        }
    }
}
