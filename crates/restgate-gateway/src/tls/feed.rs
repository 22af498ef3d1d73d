//! Secret change feed consumed by the certificate watcher.

use std::collections::HashMap;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;

use restgate_core::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SecretAction {
    Added,
    Modified,
    Deleted,
}

/// One change event from the secret feed: the secret name plus a map of data
/// fields, one of which carries the base64 certificate payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretEvent {
    pub action: SecretAction,
    pub name: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

/// Source of secret change events. Implementations deliver an open-ended
/// stream; the stream ending means the feed closed and the watcher decides
/// whether to reconnect.
#[async_trait::async_trait]
pub trait SecretEventSource: Send + Sync + 'static {
    async fn subscribe(&self) -> GatewayResult<BoxStream<'static, SecretEvent>>;
}

/// Watch feed delivering JSON-lines secret events over a streaming HTTP
/// response.
pub struct HttpSecretEventSource {
    client: reqwest::Client,
    watch_url: String,
}

impl HttpSecretEventSource {
    pub fn new(watch_url: String) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| GatewayError::General(format!("failed to build watch client: {}", e)))?;
        Ok(Self { client, watch_url })
    }
}

#[async_trait::async_trait]
impl SecretEventSource for HttpSecretEventSource {
    async fn subscribe(&self) -> GatewayResult<BoxStream<'static, SecretEvent>> {
        let response = self
            .client
            .get(&self.watch_url)
            .send()
            .await
            .map_err(|e| GatewayError::General(format!("secret watch subscribe failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(GatewayError::General(format!(
                "secret watch subscribe failed: {}",
                response.status()
            )));
        }

        let bytes = response.bytes_stream();
        let lines = futures::stream::unfold(
            (bytes, Vec::new(), std::collections::VecDeque::new()),
            |(mut bytes, mut buffer, mut ready)| async move {
                loop {
                    if let Some(line) = ready.pop_front() {
                        return Some((line, (bytes, buffer, ready)));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            buffer.extend_from_slice(&chunk);
                            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                                let line: Vec<u8> = buffer.drain(..=pos).collect();
                                ready.push_back(String::from_utf8_lossy(&line).trim().to_string());
                            }
                        }
                        Some(Err(error)) => {
                            tracing::warn!(%error, "secret watch stream error, closing feed");
                            return None;
                        }
                        None => return None,
                    }
                }
            },
        );

        let events = lines.filter_map(|line| async move {
            if line.is_empty() {
                return None;
            }
            match serde_json::from_str::<SecretEvent>(&line) {
                Ok(event) => Some(event),
                Err(error) => {
                    tracing::warn!(%error, "discarding unparsable secret event");
                    None
                }
            }
        });
        Ok(events.boxed())
    }
}
